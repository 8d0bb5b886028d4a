//! Admission gate: quantitative thresholds a strategy must clear before any
//! capital is staged for it.

use std::collections::HashMap;

use crate::config::Config;
use crate::types::{PrecheckResult, StrategyMetrics};

/// Where metrics come from. The backtesting engine and live settlement feed
/// live outside this crate; they plug in here.
pub trait MetricsSource: Send + Sync {
    fn metrics(&self, session_id: &str, strategy_ref: &str) -> Option<StrategyMetrics>;
}

/// Fixed map of metrics, for tests and offline evaluation.
pub struct StaticMetrics {
    map: HashMap<(String, String), StrategyMetrics>,
}

impl StaticMetrics {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn insert(&mut self, session_id: &str, strategy_ref: &str, metrics: StrategyMetrics) {
        self.map
            .insert((session_id.to_string(), strategy_ref.to_string()), metrics);
    }
}

impl Default for StaticMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for StaticMetrics {
    fn metrics(&self, session_id: &str, strategy_ref: &str) -> Option<StrategyMetrics> {
        self.map
            .get(&(session_id.to_string(), strategy_ref.to_string()))
            .copied()
    }
}

#[derive(Clone)]
pub struct Thresholds {
    pub min_sharpe: f64,
    pub max_drawdown: f64,
    pub min_trades: u64,
    pub min_win_rate: f64,
    pub max_slippage_bps: f64,
}

impl Thresholds {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_sharpe: cfg.min_sharpe,
            max_drawdown: cfg.max_drawdown,
            min_trades: cfg.min_trades,
            min_win_rate: cfg.min_win_rate,
            max_slippage_bps: cfg.max_slippage_bps,
        }
    }
}

/// Pure threshold evaluation. `failed` names every threshold not met, in a
/// fixed order, so callers can surface a precise reason.
pub fn evaluate(metrics: StrategyMetrics, th: &Thresholds) -> PrecheckResult {
    let mut failed = Vec::new();
    if metrics.sharpe < th.min_sharpe {
        failed.push("sharpe".to_string());
    }
    if metrics.max_dd > th.max_drawdown {
        failed.push("max_dd".to_string());
    }
    if metrics.trades < th.min_trades {
        failed.push("trades".to_string());
    }
    if metrics.win_rate < th.min_win_rate {
        failed.push("win_rate".to_string());
    }
    if metrics.slippage_bps > th.max_slippage_bps {
        failed.push("slippage_bps".to_string());
    }
    PrecheckResult { ok: failed.is_empty(), failed, metrics }
}

/// Gate with a per-(session, strategy) result cache. Metrics for a pair never
/// change retroactively, so cached results never expire; a miss recomputes.
pub struct PrecheckGate {
    source: Box<dyn MetricsSource>,
    thresholds: Thresholds,
    cache: std::sync::Mutex<HashMap<(String, String), PrecheckResult>>,
}

impl PrecheckGate {
    pub fn new(source: Box<dyn MetricsSource>, thresholds: Thresholds) -> Self {
        Self { source, thresholds, cache: std::sync::Mutex::new(HashMap::new()) }
    }

    /// Evaluate (or reuse) the precheck for a pair. `None` means the metrics
    /// source has never seen the pair; stage requests treat that as a full
    /// threshold failure rather than admitting unknown strategies.
    pub fn check(&self, session_id: &str, strategy_ref: &str) -> Option<PrecheckResult> {
        let key = (session_id.to_string(), strategy_ref.to_string());
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Some(hit.clone());
            }
        }
        let metrics = self.source.metrics(session_id, strategy_ref)?;
        let result = evaluate(metrics, &self.thresholds);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_thresholds() -> Thresholds {
        Thresholds {
            min_sharpe: 1.0,
            max_drawdown: 0.20,
            min_trades: 30,
            min_win_rate: 0.45,
            max_slippage_bps: 50.0,
        }
    }

    fn passing_metrics() -> StrategyMetrics {
        StrategyMetrics {
            sharpe: 1.5,
            max_dd: 0.10,
            trades: 120,
            win_rate: 0.55,
            slippage_bps: 12.0,
        }
    }

    #[test]
    fn test_all_thresholds_pass() {
        let result = evaluate(passing_metrics(), &default_thresholds());
        assert!(result.ok);
        assert!(result.failed.is_empty());
    }

    #[test]
    fn test_single_failure_named() {
        let metrics = StrategyMetrics { sharpe: 0.8, ..passing_metrics() };
        let result = evaluate(metrics, &default_thresholds());
        assert!(!result.ok);
        assert_eq!(result.failed, vec!["sharpe"]);
    }

    #[test]
    fn test_every_failure_listed() {
        let metrics = StrategyMetrics {
            sharpe: 0.0,
            max_dd: 0.9,
            trades: 2,
            win_rate: 0.1,
            slippage_bps: 400.0,
        };
        let result = evaluate(metrics, &default_thresholds());
        assert_eq!(
            result.failed,
            vec!["sharpe", "max_dd", "trades", "win_rate", "slippage_bps"]
        );
    }

    #[test]
    fn test_boundary_values_pass() {
        // Thresholds are inclusive on the passing side.
        let metrics = StrategyMetrics {
            sharpe: 1.0,
            max_dd: 0.20,
            trades: 30,
            win_rate: 0.45,
            slippage_bps: 50.0,
        };
        let result = evaluate(metrics, &default_thresholds());
        assert!(result.ok, "boundary metrics should pass: {:?}", result.failed);
    }

    #[test]
    fn test_gate_caches_result() {
        let mut source = StaticMetrics::new();
        source.insert("sess-1", "strat-1", passing_metrics());
        let gate = PrecheckGate::new(Box::new(source), default_thresholds());

        let first = gate.check("sess-1", "strat-1").unwrap();
        let second = gate.check("sess-1", "strat-1").unwrap();
        assert!(first.ok && second.ok);
        assert_eq!(first.metrics.trades, second.metrics.trades);
    }

    #[test]
    fn test_gate_unknown_pair_is_none() {
        let gate = PrecheckGate::new(Box::new(StaticMetrics::new()), default_thresholds());
        assert!(gate.check("sess-x", "strat-x").is_none());
    }
}
