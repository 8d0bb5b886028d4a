#[derive(Clone)]
pub struct Config {
    pub cap_pct: f64,
    pub equity: f64,
    pub default_ttl_secs: u64,
    pub renew_extend_secs: u64,
    pub sweep_secs: u64,
    pub persist_every_secs: u64,
    pub wal_path: String,
    pub sqlite_path: String,
    pub min_sharpe: f64,
    pub max_drawdown: f64,
    pub min_trades: u64,
    pub min_win_rate: f64,
    pub max_slippage_bps: f64,
    pub rebalance_step_pct: f64,
    pub alloc_floor: f64,
    pub alloc_ceiling: f64,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            cap_pct: std::env::var("CAP_PCT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.5),
            equity: std::env::var("EQUITY").ok().and_then(|v| v.parse().ok()).unwrap_or(100_000.0),
            default_ttl_secs: std::env::var("DEFAULT_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(86_400),
            renew_extend_secs: std::env::var("RENEW_EXTEND_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(86_400),
            sweep_secs: std::env::var("SWEEP_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(15),
            persist_every_secs: std::env::var("PERSIST_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            wal_path: std::env::var("WAL_PATH").unwrap_or_else(|_| "./ledger.wal".to_string()),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./ledger.sqlite".to_string()),
            min_sharpe: std::env::var("MIN_SHARPE").ok().and_then(|v| v.parse().ok()).unwrap_or(1.0),
            max_drawdown: std::env::var("MAX_DD").ok().and_then(|v| v.parse().ok()).unwrap_or(0.20),
            min_trades: std::env::var("MIN_TRADES").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            min_win_rate: std::env::var("MIN_WIN_RATE").ok().and_then(|v| v.parse().ok()).unwrap_or(0.45),
            max_slippage_bps: std::env::var("MAX_SLIPPAGE_BPS").ok().and_then(|v| v.parse().ok()).unwrap_or(50.0),
            rebalance_step_pct: std::env::var("REBALANCE_STEP_PCT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.10),
            alloc_floor: std::env::var("ALLOC_FLOOR").ok().and_then(|v| v.parse().ok()).unwrap_or(100.0),
            alloc_ceiling: std::env::var("ALLOC_CEILING").ok().and_then(|v| v.parse().ok()).unwrap_or(25_000.0),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(256),
        }
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
