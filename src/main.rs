use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::interval;

use capledger::config::{now_ts, Config};
use capledger::events::EventPublisher;
use capledger::ledger::LedgerStore;
use capledger::logging::{json_log, json_log_at, obj, v_num, v_str, Level};
use capledger::precheck::{PrecheckGate, StaticMetrics, Thresholds};
use capledger::storage::StateStore;
use capledger::sweeper::Sweeper;
use capledger::wal::Wal;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Recover ledger state from the WAL before anything else touches it.
    let recovered = Wal::recover(&cfg.wal_path)?;
    json_log(
        "recovery",
        obj(&[
            ("version", v_num(recovered.version as f64)),
            ("rows", v_num(recovered.rows.len() as f64)),
            ("skipped_lines", v_num(recovered.skipped_lines as f64)),
        ]),
    );
    let wal = Wal::open(&cfg.wal_path)?;

    let mut store_db = StateStore::new(&cfg.sqlite_path)?;
    store_db.init()?;

    // The metrics feed is an external collaborator; until one is wired in,
    // stage requests are rejected as metrics_unavailable.
    let gate = PrecheckGate::new(Box::new(StaticMetrics::new()), Thresholds::from_config(&cfg));
    let publisher = EventPublisher::new(cfg.event_channel_capacity);
    let mut event_rx = publisher.subscribe();

    let store = Arc::new(LedgerStore::from_recovered(
        cfg.clone(),
        gate,
        publisher,
        recovered,
        wal,
    ));
    json_log(
        "startup",
        obj(&[
            ("cap_pct", v_num(cfg.cap_pct)),
            ("equity", v_num(cfg.equity)),
            ("sweep_secs", v_num(cfg.sweep_secs as f64)),
            ("version", v_num(store.version() as f64)),
        ]),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(store.clone(), Duration::from_secs(cfg.sweep_secs));
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    // Drain outbound events to the log; real subscribers attach the same way.
    let mut event_shutdown = shutdown_rx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Ok(event) => json_log(
                        "event",
                        obj(&[
                            ("kind", v_str(event.kind.as_str())),
                            ("version", v_num(event.ledger_version as f64)),
                        ]),
                    ),
                    Err(_) => return,
                },
                _ = event_shutdown.changed() => return,
            }
        }
    });

    let mut persist_tick = interval(Duration::from_secs(cfg.persist_every_secs));
    let mut persist_shutdown = shutdown_rx;
    loop {
        tokio::select! {
            _ = persist_tick.tick() => {
                let view = store.get_ledger();
                let pool = store.get_pool_status();
                store_db.persist_snapshot(now_ts(), &view, &pool)?;
                if let Err(err) = store.write_snapshot() {
                    json_log_at(
                        Level::Error,
                        "wal_error",
                        obj(&[("error", v_str(&err.to_string()))]),
                    );
                }
                json_log(
                    "persist",
                    obj(&[
                        ("version", v_num(view.ledger_version as f64)),
                        ("rows", v_num(view.rows.len() as f64)),
                        ("utilization_pct", v_num(pool.utilization_pct)),
                        ("risk_level", v_str(pool.risk_level.as_str())),
                    ]),
                );
            }
            _ = tokio::signal::ctrl_c() => {
                json_log("shutdown", obj(&[("signal", v_str("ctrl_c"))]));
                let _ = shutdown_tx.send(true);
                break;
            }
            _ = persist_shutdown.changed() => break,
        }
    }

    // Let the sweeper finish its in-flight pass before exiting.
    let _ = sweeper_task.await;
    event_task.abort();

    let view = store.get_ledger();
    let pool = store.get_pool_status();
    store_db.persist_snapshot(now_ts(), &view, &pool)?;
    if let Err(err) = store.write_snapshot() {
        json_log_at(
            Level::Error,
            "wal_error",
            obj(&[("error", v_str(&err.to_string()))]),
        );
    }
    json_log("shutdown", obj(&[("status", v_str("clean"))]));
    Ok(())
}
