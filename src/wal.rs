//! Append-only mutation log. Every committed ledger mutation lands here as
//! one JSON line before the caller sees success; recovery replays the log on
//! top of the most recent snapshot so a restart does not lose in-flight
//! allocations.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Allocation, AllocationDiff, AllocationStatus};

#[derive(Debug)]
pub struct Wal {
    file: File,
    path: String,
}

/// One committed mutation. `version` is the ledger version after the
/// mutation, so replay reproduces the exact version sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation")]
pub enum WalEntry {
    #[serde(rename = "stage")]
    Stage { version: u64, row: Allocation },
    #[serde(rename = "transition")]
    Transition {
        version: u64,
        id: String,
        from: AllocationStatus,
        to: AllocationStatus,
    },
    #[serde(rename = "renew")]
    Renew { version: u64, id: String, ttl_until: u64 },
    #[serde(rename = "remove")]
    Remove { version: u64, id: String },
    #[serde(rename = "rebalance")]
    Rebalance { version: u64, diffs: Vec<AllocationDiff> },
    #[serde(rename = "settlement")]
    Settlement { version: u64, id: String, pnl_delta: f64 },
    #[serde(rename = "equity")]
    Equity { version: u64, equity: f64 },
    #[serde(rename = "snapshot")]
    Snapshot {
        version: u64,
        equity: f64,
        next_seq: u64,
        rows: Vec<Allocation>,
    },
}

/// Ledger state rebuilt from the log.
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    pub version: u64,
    pub equity: Option<f64>,
    pub next_seq: u64,
    pub rows: Vec<Allocation>,
    /// Lines that failed to parse; logged and skipped, never fatal.
    pub skipped_lines: usize,
}

impl Wal {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file, path: path.to_string() })
    }

    pub fn append_entry(&mut self, entry: &WalEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry).unwrap_or_else(|_| "{}".to_string());
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.file.sync_data()
    }

    /// Compact the log down to a single snapshot entry. The snapshot goes to
    /// a temp file first and is renamed into place, so a crash mid-write
    /// leaves the old log intact; appends continue on the new file.
    pub fn write_snapshot(
        &mut self,
        version: u64,
        equity: f64,
        next_seq: u64,
        rows: &[Allocation],
    ) -> std::io::Result<()> {
        let entry = WalEntry::Snapshot { version, equity, next_seq, rows: rows.to_vec() };
        let line = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
        let tmp = format!("{}.tmp", self.path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Read all lines from the log file.
    pub fn replay(path: &str) -> std::io::Result<Vec<String>> {
        if !Path::new(path).exists() {
            return Ok(vec![]);
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let reader = BufReader::new(file);
        Ok(reader.lines().map_while(Result::ok).collect())
    }

    /// Rebuild ledger state: start from the last snapshot seen (if any) and
    /// apply every mutation after it. Unparseable lines are counted and
    /// skipped.
    pub fn recover(path: &str) -> std::io::Result<RecoveredState> {
        let lines = Self::replay(path)?;
        let mut state = RecoveredState::default();

        for line in lines {
            let entry: WalEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(_) => {
                    state.skipped_lines += 1;
                    continue;
                }
            };
            match entry {
                WalEntry::Snapshot { version, equity, next_seq, rows } => {
                    state.version = version;
                    state.equity = Some(equity);
                    state.next_seq = next_seq;
                    state.rows = rows;
                }
                WalEntry::Stage { version, row } => {
                    state.version = version;
                    state.next_seq = state.next_seq.max(parse_seq(&row.id));
                    state.rows.push(row);
                }
                WalEntry::Transition { version, id, to, .. } => {
                    state.version = version;
                    if let Some(row) = state.rows.iter_mut().find(|r| r.id == id) {
                        row.status = to;
                    }
                }
                WalEntry::Renew { version, id, ttl_until } => {
                    state.version = version;
                    if let Some(row) = state.rows.iter_mut().find(|r| r.id == id) {
                        row.ttl_until = ttl_until;
                    }
                }
                WalEntry::Remove { version, id } => {
                    state.version = version;
                    state.rows.retain(|r| r.id != id);
                }
                WalEntry::Rebalance { version, diffs } => {
                    state.version = version;
                    for diff in diffs {
                        if let Some(row) = state.rows.iter_mut().find(|r| r.id == diff.id) {
                            row.allocation_amount = diff.new_amount;
                        }
                    }
                }
                WalEntry::Settlement { version, id, pnl_delta } => {
                    state.version = version;
                    if let Some(row) = state.rows.iter_mut().find(|r| r.id == id) {
                        row.realized_pnl += pnl_delta;
                    }
                }
                WalEntry::Equity { version, equity } => {
                    state.version = version;
                    state.equity = Some(equity);
                }
            }
        }
        Ok(state)
    }

}

/// Allocation ids are `AL-<seq>`; recovery needs the high-water mark so new
/// ids never collide with replayed ones.
fn parse_seq(id: &str) -> u64 {
    id.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0)
}
