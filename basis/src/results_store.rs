use basis_instrument::Timestamp;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{io::Write, path::PathBuf};
use tokio::sync::mpsc;
use tracing::error;

/// One `results.csv` row (spec.md §6 "Persisted outputs").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultRow {
    pub timestamp: Timestamp,
    pub equity_share_class: Decimal,
    pub balance_pnl_period: Decimal,
    pub balance_pnl_cumulative: Decimal,
    pub attribution_total_cumulative: Decimal,
    pub reconciliation_diff: Decimal,
    pub overall_risk_status: SmolStr,
    pub net_delta: Decimal,
}

/// `summary.json`'s final aggregated metrics (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Summary {
    pub total_return: Decimal,
    pub annualized_return: Decimal,
    pub max_drawdown: Decimal,
    pub sharpe_ratio: Decimal,
    pub attribution_breakdown: std::collections::HashMap<SmolStr, Decimal>,
    pub min_risk_value: Option<Decimal>,
    pub max_risk_value: Option<Decimal>,
    pub execution_time_seconds: Decimal,
    /// Populated when a backtest fails mid-run (spec.md §7 "Backtest that fails mid-run still
    /// produces a partial results.csv ... plus an error section in summary.json").
    pub error: Option<String>,
}

enum WriterMessage {
    Row(ResultRow),
    Finalize(Summary),
}

/// Appends per-timestep result rows and the final summary (spec.md §4.12). Same async
/// single-writer queue pattern as [`crate::event_logger::EventLogger`]; each request owns one
/// `ResultsStore`, so there is no cross-request interleaving.
#[derive(Debug)]
pub struct ResultsStore {
    tx: mpsc::Sender<WriterMessage>,
    writer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ResultsStore {
    pub fn spawn(request_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&request_dir)?;
        let (tx, mut rx) = mpsc::channel::<WriterMessage>(1_024);

        let results_path = request_dir.join("results.csv");
        let summary_path = request_dir.join("summary.json");

        let writer = tokio::spawn(async move {
            let mut csv_writer = match csv::Writer::from_path(&results_path) {
                Ok(w) => w,
                Err(e) => {
                    error!(error = %e, "ResultsStore: failed to open results.csv");
                    return;
                }
            };

            while let Some(message) = rx.recv().await {
                match message {
                    WriterMessage::Row(row) => {
                        if csv_writer.serialize(&row).is_err() || csv_writer.flush().is_err() {
                            error!("ResultsStore: results.csv write failed");
                        }
                    }
                    WriterMessage::Finalize(summary) => {
                        let _ = csv_writer.flush();
                        match serde_json::to_vec_pretty(&summary) {
                            Ok(bytes) => {
                                if let Ok(mut file) = std::fs::File::create(&summary_path) {
                                    let _ = file.write_all(&bytes);
                                }
                            }
                            Err(e) => error!(error = %e, "ResultsStore: summary serialise failed"),
                        }
                    }
                }
            }
        });

        Ok(Self {
            tx,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Enqueue one per-timestep row. Never blocks the caller for longer than a bounded
    /// `try_send`.
    pub fn append(&self, row: ResultRow) {
        if self.tx.try_send(WriterMessage::Row(row)).is_err() {
            error!("ResultsStore: CRITICAL - results queue saturated, row dropped");
        }
    }

    /// Enqueue the terminal summary. Does not itself close the writer — call [`Self::close`]
    /// after to guarantee `summary.json` has been flushed before the caller exits.
    pub fn finalize(&self, summary: Summary) {
        if self.tx.try_send(WriterMessage::Finalize(summary)).is_err() {
            error!("ResultsStore: CRITICAL - results queue saturated, summary dropped");
        }
    }

    pub async fn close(self) {
        let handle = self.writer.lock().take();
        drop(self.tx);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
