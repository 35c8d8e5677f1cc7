use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::HistorySeries;
use crate::models::{PortfolioName, Snapshot};

/// Append-only JSONL history, one file per portfolio under
/// `<base>/history/<portfolio>.jsonl`.
///
/// Loads are tolerant: a malformed line (for example a truncated trailing
/// record from an interrupted write) is logged and skipped, never fatal.
/// Appends write exactly one line and never rewrite existing content.
pub struct JsonlHistoryStore {
    base_path: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn history_file(&self, portfolio: PortfolioName) -> PathBuf {
        self.base_path
            .join("history")
            .join(format!("{}.jsonl", portfolio.as_str()))
    }

    pub async fn load(&self, portfolio: PortfolioName) -> Result<HistorySeries> {
        let path = self.history_file(portfolio);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistorySeries::new(portfolio));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read history file {:?}", path));
            }
        };

        let mut snapshots = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Snapshot>(line) {
                Ok(snapshot) if snapshot.portfolio == portfolio => snapshots.push(snapshot),
                Ok(snapshot) => {
                    warn!(
                        file = %path.display(),
                        line = index + 1,
                        found = %snapshot.portfolio,
                        "skipping snapshot recorded for a different portfolio"
                    );
                }
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        line = index + 1,
                        error = %e,
                        "skipping malformed history line"
                    );
                }
            }
        }

        Ok(HistorySeries::from_snapshots(portfolio, snapshots))
    }

    /// Append `snapshot` to both the file and the in-memory series.
    ///
    /// The ordering guard runs before anything touches the file, so a
    /// rejected append leaves the history byte-identical.
    pub async fn append(
        &self,
        series: &mut HistorySeries,
        snapshot: Snapshot,
    ) -> Result<()> {
        series.check_append(snapshot.timestamp)?;

        let path = self.history_file(series.portfolio());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create history directory {:?}", parent))?;
        }

        let mut line = serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open history file {:?}", path))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to history file {:?}", path))?;
        file.flush().await?;

        // Already validated above.
        series.append(snapshot)?;
        Ok(())
    }

    pub async fn latest(&self, portfolio: PortfolioName) -> Result<Option<Snapshot>> {
        let series = self.load(portfolio).await?;
        Ok(series.latest().cloned())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
