mod jsonl_store;

pub use jsonl_store::JsonlHistoryStore;

use chrono::{DateTime, Utc};

use crate::error::ValuationError;
use crate::models::{PortfolioName, Snapshot};

/// In-memory view of one portfolio's snapshot history, ordered by timestamp.
///
/// Appends are guarded: a snapshot older than the latest recorded one is
/// rejected and leaves the series untouched. Equal timestamps are allowed so
/// re-runs within clock granularity still record.
#[derive(Debug, Clone)]
pub struct HistorySeries {
    portfolio: PortfolioName,
    snapshots: Vec<Snapshot>,
}

impl HistorySeries {
    pub fn new(portfolio: PortfolioName) -> Self {
        Self {
            portfolio,
            snapshots: Vec::new(),
        }
    }

    /// Build a series from already-loaded snapshots, sorting by timestamp.
    pub fn from_snapshots(portfolio: PortfolioName, mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by_key(|s| s.timestamp);
        Self {
            portfolio,
            snapshots,
        }
    }

    pub fn portfolio(&self) -> PortfolioName {
        self.portfolio
    }

    /// Validate that `candidate` may be appended without mutating anything.
    pub fn check_append(&self, candidate: DateTime<Utc>) -> Result<(), ValuationError> {
        if let Some(last) = self.snapshots.last() {
            if candidate < last.timestamp {
                return Err(ValuationError::NonMonotonicTimestamp {
                    last: last.timestamp,
                    candidate,
                });
            }
        }
        Ok(())
    }

    pub fn append(&mut self, snapshot: Snapshot) -> Result<(), ValuationError> {
        self.check_append(snapshot.timestamp)?;
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots within the inclusive `[from, to]` window; an unset bound is
    /// open on that side.
    pub fn range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().filter(move |s| {
            from.is_none_or(|f| s.timestamp >= f) && to.is_none_or(|t| s.timestamp <= t)
        })
    }
}
