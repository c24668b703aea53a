//! Aggregate statistics over the ledger.

use super::record::ExecutionRecord;
use crate::ExecutionStatus;
use serde::Serialize;
use std::collections::BTreeSet;

/// Counts per status, completed-duration spread and distinct kernels/documents.
///
/// Durations are taken over COMPLETED records only and are 0 when there are
/// none.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub kernels_used: usize,
    pub documents_processed: usize,
}

impl ExecutionStats {
    /// Aggregate over a set of records.
    pub fn collect<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let mut stats = Self::default();
        let mut kernels = BTreeSet::new();
        let mut documents = BTreeSet::new();
        let mut durations = Vec::new();

        for record in records {
            stats.total = stats.total.saturating_add(1);
            let counter = match record.status {
                ExecutionStatus::Pending => &mut stats.pending,
                ExecutionStatus::Running => &mut stats.running,
                ExecutionStatus::Completed => &mut stats.completed,
                ExecutionStatus::Failed => &mut stats.failed,
                ExecutionStatus::Cancelled => &mut stats.cancelled,
            };
            *counter = counter.saturating_add(1);

            if record.status == ExecutionStatus::Completed
                && let Some(duration) = record.duration()
            {
                durations.push(duration);
            }
            kernels.insert(record.kernel_name.as_str());
            documents.insert(record.doc_path.as_str());
        }

        if !durations.is_empty() {
            stats.min_duration = durations.iter().copied().fold(f64::INFINITY, f64::min);
            stats.max_duration = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats.avg_duration = durations.iter().sum::<f64>() / durations.len() as f64;
        }
        stats.kernels_used = kernels.len();
        stats.documents_processed = documents.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionId;
    use crate::ledger::ExecutionRequest;

    fn finished(counter: u64, kernel: &str, doc: &str, status: ExecutionStatus, secs: f64) -> ExecutionRecord {
        let mut record = ExecutionRecord::start(
            ExecutionId::generate(0, counter),
            ExecutionRequest::new(kernel, doc),
            10.0,
        );
        record.status = status;
        record.end_time = Some(10.0 + secs);
        record
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = ExecutionStats::collect(std::iter::empty());
        assert_eq!(stats, ExecutionStats::default());
    }

    #[test]
    fn durations_come_from_completed_only() {
        let records = [
            finished(1, "a", "x.md", ExecutionStatus::Completed, 1.0),
            finished(2, "a", "y.md", ExecutionStatus::Completed, 3.0),
            finished(3, "b", "x.md", ExecutionStatus::Failed, 100.0),
        ];
        let stats = ExecutionStats::collect(&records);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.min_duration, 1.0);
        assert_eq!(stats.max_duration, 3.0);
        assert_eq!(stats.avg_duration, 2.0);
        assert_eq!(stats.kernels_used, 2);
        assert_eq!(stats.documents_processed, 2);
    }
}
