//! Cycle scheduling.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::pipeline::{CycleReport, SyncPipeline};

/// How a scheduler run ended.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cycles: u64,
    pub last: Option<CycleReport>,
    /// Stopped by cancellation rather than by a one-shot run finishing.
    pub cancelled: bool,
}

/// Runs cycles one after another with a fixed delay between them.
///
/// Cancellation is only observed before a cycle starts and during the wait
/// between cycles. A running cycle always completes.
pub struct Scheduler {
    pipeline: SyncPipeline,
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// `interval_secs == 0` runs exactly one cycle.
    pub fn new(pipeline: SyncPipeline, interval_secs: u64, cancel: CancellationToken) -> Self {
        Self {
            pipeline,
            interval: Duration::from_secs(interval_secs),
            cancel,
        }
    }

    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        self.interval.is_zero()
    }

    #[instrument(skip(self), fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            summary.last = Some(self.pipeline.run_cycle().await);
            summary.cycles += 1;

            if self.is_one_shot() {
                break;
            }

            info!(next_in_secs = self.interval.as_secs(), "Waiting for next cycle");
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = summary.cycles, cancelled = summary.cancelled, "Scheduler stopped");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::pipeline::tests::{person, FakeDirectory, FakePlatform};
    use async_trait::async_trait;
    use ldapsync_core::{DirectoryPlugin, FieldMapper, RawRecord, SyncResult};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    /// Cancels the token once it has served `limit` fetches.
    struct CancellingDirectory {
        inner: FakeDirectory,
        cancel: CancellationToken,
        limit: usize,
    }

    #[async_trait]
    impl DirectoryPlugin for CancellingDirectory {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn fetch_records(&self) -> SyncResult<Vec<RawRecord>> {
            let records = self.inner.fetch_records().await;
            if self.inner.fetches.load(Ordering::SeqCst) >= self.limit {
                self.cancel.cancel();
            }
            records
        }

        fn mapper(&self) -> &FieldMapper {
            self.inner.mapper()
        }
    }

    #[tokio::test]
    async fn test_zero_interval_runs_once() {
        let directory = Arc::new(FakeDirectory::with_records(vec![person("alice", "Alice", &[])]));
        let platform = Arc::new(FakePlatform::default());
        let pipeline = SyncPipeline::new(directory.clone(), platform, Hooks::none());

        let summary = Scheduler::new(pipeline, 0, CancellationToken::new()).run().await;

        assert_eq!(summary.cycles, 1);
        assert!(!summary.cancelled);
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 1);
        assert!(summary.last.unwrap().is_success());
    }

    fn cancelling_pipeline(cancel: &CancellationToken, limit: usize) -> SyncPipeline {
        let directory = Arc::new(CancellingDirectory {
            inner: FakeDirectory::with_records(vec![person("alice", "Alice", &[])]),
            cancel: cancel.clone(),
            limit,
        });
        SyncPipeline::new(directory, Arc::new(FakePlatform::default()), Hooks::none())
    }

    #[tokio::test]
    async fn test_cancelled_cycle_completes_then_stops() {
        let cancel = CancellationToken::new();
        let pipeline = cancelling_pipeline(&cancel, 1);

        let summary = Scheduler::new(pipeline, 3600, cancel).run().await;

        assert_eq!(summary.cycles, 1);
        assert!(summary.cancelled);
        assert!(summary.last.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_cycles_repeat_until_cancelled() {
        let cancel = CancellationToken::new();
        let pipeline = cancelling_pipeline(&cancel, 2);

        let summary = Scheduler::new(pipeline, 1, cancel).run().await;

        assert_eq!(summary.cycles, 2);
        assert!(summary.cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let directory = Arc::new(FakeDirectory::with_records(Vec::new()));
        let pipeline = SyncPipeline::new(directory.clone(), Arc::new(FakePlatform::default()), Hooks::none());

        let summary = Scheduler::new(pipeline, 0, cancel).run().await;

        assert_eq!(summary.cycles, 0);
        assert!(summary.cancelled);
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }
}
