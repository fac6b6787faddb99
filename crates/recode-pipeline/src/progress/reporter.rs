use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use recode_core::models::Phase;
use recode_storage::ProgressFn;

use crate::progress::store::ProgressStore;

struct ReporterState {
    last_write: Option<Instant>,
    last_percent: f32,
}

/// Throttled, phase-scoped progress reporter.
///
/// Call sites fire at high frequency (every stream chunk, every encoder
/// diagnostic line); the reporter persists at most once per throttle
/// interval unless the percentage moved by the configured minimum delta
/// or reached 100. The throttle decision is synchronous so the reporter
/// can back storage progress callbacks.
pub struct PhaseReporter {
    store: Arc<ProgressStore>,
    job_id: Uuid,
    phase: Phase,
    stage: String,
    throttle: std::time::Duration,
    min_delta_percent: f32,
    state: Mutex<ReporterState>,
}

impl PhaseReporter {
    pub fn new(
        store: Arc<ProgressStore>,
        job_id: Uuid,
        phase: Phase,
        stage: impl Into<String>,
        throttle: std::time::Duration,
        min_delta_percent: f32,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            job_id,
            phase,
            stage: stage.into(),
            throttle,
            min_delta_percent,
            state: Mutex::new(ReporterState {
                last_write: None,
                last_percent: -1.0,
            }),
        })
    }

    /// Decides whether `percent` is worth persisting right now.
    fn should_persist(&self, percent: f32) -> bool {
        let mut state = self.state.lock().unwrap();
        if percent <= state.last_percent {
            return false;
        }
        let due = match state.last_write {
            None => true,
            Some(at) => {
                at.elapsed() >= self.throttle
                    || percent - state.last_percent >= self.min_delta_percent
                    || percent >= 100.0
            }
        };
        if due {
            state.last_write = Some(Instant::now());
            state.last_percent = percent;
        }
        due
    }

    /// Persists an update if the throttle allows it.
    pub async fn report(&self, percent: f32) {
        self.report_media_time(percent, None, None).await;
    }

    pub async fn report_media_time(
        &self,
        percent: f32,
        elapsed: Option<String>,
        total: Option<String>,
    ) {
        if !self.should_persist(percent) {
            return;
        }
        self.store
            .report(self.job_id, self.phase, percent, &self.stage, elapsed, total)
            .await;
    }

    /// Bridges the reporter into a synchronous byte-progress callback.
    ///
    /// Bytes are scaled against `total_bytes` and capped to `cap_fraction`
    /// of the phase budget (a download should not visually outrun the work
    /// still remaining). Persistence happens on a spawned task so the
    /// callback never blocks the transfer.
    pub fn byte_callback(self: &Arc<Self>, total_bytes: u64, cap_fraction: f32) -> ProgressFn {
        let reporter = Arc::clone(self);
        Arc::new(move |bytes: u64| {
            if total_bytes == 0 {
                return;
            }
            let fraction = (bytes as f32 / total_bytes as f32).min(1.0);
            let percent = (fraction * 100.0).min(cap_fraction * 100.0);
            if reporter.should_persist(percent) {
                let reporter = Arc::clone(&reporter);
                let store = Arc::clone(&reporter.store);
                tokio::spawn(async move {
                    store
                        .report(
                            reporter.job_id,
                            reporter.phase,
                            percent,
                            &reporter.stage,
                            None,
                            None,
                        )
                        .await;
                });
            }
        })
    }
}
