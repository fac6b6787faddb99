use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recode_core::ConvertError;

/// Registry of in-flight encoder processes, keyed by job id.
///
/// Owned by the orchestrator and shared by handle, never global, so
/// independent orchestrator instances do not interfere. Cancellation is
/// idempotent: a job id is removed the first time it is cancelled, and
/// later calls are no-ops.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job and returns the token its process waits on.
    pub fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().unwrap().insert(job_id, token.clone());
        token
    }

    /// Removes a job after its process has exited.
    pub fn deregister(&self, job_id: Uuid) {
        self.inner.lock().unwrap().remove(&job_id);
    }

    /// Requests termination of one job's process. Returns whether a
    /// process was actually signalled; cancelling twice, or after natural
    /// exit, is a no-op.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.inner.lock().unwrap().remove(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Terminates every outstanding process. Used at shutdown.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inner.lock().unwrap().drain().collect();
        for (job_id, token) in &drained {
            tracing::info!(job_id = %job_id, "Cancelling in-flight conversion");
            token.cancel();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

enum WaitOutcome {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// One spawned encoder run. In streaming mode stdin and stdout are piped;
/// in file mode only stderr is captured. The child is killed on drop so a
/// panicking caller cannot leak a process.
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
}

impl EncoderProcess {
    /// Spawns the encoder. A missing or unrunnable binary is a
    /// deployment-level error (`EncoderUnavailable`), distinct from any
    /// per-job failure.
    pub fn spawn(
        encoder_path: &str,
        args: &[String],
        streaming: bool,
    ) -> Result<Self, ConvertError> {
        let stdio = |piped: bool| if piped { Stdio::piped() } else { Stdio::null() };

        let child = Command::new(encoder_path)
            .args(args)
            .stdin(stdio(streaming))
            .stdout(stdio(streaming))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    ConvertError::EncoderUnavailable(format!("{}: {}", encoder_path, e))
                }
                _ => ConvertError::Internal(format!("failed to spawn encoder: {}", e)),
            })?;

        tracing::debug!(
            encoder = %encoder_path,
            streaming,
            pid = child.id(),
            "Encoder process started"
        );

        Ok(Self { child })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Waits for the process under a deadline and a cancellation token.
    ///
    /// Deadline expiry and cancellation both follow the graceful path: the
    /// process gets `grace` to exit on its own (its stdin is closed by
    /// then), and is force-killed if still alive. The exit status is
    /// returned untouched so the caller can attach stderr context to a
    /// non-zero exit.
    pub async fn wait(
        mut self,
        deadline: Duration,
        grace: Duration,
        cancel: CancellationToken,
    ) -> Result<ExitStatus, ConvertError> {
        let outcome = tokio::select! {
            status = self.child.wait() => WaitOutcome::Exited(status),
            _ = tokio::time::sleep(deadline) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        match outcome {
            WaitOutcome::Exited(Ok(status)) => Ok(status),
            WaitOutcome::Exited(Err(e)) => Err(ConvertError::Internal(format!(
                "failed waiting on encoder: {}",
                e
            ))),
            WaitOutcome::TimedOut => {
                tracing::warn!(
                    deadline_secs = deadline.as_secs_f64(),
                    "Encoder deadline expired, terminating"
                );
                self.terminate(grace).await;
                Err(ConvertError::Timeout(deadline))
            }
            WaitOutcome::Cancelled => {
                self.terminate(grace).await;
                Err(ConvertError::Cancelled)
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            if let Err(e) = self.child.kill().await {
                tracing::warn!(error = %e, "Failed to kill encoder process");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_spawn_missing_binary_is_config_error() {
        let err = EncoderProcess::spawn("/nonexistent/encoder-binary", &[], false).unwrap_err();
        assert!(matches!(err, ConvertError::EncoderUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_and_nonzero_exit() {
        let proc = EncoderProcess::spawn("/bin/sh", &["-c".into(), "exit 0".into()], false).unwrap();
        let status = proc
            .wait(
                Duration::from_secs(5),
                Duration::from_millis(100),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(status.success());

        let proc = EncoderProcess::spawn("/bin/sh", &["-c".into(), "exit 3".into()], false).unwrap();
        let status = proc
            .wait(
                Duration::from_secs(5),
                Duration::from_millis(100),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_kills_and_reports_timeout() {
        let proc = EncoderProcess::spawn("/bin/sh", &["-c".into(), "sleep 30".into()], false).unwrap();
        let started = Instant::now();
        let err = proc
            .wait(
                Duration::from_millis(100),
                Duration::from_millis(100),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation() {
        let registry = ProcessRegistry::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id);

        let proc = EncoderProcess::spawn("/bin/sh", &["-c".into(), "sleep 30".into()], false).unwrap();
        let waiter = tokio::spawn(proc.wait(
            Duration::from_secs(30),
            Duration::from_millis(100),
            token,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.cancel(job_id));
        // Idempotent: a second cancel finds nothing to signal.
        assert!(!registry.cancel(job_id));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all_drains_registry() {
        let registry = ProcessRegistry::new();
        registry.register(Uuid::new_v4());
        registry.register(Uuid::new_v4());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.cancel_all(), 2);
        assert!(registry.is_empty());
    }
}
