//! Live service bookkeeping shared between the main flow and the signal hook.

use crate::service::ServiceKind;
use crate::supervisor::{ServiceHandle, ShutdownReport, StartError, StartRequest, Supervisor};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tracked {
    handles: Vec<ServiceHandle>,
    /// Set by the first `stop_all`; no service starts afterwards.
    stopping: bool,
}

/// Handles of every started service, in start order.
///
/// Clones share the same set. Starting and stopping take the same lock, so a
/// stop that begins while a start is in flight waits for that start and then
/// stops its service too. [`LiveServices::stop_all`] drains the set, so a
/// handle is stopped at most once no matter who calls it.
#[derive(Debug, Clone, Default)]
pub struct LiveServices {
    inner: Arc<Mutex<Tracked>>,
}

impl LiveServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a service and track its handle.
    ///
    /// Returns `Ok(false)` without starting anything once a stop has begun.
    pub async fn start(
        &self,
        supervisor: &Supervisor,
        request: StartRequest,
    ) -> Result<bool, StartError> {
        let mut tracked = self.inner.lock().await;
        if tracked.stopping {
            tracing::debug!(service = %request.kind, "shutdown in progress, not starting");
            return Ok(false);
        }

        let handle = supervisor.start(request)?;
        tracing::debug!(
            service = %handle.kind(),
            pid = handle.pid(),
            work_dir = %handle.work_dir().display(),
            pidfile = %handle.pid_file().display(),
            "tracking service"
        );
        tracked.handles.push(handle);
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.handles.len()
    }

    /// Stop every tracked service, most recently started first.
    pub async fn stop_all(&self, supervisor: &Supervisor) -> Vec<(ServiceKind, ShutdownReport)> {
        let handles = {
            let mut tracked = self.inner.lock().await;
            tracked.stopping = true;
            std::mem::take(&mut tracked.handles)
        };

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles.into_iter().rev() {
            let kind = handle.kind();
            let report = supervisor.stop(Some(handle)).await;
            if report.is_clean() {
                tracing::debug!(service = %kind, steps = ?report.attempted, "service stopped");
            }
            for failure in &report.failures {
                tracing::warn!(
                    service = %kind,
                    step = ?failure.step,
                    error = %failure.error,
                    "shutdown step failed"
                );
            }
            reports.push((kind, report));
        }
        reports
    }
}
