//! Start/stop protocol for a single supervised service.
//!
//! Start prepares the work directory, assembles properties, spawns the child
//! as leader of its own process group and records its PID. Stop is
//! best-effort: interrupt (falling back to kill), kill the process group,
//! remove the PID file. Every stop step runs even if an earlier one failed;
//! failures are logged and collected in a [`ShutdownReport`].

use crate::java::RuntimeBuilder;
use crate::pidfile::PidFile;
use crate::properties::{self, OverlayError, PropertySet};
use crate::service::{RuntimeProfile, ServiceKind};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;

/// What to start and where.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub kind: ServiceKind,
    /// Directory the child runs in; created if missing.
    pub work_dir: PathBuf,
    /// Runnable artifact (the jar). Its directory is searched for the overlay.
    pub artifact: PathBuf,
    /// Extra properties layered over the kind's base set, under the overlay.
    pub properties: PropertySet,
    /// Appended after the kind's baseline arguments.
    pub extra_args: Vec<String>,
}

impl StartRequest {
    pub fn new(kind: ServiceKind, work_dir: impl Into<PathBuf>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            work_dir: work_dir.into(),
            artifact: artifact.into(),
            properties: PropertySet::new(),
            extra_args: Vec::new(),
        }
    }
}

/// Errors that abort a start.
#[derive(Debug)]
pub enum StartError {
    /// A work subdirectory could not be created.
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The overlay properties file exists but is unusable.
    Overlay(OverlayError),
    /// The OS refused to start the child.
    Launch {
        kind: ServiceKind,
        source: std::io::Error,
    },
    /// The child is running but its PID could not be recorded.
    ///
    /// The process at `pid` is left running and untracked; the caller decides
    /// whether to terminate it (see [`terminate_orphan`]).
    PidFile {
        kind: ServiceKind,
        pid: u32,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::CreateDir { path, source } => {
                write!(f, "failed to create directory {}: {}", path.display(), source)
            }
            StartError::Overlay(e) => write!(f, "invalid extra properties: {e}"),
            StartError::Launch { kind, source } => {
                write!(f, "failed to start the GoCD {kind}: {source}")
            }
            StartError::PidFile {
                kind,
                pid,
                path,
                source,
            } => write!(
                f,
                "failed to write pidfile {} for {kind} process {pid}: {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::CreateDir { source, .. } => Some(source),
            StartError::Overlay(e) => Some(e),
            StartError::Launch { source, .. } => Some(source),
            StartError::PidFile { source, .. } => Some(source),
        }
    }
}

impl From<OverlayError> for StartError {
    fn from(e: OverlayError) -> Self {
        StartError::Overlay(e)
    }
}

/// A started child. Consumed by [`Supervisor::stop`].
#[derive(Debug)]
pub struct ServiceHandle {
    kind: ServiceKind,
    work_dir: PathBuf,
    pid: u32,
    pid_file: PidFile,
    child: Child,
}

impl ServiceHandle {
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn pid_file(&self) -> &Path {
        self.pid_file.path()
    }

    /// Wait for the child to exit on its own.
    #[allow(dead_code)]
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }
}

/// One stop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    Interrupt,
    Kill,
    KillProcessGroup,
    RemovePidFile,
}

#[derive(Debug)]
pub struct StepFailure {
    pub step: ShutdownStep,
    pub error: std::io::Error,
}

/// Outcome of a stop: which steps ran and which of them failed.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub attempted: Vec<ShutdownStep>,
    pub failures: Vec<StepFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[allow(dead_code)]
    pub fn failed(&self, step: ShutdownStep) -> bool {
        self.failures.iter().any(|f| f.step == step)
    }

    fn record(&mut self, step: ShutdownStep, result: std::io::Result<()>) -> bool {
        self.attempted.push(step);
        match result {
            Ok(()) => true,
            Err(error) => {
                self.failures.push(StepFailure { step, error });
                false
            }
        }
    }
}

/// Delivers stop signals to a child and to its process group.
pub trait SignalSender: Send + Sync {
    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()>;
    fn killpg(&self, pgid: Pid, signal: Signal) -> nix::Result<()>;
}

/// Signals sent straight through to the OS.
#[derive(Debug, Default)]
pub struct OsSignals;

impl SignalSender for OsSignals {
    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        kill(pid, signal)
    }

    fn killpg(&self, pgid: Pid, signal: Signal) -> nix::Result<()> {
        killpg(pgid, signal)
    }
}

/// Starts and stops services through a [`RuntimeBuilder`].
///
/// Cheap to clone; clones share the builder.
#[derive(Clone)]
pub struct Supervisor {
    builder: Arc<dyn RuntimeBuilder>,
    signals: Arc<dyn SignalSender>,
    profile: RuntimeProfile,
    grace_period: Duration,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("profile", &self.profile)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(builder: Arc<dyn RuntimeBuilder>, profile: RuntimeProfile) -> Self {
        Self {
            builder,
            signals: Arc::new(OsSignals),
            profile,
            grace_period: Duration::ZERO,
        }
    }

    #[allow(dead_code)]
    pub fn with_signals(mut self, signals: Arc<dyn SignalSender>) -> Self {
        self.signals = signals;
        self
    }

    /// How long stop waits for an interrupted child to exit before moving on.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    /// Final property set for a request: kind base, request properties, overlay.
    pub fn resolve_properties(&self, request: &StartRequest) -> Result<PropertySet, OverlayError> {
        let mut props = request.kind.base_properties(&request.work_dir);
        props.extend(request.properties.clone());
        properties::merge_overlay(&mut props, &request.artifact)?;
        Ok(props)
    }

    /// Baseline arguments for the kind followed by the request's extras.
    pub fn resolve_args(&self, request: &StartRequest) -> Vec<String> {
        let mut args = request.kind.baseline_args(&request.artifact, &self.profile);
        args.extend(request.extra_args.iter().cloned());
        args
    }

    /// Start a service. Returns only once the PID file is written.
    pub fn start(&self, request: StartRequest) -> Result<ServiceHandle, StartError> {
        let kind = request.kind;

        for sub in kind.subdirs() {
            let path = request.work_dir.join(sub);
            std::fs::create_dir_all(&path)
                .map_err(|e| StartError::CreateDir { path, source: e })?;
        }

        let props = self.resolve_properties(&request)?;
        let env = kind.env_overrides();
        let args = self.resolve_args(&request);

        let mut cmd = self.builder.build(&props, &env, &args);
        cmd.process_group(0) // New process group so stop can reach grandchildren
            .current_dir(&request.work_dir)
            .stdin(Stdio::null());

        let pid_file = PidFile::new(kind.pid_file(&request.work_dir));

        tracing::info!("Starting the GoCD {kind}...");

        let child = cmd
            .spawn()
            .map_err(|e| StartError::Launch { kind, source: e })?;
        let pid = child.id().ok_or_else(|| StartError::Launch {
            kind,
            source: std::io::Error::other("spawned child has no pid"),
        })?;

        tracing::debug!(
            service = %kind,
            pid,
            pidfile = %pid_file.path().display(),
            "writing pidfile"
        );

        if let Err(e) = pid_file.write(pid) {
            return Err(StartError::PidFile {
                kind,
                pid,
                path: pid_file.path().to_path_buf(),
                source: e,
            });
        }

        Ok(ServiceHandle {
            kind,
            work_dir: request.work_dir,
            pid,
            pid_file,
            child,
        })
    }

    /// Stop a service. Never fails; an absent handle does nothing.
    pub async fn stop(&self, handle: Option<ServiceHandle>) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let Some(mut handle) = handle else {
            return report;
        };

        let kind = handle.kind;
        let pid = handle.pid;
        let target = Pid::from_raw(pid as i32);
        tracing::debug!("Ending {kind} process {pid}");

        let running = match handle.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(service = %kind, pid, %status, "process already exited");
                false
            }
            Err(e) => {
                tracing::debug!(service = %kind, pid, error = %e, "could not poll process state");
                true
            }
        };

        if running {
            tracing::info!("Stopping GoCD {kind}...");

            report.attempted.push(ShutdownStep::Interrupt);
            let signalled = match self.signals.kill(target, Signal::SIGINT) {
                Ok(()) => true,
                Err(interrupt_err) => {
                    tracing::debug!(
                        service = %kind,
                        pid,
                        error = %interrupt_err,
                        "interrupt failed, killing"
                    );
                    let killed = report.record(
                        ShutdownStep::Kill,
                        self.signals
                            .kill(target, Signal::SIGKILL)
                            .map_err(std::io::Error::from),
                    );
                    if !killed {
                        report.failures.push(StepFailure {
                            step: ShutdownStep::Interrupt,
                            error: interrupt_err.into(),
                        });
                        tracing::error!("Unable to stop the GoCD {kind}. See PID: {pid}");
                    }
                    killed
                }
            };

            if signalled && !self.grace_period.is_zero() {
                match tokio::time::timeout(self.grace_period, handle.child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!(service = %kind, pid, %status, "process exited")
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(service = %kind, pid, error = %e, "failed to wait for process")
                    }
                    Err(_) => tracing::debug!(
                        service = %kind,
                        pid,
                        grace_secs = self.grace_period.as_secs_f64(),
                        "process still running after grace period"
                    ),
                }
            }
        }

        match self.signals.killpg(target, Signal::SIGKILL) {
            Ok(()) => {
                report.record(ShutdownStep::KillProcessGroup, Ok(()));
            }
            Err(Errno::ESRCH) => {
                report.record(ShutdownStep::KillProcessGroup, Ok(()));
                tracing::debug!(service = %kind, pgid = pid, "process group already gone");
            }
            Err(e) => {
                report.record(ShutdownStep::KillProcessGroup, Err(e.into()));
                tracing::error!("Could not kill {kind} process {pid}; continuing anyway...");
            }
        }

        if handle.pid_file.exists() {
            tracing::debug!(pidfile = %handle.pid_file.path().display(), "removing pidfile");
            if let Err(e) = handle.pid_file.remove() {
                tracing::error!(
                    "Failed to remove pidfile {}.\n  Cause: {e}",
                    handle.pid_file.path().display()
                );
                report.record(ShutdownStep::RemovePidFile, Err(e));
            } else {
                report.record(ShutdownStep::RemovePidFile, Ok(()));
            }
        }

        report
    }
}

/// Kill the process group of a child that was started but never tracked.
pub fn terminate_orphan(pid: u32) -> std::io::Result<()> {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
