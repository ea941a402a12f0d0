//! Signal trap: run one cleanup hook on the first interruption signal, then exit.
//!
//! A trap is a plain value owned by the caller. Installing it registers the
//! OS handlers and spawns a listener task; the caller keeps running. The
//! first watched signal runs the hook exactly once, then the trap's exit
//! action terminates the process with a non-zero status. Signals arriving
//! after the first are swallowed.

use nix::sys::signal::Signal;
use std::convert::Infallible;
use std::future::Future;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

type ExitAction = Box<dyn FnOnce(i32) + Send>;

pub struct SignalTrap {
    signals: Vec<Signal>,
    exit_code: i32,
    exit: ExitAction,
}

impl std::fmt::Debug for SignalTrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTrap")
            .field("signals", &self.signals)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

impl SignalTrap {
    /// Trap over `signals`, exiting with status 1 after the hook.
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
            exit_code: 1,
            exit: Box::new(|code| std::process::exit(code)),
        }
    }

    /// Ctrl-C, termination request and hangup.
    pub fn interrupts() -> Self {
        Self::new([Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP])
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Replace `std::process::exit` with another action.
    pub fn with_exit_action(mut self, exit: impl FnOnce(i32) + Send + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    /// Register the signal handlers and start listening in the background.
    ///
    /// Handler registration happens before this returns, so a signal sent
    /// right after a successful install is never lost.
    pub fn install<F, Fut>(self, hook: F) -> std::io::Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut streams = Vec::with_capacity(self.signals.len());
        for sig in &self.signals {
            streams.push((*sig, signal(SignalKind::from_raw(*sig as i32))?));
        }

        let (tx, mut rx) = mpsc::channel::<Signal>(1);
        for (sig, mut stream) in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.try_send(sig).is_err() {
                        // Already fired; keep draining so the default action stays masked.
                        tracing::debug!(signal = %sig, "ignoring signal, trap already fired");
                    }
                }
            });
        }
        drop(tx);

        let SignalTrap {
            exit_code, exit, ..
        } = self;
        tokio::spawn(async move {
            let Some(sig) = rx.recv().await else {
                return;
            };
            rx.close();
            tracing::debug!(signal = %sig, "caught signal, running shutdown hook");
            hook().await;
            exit(exit_code);
        });

        Ok(())
    }
}

/// Park the caller forever. The trap hook is the only way out.
pub async fn wait_for_interrupt() -> Infallible {
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_interrupts_watch_int_term_hup() {
        let trap = SignalTrap::interrupts();
        assert_eq!(
            trap.signals(),
            &[Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP]
        );
        assert_eq!(trap.exit_code, 1);
    }

    // The only test in this binary that raises SIGUSR1/SIGUSR2.
    #[tokio::test]
    async fn test_hook_runs_once_then_exits_nonzero() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (exit_tx, exit_rx) = oneshot::channel::<i32>();

        let hook_calls = calls.clone();
        SignalTrap::new([Signal::SIGUSR1, Signal::SIGUSR2])
            .with_exit_action(move |code| {
                let _ = exit_tx.send(code);
            })
            .install(move || async move {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        kill(Pid::this(), Signal::SIGUSR1).unwrap();
        let code = tokio::time::timeout(Duration::from_secs(5), exit_rx)
            .await
            .expect("trap did not fire")
            .unwrap();
        assert_ne!(code, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        kill(Pid::this(), Signal::SIGUSR2).unwrap();
        kill(Pid::this(), Signal::SIGUSR1).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_install_without_signals_never_fires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();
        SignalTrap::new([])
            .with_exit_action(|_| panic!("exit must not run"))
            .install(move || async move {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_for_interrupt_does_not_return() {
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_for_interrupt()).await;
        assert!(waited.is_err());
    }
}
