//! Launching and tearing down the external application.

use crate::error::ExportError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub env: Vec<(String, String)>,
}

/// A running application instance, observed only through liveness.
pub trait AppProcess: Send {
    fn id(&self) -> Option<u32>;
    fn is_alive(&mut self) -> bool;
    /// Force-terminate. Best effort.
    fn kill(&mut self);
}

pub trait AppLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AppProcess>, ExportError>;
}

/// Spawns the application with tokio; the child is killed if dropped.
pub struct SystemLauncher;

struct SystemProcess {
    child: tokio::process::Child,
}

impl AppProcess for SystemProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "failed to kill application process");
        }
    }
}

impl AppLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AppProcess>, ExportError> {
        let child = tokio::process::Command::new(&spec.program)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExportError::LaunchFailed {
                path: spec.program.clone(),
                source,
            })?;
        tracing::info!(pid = ?child.id(), program = %spec.program.display(), "application launched");
        Ok(Box::new(SystemProcess { child }))
    }
}

/// Launcher double that counts launches and never starts anything.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    pub struct FakeLauncher {
        launches: AtomicU32,
        kills: Arc<AtomicU32>,
        /// Processes not yet observed dead.
        live: Arc<AtomicU32>,
        /// Launches made while an earlier process was still alive.
        overlaps: AtomicU32,
        /// Processes ignore the graceful close request and must be killed.
        stubborn: bool,
        /// Liveness checks a killed process still answers alive.
        linger: u32,
        fail_launch: bool,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stubborn() -> Self {
            Self {
                stubborn: true,
                ..Self::default()
            }
        }

        /// Stubborn processes that take `checks` liveness checks to die after a kill.
        pub fn lingering(checks: u32) -> Self {
            Self {
                stubborn: true,
                linger: checks,
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_launch: true,
                ..Self::default()
            }
        }

        pub fn launches(&self) -> u32 {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn kills(&self) -> u32 {
            self.kills.load(Ordering::SeqCst)
        }

        pub fn overlaps(&self) -> u32 {
            self.overlaps.load(Ordering::SeqCst)
        }
    }

    struct FakeProcess {
        alive: bool,
        stubborn: bool,
        killed: bool,
        linger: u32,
        polled: u32,
        kills: Arc<AtomicU32>,
        live: Arc<AtomicU32>,
    }

    impl FakeProcess {
        fn die(&mut self) {
            if self.alive {
                self.alive = false;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl AppProcess for FakeProcess {
        fn id(&self) -> Option<u32> {
            None
        }

        fn is_alive(&mut self) -> bool {
            self.polled += 1;
            if self.killed {
                if self.linger > 0 {
                    self.linger -= 1;
                } else {
                    self.die();
                }
            } else if !self.stubborn && self.polled > 1 {
                // A cooperative process exits on the second liveness check
                // after teardown starts.
                self.die();
            }
            self.alive
        }

        fn kill(&mut self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.killed = true;
            if self.linger == 0 {
                self.die();
            }
        }
    }

    impl AppLauncher for FakeLauncher {
        fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AppProcess>, ExportError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail_launch {
                return Err(ExportError::LaunchFailed {
                    path: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            if self.live.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Box::new(FakeProcess {
                alive: true,
                stubborn: self.stubborn,
                killed: false,
                linger: self.linger,
                polled: 0,
                kills: self.kills.clone(),
                live: self.live.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_launch_failure() {
        let spec = LaunchSpec {
            program: PathBuf::from("/nonexistent/nesstar-explorer"),
            env: Vec::new(),
        };
        let err = SystemLauncher.launch(&spec).err().unwrap();
        assert!(matches!(err, ExportError::LaunchFailed { .. }));
        assert!(!err.is_recoverable());
    }
}
