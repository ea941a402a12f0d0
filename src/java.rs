//! Runtime builder: turns properties, environment overrides and arguments into
//! a startable child command.
//!
//! The supervisor only depends on [`RuntimeBuilder`]; [`Java`] is the
//! production implementation backed by the bundled JRE.

use crate::properties::{EnvOverrides, PropertySet};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Builds the command for a supervised child.
///
/// Implementations must not spawn anything; the supervisor owns process
/// group, working directory and spawn.
pub trait RuntimeBuilder: Send + Sync {
    /// Build a command that runs the runtime with `properties` as system
    /// properties, `env` layered over the inherited environment, and `args`.
    fn build(&self, properties: &PropertySet, env: &EnvOverrides, args: &[String]) -> Command;
}

/// A Java runtime rooted at a `JAVA_HOME`-style directory.
#[derive(Debug, Clone)]
pub struct Java {
    home: PathBuf,
}

impl Java {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// The runtime home (e.g. `packages/jre`).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Path to the `java` executable.
    pub fn executable(&self) -> PathBuf {
        self.home.join("bin").join("java")
    }

    /// Full argument vector passed to `java`: `-D` flags first, then `args`.
    pub fn command_line(&self, properties: &PropertySet, args: &[String]) -> Vec<String> {
        properties
            .iter()
            .map(|(k, v)| format!("-D{k}={v}"))
            .chain(args.iter().cloned())
            .collect()
    }
}

impl RuntimeBuilder for Java {
    fn build(&self, properties: &PropertySet, env: &EnvOverrides, args: &[String]) -> Command {
        let mut cmd = Command::new(self.executable());
        cmd.args(self.command_line(properties, args));
        cmd.envs(env);
        cmd.env("JAVA_HOME", &self.home);
        cmd
    }
}
