//! Service kinds and their fixed launch tables.
//!
//! Everything that differs between the server and the agent (directories,
//! base properties, JVM arguments, environment) is looked up here rather than
//! branched on at call sites.

use crate::properties::{EnvOverrides, PropertySet};
use std::path::{Path, PathBuf};

/// Port the GoCD server listens on.
pub const HTTP_PORT: u16 = 8153;
/// Host the GoCD server binds to.
pub const BIND_HOST: &str = "localhost";

/// Environment variable the agent bootstrapper reads extra JVM flags from.
pub const AGENT_STARTUP_ARGS_ENV: &str = "AGENT_STARTUP_ARGS";

const AGENT_STARTUP_ARGS: &[&str] = &[
    "--enable-native-access=ALL-UNNAMED",
    "--sun-misc-unsafe-memory-access=allow",
    "-XX:+IgnoreUnrecognizedVMOptions",
];

const SERVER_JVM_FLAGS: &[&str] = &[
    "--add-opens=java.base/java.lang=ALL-UNNAMED",
    "--add-opens=java.base/java.util=ALL-UNNAMED",
    "--enable-native-access=ALL-UNNAMED",
    "--sun-misc-unsafe-memory-access=allow",
    "-XX:+IgnoreUnrecognizedVMOptions",
];

/// Web UI URL for a server on `host:port`.
pub fn web_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// URL agents register against.
pub fn agent_register_url(host: &str, port: u16) -> String {
    format!("{}/go", web_url(host, port))
}

/// A supervised role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Server,
    Agent,
}

impl ServiceKind {
    /// Short name used for the PID file and log lines.
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Server => "server",
            ServiceKind::Agent => "agent",
        }
    }

    /// Subdirectories created under the work directory before launch.
    pub fn subdirs(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Server => &["config", "tmp", "logs"],
            ServiceKind::Agent => &["tmp", "logs"],
        }
    }

    /// PID file for this kind inside `work_dir`.
    pub fn pid_file(self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.pid", self.name()))
    }

    /// Fixed properties the kind always runs with.
    pub fn base_properties(self, work_dir: &Path) -> PropertySet {
        let config_dir = work_dir.join("config");
        let tmp_dir = work_dir.join("tmp");
        let log_dir = work_dir.join("logs");
        let log_file = log_dir.join("stdout.log");

        let mut props = PropertySet::new();
        props.insert("java.io.tmpdir".into(), display(&tmp_dir));
        props.insert("gocd.redirect.stdout.to.file".into(), display(&log_file));

        match self {
            ServiceKind::Server => {
                props.insert(
                    "cruise.config.file".into(),
                    display(&config_dir.join("cruise-config.xml")),
                );
                props.insert("cruise.config.dir".into(), display(&config_dir));
            }
            ServiceKind::Agent => {
                props.insert("gocd.agent.log.dir".into(), display(&log_dir));
            }
        }
        props
    }

    /// JVM and application arguments, before any caller extras.
    pub fn baseline_args(self, artifact: &Path, profile: &RuntimeProfile) -> Vec<String> {
        let jar = display(artifact);
        match self {
            ServiceKind::Server => {
                let mut args = vec![format!("-Xmx{}", profile.server_heap)];
                args.extend(SERVER_JVM_FLAGS.iter().map(|s| s.to_string()));
                args.extend(["-jar".to_string(), jar, "-server".to_string()]);
                args
            }
            ServiceKind::Agent => vec![
                format!("-Xmx{}", profile.agent_heap),
                "-jar".to_string(),
                jar,
                "-serverUrl".to_string(),
                profile.server_url.clone(),
            ],
        }
    }

    /// Environment applied only to this kind's child.
    pub fn env_overrides(self) -> EnvOverrides {
        match self {
            ServiceKind::Server => EnvOverrides::new(),
            ServiceKind::Agent => EnvOverrides::from([(
                AGENT_STARTUP_ARGS_ENV.to_string(),
                AGENT_STARTUP_ARGS.join(" "),
            )]),
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for the JVM command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProfile {
    /// `-Xmx` value for the server, e.g. `1024m`.
    pub server_heap: String,
    /// `-Xmx` value for the agent, e.g. `256m`.
    pub agent_heap: String,
    /// Server URL the agent registers with.
    pub server_url: String,
}

impl Default for RuntimeProfile {
    fn default() -> Self {
        Self {
            server_heap: "1024m".to_string(),
            agent_heap: "256m".to_string(),
            server_url: agent_register_url(BIND_HOST, HTTP_PORT),
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_pid_files() {
        let wd = Path::new("/tmp/x");
        assert_eq!(ServiceKind::Server.pid_file(wd), PathBuf::from("/tmp/x/server.pid"));
        assert_eq!(ServiceKind::Agent.pid_file(wd), PathBuf::from("/tmp/x/agent.pid"));
        assert_eq!(ServiceKind::Agent.to_string(), "agent");
    }

    #[test]
    fn test_server_base_properties() {
        let props = ServiceKind::Server.base_properties(Path::new("/tmp/x"));
        let expected = PropertySet::from([
            ("cruise.config.dir".to_string(), "/tmp/x/config".to_string()),
            (
                "cruise.config.file".to_string(),
                "/tmp/x/config/cruise-config.xml".to_string(),
            ),
            ("java.io.tmpdir".to_string(), "/tmp/x/tmp".to_string()),
            (
                "gocd.redirect.stdout.to.file".to_string(),
                "/tmp/x/logs/stdout.log".to_string(),
            ),
        ]);
        assert_eq!(props, expected);
    }

    #[test]
    fn test_agent_base_properties() {
        let props = ServiceKind::Agent.base_properties(Path::new("/d/agent"));
        assert_eq!(props.len(), 3);
        assert_eq!(props["gocd.agent.log.dir"], "/d/agent/logs");
        assert_eq!(props["java.io.tmpdir"], "/d/agent/tmp");
        assert!(!props.contains_key("cruise.config.dir"));
    }

    #[test]
    fn test_subdirs_per_kind() {
        assert_eq!(ServiceKind::Server.subdirs(), &["config", "tmp", "logs"]);
        assert_eq!(ServiceKind::Agent.subdirs(), &["tmp", "logs"]);
    }

    #[test]
    fn test_server_baseline_args() {
        let args =
            ServiceKind::Server.baseline_args(Path::new("go-server.jar"), &RuntimeProfile::default());
        assert_eq!(args.first().map(String::as_str), Some("-Xmx1024m"));
        assert_eq!(&args[args.len() - 3..], &["-jar", "go-server.jar", "-server"]);
        assert!(args.contains(&"--add-opens=java.base/java.util=ALL-UNNAMED".to_string()));
    }

    #[test]
    fn test_agent_baseline_args() {
        let args = ServiceKind::Agent
            .baseline_args(Path::new("agent-bootstrapper.jar"), &RuntimeProfile::default());
        assert_eq!(
            args,
            vec![
                "-Xmx256m",
                "-jar",
                "agent-bootstrapper.jar",
                "-serverUrl",
                "http://localhost:8153/go",
            ]
        );
    }

    #[test]
    fn test_env_overrides_agent_only() {
        assert!(ServiceKind::Server.env_overrides().is_empty());
        let env = ServiceKind::Agent.env_overrides();
        assert_eq!(
            env[AGENT_STARTUP_ARGS_ENV],
            "--enable-native-access=ALL-UNNAMED --sun-misc-unsafe-memory-access=allow -XX:+IgnoreUnrecognizedVMOptions"
        );
    }

    #[test]
    fn test_urls() {
        assert_eq!(web_url("localhost", 8153), "http://localhost:8153");
        assert_eq!(agent_register_url("example.com", 80), "http://example.com:80/go");
    }
}
