mod config;
mod console;
mod java;
mod layout;
mod pidfile;
mod properties;
mod service;
mod services;
mod signals;
mod supervisor;

use clap::Parser;
use config::LauncherConfig;
use java::Java;
use layout::Layout;
use service::ServiceKind;
use services::LiveServices;
use signals::{wait_for_interrupt, SignalTrap};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use supervisor::{StartError, StartRequest, Supervisor};

/// Git commit baked in at build time.
const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Build platform (e.g. `linux/amd64`), when the release build sets one.
const PLATFORM: Option<&str> = option_env!("PLATFORM");

/// `--version` line: package version, git commit, build platform.
fn long_version() -> &'static str {
    static LONG_VERSION: OnceLock<String> = OnceLock::new();
    LONG_VERSION.get_or_init(|| {
        let platform = match PLATFORM {
            Some(platform) => platform.to_string(),
            None => format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        };
        format!("{} ({GIT_COMMIT}) {platform}", env!("CARGO_PKG_VERSION"))
    })
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Starts a GoCD server and agent from a bundled Java runtime and keeps them
/// running until interrupted. Ctrl-C stops both and cleans up their PID files.
#[derive(Parser, Debug)]
#[command(name = "trial-launcher", version = long_version(), about)]
pub struct Cli {
    /// Base directory holding packages/ and data/ (default: the executable's directory)
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Config file path (default: <base-dir>/launcher.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only start the server
    #[arg(long)]
    no_agent: bool,

    /// Print the resolved layout and command lines, don't start anything
    #[arg(long)]
    dry_run: bool,

    /// Emit debug output
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    console::init(cli.debug);

    tracing::debug!(
        version = long_version(),
        "trial-launcher starting"
    );
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let layout = match &cli.base_dir {
        Some(dir) => Layout::new(dir),
        None => Layout::from_current_exe()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(|| layout.config_file());
    let config = LauncherConfig::load(&config_path)?;

    let java = Java::new(config.java.home.clone().unwrap_or_else(|| layout.java_home()));
    let supervisor = Supervisor::new(Arc::new(java.clone()), config.runtime_profile())
        .with_grace_period(config.grace_period());

    let mut requests = vec![StartRequest::new(
        ServiceKind::Server,
        layout.server_work_dir(),
        layout.server_artifact(),
    )];
    if config.agent.enabled && !cli.no_agent {
        requests.push(StartRequest::new(
            ServiceKind::Agent,
            layout.agent_work_dir(),
            layout.agent_artifact(),
        ));
    }

    if cli.dry_run {
        print_dry_run(&layout, &config_path, &config, &java, &supervisor, &requests)?;
        return Ok(());
    }

    let services = LiveServices::new();
    {
        let services = services.clone();
        let supervisor = supervisor.clone();
        let trap = SignalTrap::interrupts();
        tracing::debug!(signals = ?trap.signals(), "installing signal trap");
        trap.install(move || async move {
            services.stop_all(&supervisor).await;
        })?;
    }

    for request in requests {
        match services.start(&supervisor, request).await {
            Ok(true) => {}
            // The trap fired mid-startup; its hook stops what already runs and exits.
            Ok(false) => match wait_for_interrupt().await {},
            Err(e) => {
                if let StartError::PidFile { kind, pid, .. } = &e {
                    if let Err(kill_err) = supervisor::terminate_orphan(*pid) {
                        tracing::error!(
                            "Could not kill untracked {kind} process {pid}: {kill_err}"
                        );
                    }
                }
                services.stop_all(&supervisor).await;
                return Err(e.into());
            }
        }
    }

    tracing::debug!(count = services.len().await, "all services started");
    tracing::info!(
        "GoCD server will be available at {} once it finishes starting",
        config.web_url()
    );
    tracing::info!("Press Ctrl-C to stop");

    match wait_for_interrupt().await {}
}

/// Dry-run output: layout, then the command line for each service.
fn print_dry_run(
    layout: &Layout,
    config_path: &std::path::Path,
    config: &LauncherConfig,
    java: &Java,
    supervisor: &Supervisor,
    requests: &[StartRequest],
) -> Result<(), BoxError> {
    println!("trial-launcher dry-run");
    println!("  base dir  = {}", layout.root().display());
    println!("  config    = {}", config_path.display());
    println!("  java home = {}", java.home().display());
    println!("  web url   = {}", config.web_url());
    println!("  grace     = {}s", config.shutdown.grace_period_secs);
    println!(
        "  heap      = server {}, agent {}",
        supervisor.profile().server_heap,
        supervisor.profile().agent_heap
    );
    println!();

    for request in requests {
        let kind = request.kind;
        let props = supervisor.resolve_properties(request)?;
        let args = supervisor.resolve_args(request);

        println!("{kind}:");
        println!("    work dir: {}", request.work_dir.display());
        println!("    pidfile:  {}", kind.pid_file(&request.work_dir).display());
        for (key, value) in kind.env_overrides() {
            println!("    env:      {key}={value}");
        }
        println!(
            "    command:  {} {}",
            java.executable().display(),
            java.command_line(&props, &args).join(" ")
        );
    }

    tracing::debug!("dry-run complete (nothing started)");
    Ok(())
}
