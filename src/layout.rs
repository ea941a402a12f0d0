use std::path::{Path, PathBuf};

/// On-disk layout of a launcher installation.
///
/// Everything lives under one base directory (by default the directory the
/// launcher executable sits in): bundled packages under `packages/`, service
/// work directories under `data/`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the directory containing the running executable.
    pub fn from_current_exe() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(dir))
    }

    /// The base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn server_package_dir(&self) -> PathBuf {
        self.packages_dir().join("go-server")
    }

    pub fn agent_package_dir(&self) -> PathBuf {
        self.packages_dir().join("go-agent")
    }

    /// Bundled Java runtime home.
    pub fn java_home(&self) -> PathBuf {
        self.packages_dir().join("jre")
    }

    /// Server jar; `extra-props.yaml` for the server sits beside it.
    pub fn server_artifact(&self) -> PathBuf {
        self.server_package_dir().join("go.jar")
    }

    /// Agent bootstrapper jar.
    pub fn agent_artifact(&self) -> PathBuf {
        self.agent_package_dir().join("agent-bootstrapper.jar")
    }

    pub fn server_work_dir(&self) -> PathBuf {
        self.data_dir().join("server")
    }

    pub fn agent_work_dir(&self) -> PathBuf {
        self.data_dir().join("agent")
    }

    /// Default config file location.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(crate::config::CONFIG_FILE_NAME)
    }
}
