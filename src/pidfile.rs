//! PID file record: `<work_dir>/<service>.pid` holding the decimal PID.
//!
//! There is no locking. One launcher per work directory is assumed; a second
//! launcher pointed at the same directory will silently overwrite the record.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `pid` as decimal text, replacing any previous record.
    pub fn write(&self, pid: u32) -> std::io::Result<()> {
        if let Some(previous) = self.read() {
            tracing::debug!(
                path = %self.path.display(),
                previous,
                "replacing existing pidfile"
            );
        }
        std::fs::write(&self.path, pid.to_string())
    }

    /// PID recorded by an earlier start, if the file exists and parses.
    pub fn read(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Remove the record. Missing files are not an error.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_is_plain_decimal() {
        let dir = tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        pid_file.write(4242).unwrap();

        assert_eq!(std::fs::read_to_string(pid_file.path()).unwrap(), "4242");
        assert_eq!(pid_file.read(), Some(4242));
    }

    #[test]
    fn test_write_overwrites_stale_record() {
        let dir = tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("agent.pid"));
        std::fs::write(pid_file.path(), "99999\n").unwrap();

        pid_file.write(17).unwrap();
        assert_eq!(std::fs::read_to_string(pid_file.path()).unwrap(), "17");
    }

    #[test]
    fn test_read_garbage_is_none() {
        let dir = tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        assert_eq!(pid_file.read(), None);

        std::fs::write(pid_file.path(), "not-a-pid").unwrap();
        assert_eq!(pid_file.read(), None);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("server.pid"));
        pid_file.remove().unwrap();

        pid_file.write(1).unwrap();
        assert!(pid_file.exists());
        pid_file.remove().unwrap();
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let pid_file = PidFile::new("/nonexistent-dir/impossible/server.pid");
        assert!(pid_file.write(1).is_err());
    }
}
