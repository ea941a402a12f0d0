//! Runtime properties handed to the JVM and environment overrides for the child.
//!
//! Properties are layered: the service kind's base set, then caller-supplied
//! values, then the optional `extra-props.yaml` overlay that sits next to the
//! service artifact. Later layers win on key collision.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the overlay looked up in the artifact's directory.
pub const OVERLAY_FILE_NAME: &str = "extra-props.yaml";

/// Key/value runtime configuration, rendered as `-Dkey=value`.
pub type PropertySet = BTreeMap<String, String>;

/// Environment variables applied only to the child process.
pub type EnvOverrides = BTreeMap<String, String>;

/// Errors reading or parsing an overlay file.
#[derive(Debug)]
pub enum OverlayError {
    /// The overlay exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The overlay is not valid YAML or not a mapping.
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// A value is a sequence or mapping instead of a scalar.
    NotScalar { path: PathBuf, key: String },
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            OverlayError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            OverlayError::NotScalar { path, key } => {
                write!(
                    f,
                    "property {key:?} in {} must be a string, number or boolean",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for OverlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OverlayError::Read { source, .. } => Some(source),
            OverlayError::Parse { source, .. } => Some(source),
            OverlayError::NotScalar { .. } => None,
        }
    }
}

/// Location of the overlay for a given artifact: `<artifact dir>/extra-props.yaml`.
pub fn overlay_path(artifact: &Path) -> PathBuf {
    artifact
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(OVERLAY_FILE_NAME)
}

/// Merge the artifact's overlay into `props`, if the overlay exists.
///
/// A missing overlay (or one that is not a regular file) leaves `props`
/// untouched. A present but malformed overlay is an error and `props` is
/// left untouched as well.
pub fn merge_overlay(props: &mut PropertySet, artifact: &Path) -> Result<(), OverlayError> {
    tracing::debug!(artifact = %artifact.display(), "checking for extra properties");
    let path = overlay_path(artifact);

    if !path.is_file() {
        return Ok(());
    }

    tracing::debug!(path = %path.display(), "reading java properties");
    let extras = match read_overlay(&path) {
        Ok(extras) => extras,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "error while extracting properties");
            return Err(e);
        }
    };

    for (key, value) in extras {
        tracing::debug!("found property {key}={value}");
        props.insert(key, value);
    }
    Ok(())
}

/// Read an overlay file into a property set.
pub fn read_overlay(path: &Path) -> Result<PropertySet, OverlayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| OverlayError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_overlay(&contents, path)
}

fn parse_overlay(contents: &str, path: &Path) -> Result<PropertySet, OverlayError> {
    if contents.trim().is_empty() {
        return Ok(PropertySet::new());
    }

    let raw: Option<BTreeMap<String, Value>> =
        serde_yaml::from_str(contents).map_err(|e| OverlayError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut props = PropertySet::new();
    for (key, value) in raw.unwrap_or_default() {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(OverlayError::NotScalar {
                    path: path.to_path_buf(),
                    key,
                })
            }
        };
        props.insert(key, value);
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base() -> PropertySet {
        PropertySet::from([
            ("java.io.tmpdir".to_string(), "/tmp/x/tmp".to_string()),
            ("cruise.config.dir".to_string(), "/tmp/x/config".to_string()),
        ])
    }

    #[test]
    fn test_overlay_path_is_next_to_artifact() {
        assert_eq!(
            overlay_path(Path::new("/opt/packages/go-server/go.jar")),
            PathBuf::from("/opt/packages/go-server/extra-props.yaml")
        );
    }

    #[test]
    fn test_overlay_path_bare_file_name() {
        assert_eq!(
            overlay_path(Path::new("go.jar")),
            PathBuf::from("extra-props.yaml")
        );
    }

    #[test]
    fn test_missing_overlay_is_noop() {
        let dir = tempdir().unwrap();
        let mut props = base();
        merge_overlay(&mut props, &dir.path().join("go.jar")).unwrap();
        assert_eq!(props, base());
    }

    #[test]
    fn test_overlay_overrides_base_on_collision() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(OVERLAY_FILE_NAME),
            "java.io.tmpdir: /scratch\ngo.extra: hello\n",
        )
        .unwrap();

        let mut props = base();
        merge_overlay(&mut props, &dir.path().join("go.jar")).unwrap();

        assert_eq!(props["java.io.tmpdir"], "/scratch");
        assert_eq!(props["go.extra"], "hello");
        assert_eq!(props["cruise.config.dir"], "/tmp/x/config");
    }

    #[test]
    fn test_overlay_stringifies_scalars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(OVERLAY_FILE_NAME);
        std::fs::write(&path, "go.port: 8154\ngo.debug: true\n").unwrap();

        let props = read_overlay(&path).unwrap();
        assert_eq!(props["go.port"], "8154");
        assert_eq!(props["go.debug"], "true");
    }

    #[test]
    fn test_empty_overlay_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(OVERLAY_FILE_NAME);
        std::fs::write(&path, "\n").unwrap();
        assert!(read_overlay(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_overlay_fails_and_leaves_props() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(OVERLAY_FILE_NAME), "key: [unclosed\n").unwrap();

        let mut props = base();
        let err = merge_overlay(&mut props, &dir.path().join("go.jar")).unwrap_err();
        assert!(matches!(err, OverlayError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
        assert_eq!(props, base());
    }

    #[test]
    fn test_nested_value_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(OVERLAY_FILE_NAME);
        std::fs::write(&path, "nested:\n  a: b\n").unwrap();

        let err = read_overlay(&path).unwrap_err();
        assert!(matches!(err, OverlayError::NotScalar { ref key, .. } if key == "nested"));
    }

    #[test]
    fn test_overlay_directory_is_ignored() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(OVERLAY_FILE_NAME)).unwrap();

        let mut props = base();
        merge_overlay(&mut props, &dir.path().join("go.jar")).unwrap();
        assert_eq!(props, base());
    }
}
