//! OCI-style runtime specification model.
//!
//! Only the subset the launcher consumes is modelled; unknown fields in
//! `config.json` are ignored on load and absent ones default.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use runns_common::constants::SPEC_FILE;
use runns_common::error::{Result, RunnsError};
use serde::{Deserialize, Serialize};

/// Root filesystem section of the spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Root {
    /// Rootfs directory; may be relative to the invocation cwd.
    #[serde(default)]
    pub path: String,
    /// Whether the container root should be read-only.
    #[serde(default)]
    pub readonly: bool,
}

/// A single requested mount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountSpec {
    /// Destination path relative to the container root.
    #[serde(default)]
    pub destination: String,
    /// Filesystem type keyword (`bind`, `proc`, `sysfs`, `tmpfs`, or a
    /// driver name).
    #[serde(default, rename = "type")]
    pub fstype: String,
    /// Source path or pseudo-source (`proc`, `tmpfs`, ...).
    #[serde(default)]
    pub source: String,
    /// Textual option tokens.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Process to execute inside the container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Process {
    /// Program and arguments; the first element is executed.
    #[serde(default)]
    pub args: Vec<String>,
    /// Absolute working directory inside the container.
    #[serde(default)]
    pub cwd: String,
}

/// Parsed runtime specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Spec {
    /// Container hostname.
    #[serde(default)]
    pub hostname: String,
    /// Root filesystem section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,
    /// Free-form annotations, serialized into labels.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Requested mounts, applied in order.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    /// Process section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
}

/// Reads and validates `config.json` from `dir`.
///
/// # Errors
///
/// Returns a spec error when the file is missing or the process section
/// fails validation, and a serialization error on malformed JSON.
pub fn load_spec(dir: &Path) -> Result<Spec> {
    let path = dir.join(SPEC_FILE);
    let file = File::open(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            RunnsError::Spec {
                message: format!("JSON specification file {} not found", path.display()),
            }
        } else {
            RunnsError::Io {
                path: path.clone(),
                source: e,
            }
        }
    })?;
    let spec: Spec = serde_json::from_reader(file)?;
    validate_process(&spec)?;
    Ok(spec)
}

/// Checks the process-section invariants before any namespace work starts.
pub fn validate_process(spec: &Spec) -> Result<()> {
    let process = spec.process.as_ref().ok_or_else(|| RunnsError::Spec {
        message: "process must be specified".into(),
    })?;
    if process.cwd.is_empty() {
        return Err(RunnsError::Spec {
            message: "cwd property must not be empty".into(),
        });
    }
    if !Path::new(&process.cwd).is_absolute() {
        return Err(RunnsError::Spec {
            message: "cwd must be an absolute path".into(),
        });
    }
    if process.args.is_empty() {
        return Err(RunnsError::Spec {
            message: "args must not be empty".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "hostname": "box",
        "root": { "path": "./rootfs" },
        "annotations": { "team": "infra" },
        "mounts": [
            {
                "destination": "/proc",
                "type": "proc",
                "source": "proc",
                "options": ["nosuid", "noexec", "nodev"]
            }
        ],
        "process": { "args": ["/bin/true"], "cwd": "/" }
    }"#;

    #[test]
    fn parses_minimal_config() {
        let spec: Spec = serde_json::from_str(MINIMAL).expect("parse");
        assert_eq!(spec.hostname, "box");
        assert_eq!(spec.root.as_ref().expect("root").path, "./rootfs");
        assert!(!spec.root.as_ref().expect("root").readonly);
        assert_eq!(spec.mounts.len(), 1);
        assert_eq!(spec.mounts[0].fstype, "proc");
        assert_eq!(spec.annotations["team"], "infra");
        validate_process(&spec).expect("valid process");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let spec: Spec = serde_json::from_str(
            r#"{ "ociVersion": "1.0.2", "linux": { "namespaces": [] },
                 "process": { "args": ["sh"], "cwd": "/" } }"#,
        )
        .expect("parse");
        assert!(spec.root.is_none());
    }

    #[test]
    fn load_spec_missing_file_is_a_spec_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_spec(dir.path()).unwrap_err();
        assert!(matches!(err, RunnsError::Spec { .. }));
        assert!(format!("{err}").contains("not found"));
    }

    #[test]
    fn load_spec_round_trips_through_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(SPEC_FILE), MINIMAL).expect("write");
        let spec = load_spec(dir.path()).expect("load");

        let json = serde_json::to_string(&spec).expect("serialize");
        let again: Spec = serde_json::from_str(&json).expect("reparse");
        assert_eq!(again.mounts[0].destination, "/proc");
        assert_eq!(again.process.expect("process").args, vec!["/bin/true"]);
    }

    #[test]
    fn validate_rejects_missing_process() {
        let spec = Spec::default();
        assert!(validate_process(&spec).is_err());
    }

    #[test]
    fn validate_rejects_empty_args() {
        let spec = Spec {
            process: Some(Process {
                args: vec![],
                cwd: "/".into(),
            }),
            ..Spec::default()
        };
        let err = validate_process(&spec).unwrap_err();
        assert!(format!("{err}").contains("args"));
    }

    #[test]
    fn validate_rejects_relative_cwd() {
        let spec = Spec {
            process: Some(Process {
                args: vec!["sh".into()],
                cwd: "work".into(),
            }),
            ..Spec::default()
        };
        let err = validate_process(&spec).unwrap_err();
        assert!(format!("{err}").contains("absolute"));
    }

    #[test]
    fn validate_rejects_empty_cwd() {
        let spec = Spec {
            process: Some(Process {
                args: vec!["sh".into()],
                cwd: String::new(),
            }),
            ..Spec::default()
        };
        assert!(validate_process(&spec).is_err());
    }
}
