//! Version ledger: last published artifact name per coordinate
//!
//! The ledger is a JSON object keyed by coordinate whose values carry at least
//! a `name` field:
//!
//! ```json
//! {
//!     "chromeos-kernel-4_4": {
//!         "name": "R78-12371.11-1565602499"
//!     }
//! }
//! ```
//!
//! Key order and unrelated fields survive a load/write cycle so published
//! diffs stay minimal.

use crate::{ArtifactError, ArtifactResult};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const NAME_FIELD: &str = "name";

/// Parsed version ledger
#[derive(Debug, Clone, PartialEq)]
pub struct VersionLedger {
    entries: Map<String, Value>,
    trailing_newline: bool,
}

impl FromStr for VersionLedger {
    type Err = ArtifactError;

    /// Parse a ledger from JSON text
    fn from_str(content: &str) -> ArtifactResult<Self> {
        let entries = match serde_json::from_str(content)? {
            Value::Object(entries) => entries,
            other => {
                return Err(ArtifactError::InvalidLedger {
                    path: PathBuf::new(),
                    reason: format!("expected a JSON object, found {}", json_kind(&other)),
                })
            }
        };

        for (coordinate, entry) in &entries {
            if !entry.is_object() {
                return Err(ArtifactError::InvalidLedger {
                    path: PathBuf::new(),
                    reason: format!("entry '{}' is not an object", coordinate),
                });
            }
        }

        Ok(Self {
            entries,
            trailing_newline: content.ends_with('\n'),
        })
    }
}

impl VersionLedger {
    /// Load a ledger file
    pub fn from_file(path: &Path) -> ArtifactResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
        content.parse::<Self>().map_err(|err| match err {
            ArtifactError::InvalidLedger { reason, .. } => ArtifactError::InvalidLedger {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Write the ledger to a file
    pub fn write_to_file(&self, path: &Path) -> ArtifactResult<()> {
        std::fs::write(path, self.to_string()).map_err(|e| ArtifactError::io(path, e))
    }

    /// Whether the ledger has an entry for `coordinate`
    pub fn contains(&self, coordinate: &str) -> bool {
        self.entries.contains_key(coordinate)
    }

    /// Recorded artifact name for `coordinate`
    pub fn get_name(&self, coordinate: &str) -> Option<&str> {
        self.entries.get(coordinate)?.get(NAME_FIELD)?.as_str()
    }

    /// Replace the recorded name; returns false when the coordinate is absent
    pub fn set_name(&mut self, coordinate: &str, name: &str) -> bool {
        match self.entries.get_mut(coordinate).and_then(Value::as_object_mut) {
            Some(entry) => {
                entry.insert(NAME_FIELD.to_string(), Value::String(name.to_string()));
                true
            }
            None => false,
        }
    }

    /// Coordinates in file order
    pub fn coordinates(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Serialized with 4-space indentation
impl fmt::Display for VersionLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.entries.serialize(&mut serializer).map_err(|_| fmt::Error)?;

        f.write_str(&String::from_utf8_lossy(&buf))?;
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
