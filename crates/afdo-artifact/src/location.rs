//! Remote artifact locations and compression suffixes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final path component of a URL or filesystem path
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Compression suffix carried by a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionSuffix {
    #[default]
    None,
    /// Benchmark profiles and debug binaries
    Bz2,
    /// Orderfiles and release profiles
    Xz,
    /// Kernel profiles
    GcovXz,
}

impl CompressionSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Bz2 => ".bz2",
            Self::Xz => ".xz",
            Self::GcovXz => ".gcov.xz",
        }
    }

    /// Detect the suffix of a file name
    pub fn detect(name: &str) -> Self {
        // .gcov.xz must win over .xz
        [Self::GcovXz, Self::Xz, Self::Bz2]
            .into_iter()
            .find(|suffix| name.ends_with(suffix.as_str()))
            .unwrap_or(Self::None)
    }

    /// Remove this suffix from `name` if present
    pub fn strip<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(self.as_str()).unwrap_or(name)
    }

    /// Append this suffix to `name`
    pub fn append(&self, name: &str) -> String {
        format!("{}{}", name, self.as_str())
    }
}

/// Artifact in a remote store: bucket root + relative name + compression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub root: String,
    pub name: String,
    pub suffix: CompressionSuffix,
}

impl ArtifactLocation {
    pub fn new(root: impl Into<String>, name: impl Into<String>, suffix: CompressionSuffix) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            suffix,
        }
    }

    /// Split a full URL into root, bare name and detected suffix
    pub fn from_url(url: &str) -> Self {
        let file_name = basename(url);
        let root = url
            .trim_end_matches('/')
            .strip_suffix(file_name)
            .unwrap_or("")
            .trim_end_matches('/');
        let suffix = CompressionSuffix::detect(file_name);

        Self::new(root, suffix.strip(file_name), suffix)
    }

    /// Stored file name, including the suffix
    pub fn file_name(&self) -> String {
        self.suffix.append(&self.name)
    }

    /// Full URL of the stored object
    pub fn url(&self) -> String {
        if self.root.is_empty() {
            return self.file_name();
        }
        format!("{}/{}", self.root.trim_end_matches('/'), self.file_name())
    }

    /// Same artifact under another root
    pub fn with_root(&self, root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
