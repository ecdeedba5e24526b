//! Package coordinates (`category/package-version[-rN]`)

use crate::{ArtifactError, ArtifactResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

static COORDINATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<category>[^/]+)/(?P<package>.+?)-(?P<version>\d[^-]*)(?:-r(?P<rev>\d+))?$")
        .expect("package coordinate grammar")
});

/// Version of an unpinned (head) descriptor
pub const HEAD_VERSION: &str = "9999";

/// Descriptor file extension
pub const DESCRIPTOR_EXTENSION: &str = "ebuild";

/// Category, package, version and optional revision of a build descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageCoordinate {
    pub category: String,
    pub package: String,
    /// Version without revision, e.g. `77.0.3849.0_rc`
    pub version: String,
    pub revision: Option<u32>,
}

impl PackageCoordinate {
    /// Parse `category/package-version[-rN]`
    pub fn parse(text: &str) -> ArtifactResult<Self> {
        let caps = COORDINATE
            .captures(text)
            .ok_or_else(|| ArtifactError::InvalidCoordinate(text.to_string()))?;

        let revision = match caps.name("rev") {
            Some(rev) => Some(
                rev.as_str()
                    .parse()
                    .map_err(|_| ArtifactError::InvalidCoordinate(text.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            category: caps["category"].to_string(),
            package: caps["package"].to_string(),
            version: caps["version"].to_string(),
            revision,
        })
    }

    /// Derive the coordinate from `<overlay>/<category>/<package>/<pf>.ebuild`
    pub fn from_descriptor_path(path: &Path) -> ArtifactResult<Self> {
        let invalid = || ArtifactError::InvalidCoordinate(path.display().to_string());

        if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
            return Err(invalid());
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
        let category = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|c| c.to_str())
            .ok_or_else(invalid)?;

        Self::parse(&format!("{}/{}", category, stem))
    }

    /// `category/package`
    pub fn cp(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    /// Version with the `_rc` marker removed, e.g. `77.0.3849.0`
    pub fn version_no_rc(&self) -> String {
        self.version.replace("_rc", "")
    }

    /// Full version including `-rN` when a revision is present
    pub fn full_version(&self) -> String {
        match self.revision {
            Some(rev) => format!("{}-r{}", self.version, rev),
            None => self.version.clone(),
        }
    }

    /// Release branch: the first dotted component of the version
    pub fn branch(&self) -> Option<u32> {
        self.version.split('.').next()?.parse().ok()
    }

    /// Whether this is the unpinned `9999` descriptor
    pub fn is_head(&self) -> bool {
        self.version == HEAD_VERSION
    }

    /// Coordinate with the next revision (`r1` when none is present)
    pub fn uprev(&self) -> Self {
        Self {
            revision: Some(self.revision.map_or(1, |rev| rev + 1)),
            ..self.clone()
        }
    }

    /// Descriptor file name, e.g. `chromeos-chrome-77.0.3849.0_rc-r1.ebuild`
    pub fn descriptor_file_name(&self) -> String {
        format!("{}-{}.{}", self.package, self.full_version(), DESCRIPTOR_EXTENSION)
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cp(), self.full_version())
    }
}

impl FromStr for PackageCoordinate {
    type Err = ArtifactError;

    fn from_str(s: &str) -> ArtifactResult<Self> {
        Self::parse(s)
    }
}
