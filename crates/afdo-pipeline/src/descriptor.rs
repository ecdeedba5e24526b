//! Build descriptor patching
//!
//! Descriptors are line-oriented files that reference artifacts through
//! variable assignments such as `AFDO_PROFILE_VERSION="R78-12371.11-1565602499"`.
//! Patching rewrites those assignments and either bumps the package revision
//! (stable descriptors) or rewrites in place (the unpinned `9999` descriptor).
//! A patch is all-or-nothing: the new content goes to a `.new` side file that
//! is only swapped in once every rule has matched.

use crate::error::{PipelineError, PipelineResult};
use crate::target::{BuildTarget, Toolchain};
use crate::tool::ToolInvocation;
use afdo_artifact::coordinate::DESCRIPTOR_EXTENSION;
use afdo_artifact::{PackageCoordinate, HEAD_VERSION};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Variable name to new value
pub type UpdateRules = BTreeMap<String, String>;

fn assignment_pattern(variable: &str) -> PipelineResult<Regex> {
    let pattern = format!(
        r#"^(?P<bef>{}=)(?P<name>("[^"]*"|.*))(?P<aft>.*)"#,
        regex::escape(variable)
    );
    Regex::new(&pattern).map_err(|e| PipelineError::InvalidDescriptor(e.to_string()))
}

fn side_file(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

/// A descriptor file and its package coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub coordinate: PackageCoordinate,
}

impl Descriptor {
    /// Describe the descriptor at `path`
    pub fn from_path(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let coordinate = PackageCoordinate::from_descriptor_path(&path)?;
        Ok(Self { path, coordinate })
    }

    /// Value assigned to `variable`, with surrounding quotes stripped
    pub fn read_variable(&self, variable: &str) -> PipelineResult<Option<String>> {
        let pattern = assignment_pattern(variable)?;
        let content = fs::read_to_string(&self.path).map_err(|e| PipelineError::io(&self.path, e))?;

        for line in content.lines() {
            if let Some(caps) = pattern.captures(line) {
                let value = &caps["name"];
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                return Ok(Some(value.to_string()));
            }
        }

        info!(variable, path = %self.path.display(), "variable not found in descriptor");
        Ok(None)
    }

    /// Like [`read_variable`](Self::read_variable), but a missing variable is an error
    pub fn require_variable(&self, variable: &str) -> PipelineResult<String> {
        self.read_variable(variable)?
            .ok_or_else(|| PipelineError::MissingMarker {
                path: self.path.clone(),
                variables: vec![variable.to_string()],
            })
    }
}

/// Apply rules to descriptor text
///
/// Returns the new text and the variables that never matched. Each line is
/// rewritten by at most one rule.
pub fn apply_rules(content: &str, rules: &UpdateRules) -> PipelineResult<(String, Vec<String>)> {
    let mut compiled = Vec::with_capacity(rules.len());
    for (variable, value) in rules {
        let replacement = format!("${{bef}}\"{}\"${{aft}}", value.replace('$', "$$"));
        compiled.push((variable, assignment_pattern(variable)?, replacement));
    }

    let mut satisfied = vec![false; compiled.len()];
    let mut patched = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let mut rewritten = None;
        for (index, (_, pattern, replacement)) in compiled.iter().enumerate() {
            if pattern.is_match(line) {
                rewritten = Some(pattern.replacen(line, 1, replacement.as_str()).into_owned());
                satisfied[index] = true;
                break;
            }
        }
        patched.push_str(rewritten.as_deref().unwrap_or(line));
    }

    let missing = compiled
        .iter()
        .zip(satisfied)
        .filter(|(_, hit)| !hit)
        .map(|((variable, _, _), _)| variable.to_string())
        .collect();

    Ok((patched, missing))
}

/// Patches descriptors and regenerates their manifests
pub struct DescriptorPatcher<'a> {
    toolchain: Toolchain<'a>,
    build_target: Option<&'a BuildTarget>,
}

impl<'a> DescriptorPatcher<'a> {
    /// Create new patcher
    pub fn new(toolchain: Toolchain<'a>) -> Self {
        Self {
            toolchain,
            build_target: None,
        }
    }

    /// Regenerate manifests for this build target after patching
    pub fn with_build_target(mut self, build_target: Option<&'a BuildTarget>) -> Self {
        self.build_target = build_target;
        self
    }

    /// Patch `descriptor`, optionally bumping its revision
    ///
    /// Returns the descriptor now holding the patched content.
    pub fn patch(&self, descriptor: &Descriptor, rules: &UpdateRules, uprev: bool) -> PipelineResult<Descriptor> {
        let patched = self.plan(descriptor, rules, uprev)?;
        self.commit(descriptor, patched, uprev)
    }

    /// Patched content of `descriptor`, without touching the file
    ///
    /// Fails with `MissingMarker` when a rule matches no line.
    pub fn plan(&self, descriptor: &Descriptor, rules: &UpdateRules, uprev: bool) -> PipelineResult<String> {
        let coordinate = &descriptor.coordinate;
        if uprev && coordinate.is_head() {
            return Err(PipelineError::InvalidDescriptor(format!(
                "cannot uprev unpinned descriptor {}",
                descriptor.path.display()
            )));
        }
        if !uprev && !coordinate.is_head() {
            return Err(PipelineError::InvalidDescriptor(format!(
                "refusing to patch pinned descriptor {} without uprev",
                descriptor.path.display()
            )));
        }

        let content =
            fs::read_to_string(&descriptor.path).map_err(|e| PipelineError::io(&descriptor.path, e))?;
        let (patched, missing) = apply_rules(&content, rules)?;
        if !missing.is_empty() {
            return Err(PipelineError::MissingMarker {
                path: descriptor.path.clone(),
                variables: missing,
            });
        }
        Ok(patched)
    }

    fn commit(&self, descriptor: &Descriptor, patched: String, uprev: bool) -> PipelineResult<Descriptor> {
        info!(path = %descriptor.path.display(), uprev, "patching descriptor");

        let coordinate = &descriptor.coordinate;
        let staged = side_file(&descriptor.path);
        fs::write(&staged, patched).map_err(|e| PipelineError::io(&staged, e))?;

        let result = if uprev {
            let next = coordinate.uprev();
            let dir = descriptor.path.parent().unwrap_or(Path::new(""));
            let new_path = dir.join(next.descriptor_file_name());
            fs::rename(&staged, &new_path).map_err(|e| PipelineError::io(&new_path, e))?;
            if new_path != descriptor.path {
                fs::remove_file(&descriptor.path).map_err(|e| PipelineError::io(&descriptor.path, e))?;
            }
            info!(from = %coordinate, to = %next, "upreved descriptor");
            Descriptor {
                path: new_path,
                coordinate: next,
            }
        } else {
            fs::rename(&staged, &descriptor.path).map_err(|e| PipelineError::io(&descriptor.path, e))?;
            descriptor.clone()
        };

        self.update_manifest(&result.path)?;
        Ok(result)
    }

    fn update_manifest(&self, path: &Path) -> PipelineResult<()> {
        let Some(target) = self.build_target else {
            return Ok(());
        };

        let invocation = ToolInvocation::new(target.wrapper("ebuild"))
            .arg(self.toolchain.arg(path))
            .args(["manifest", "--force"]);
        self.toolchain.run(invocation).map(drop)
    }
}

/// Descriptors of an overlay (`<overlay>/<category>/<package>/*.ebuild`)
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    overlay: PathBuf,
}

impl DescriptorSet {
    /// Create new descriptor set over `overlay`
    pub fn new(overlay: impl Into<PathBuf>) -> Self {
        Self {
            overlay: overlay.into(),
        }
    }

    fn package_dir(&self, category: &str, package: &str) -> PathBuf {
        self.overlay.join(category).join(package)
    }

    /// The single stable (versioned) descriptor of a package
    pub fn stable(&self, category: &str, package: &str) -> PipelineResult<Descriptor> {
        let dir = self.package_dir(category, package);
        let entries = fs::read_dir(&dir).map_err(|e| PipelineError::io(&dir, e))?;

        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
                continue;
            }
            let Ok(descriptor) = Descriptor::from_path(&path) else {
                continue;
            };
            let coordinate = &descriptor.coordinate;
            if coordinate.package == package && coordinate.version.contains('.') {
                found.push(descriptor);
            }
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            _ => {
                let mut paths: Vec<_> = found.iter().map(|d| d.path.display().to_string()).collect();
                paths.sort();
                Err(PipelineError::InvalidDescriptor(format!(
                    "wrong number of {}/{} descriptors found: [{}]",
                    category,
                    package,
                    paths.join(", ")
                )))
            }
        }
    }

    /// The unpinned `9999` descriptor of a package
    pub fn head(&self, category: &str, package: &str) -> PipelineResult<Descriptor> {
        let path = self
            .package_dir(category, package)
            .join(format!("{}-{}.{}", package, HEAD_VERSION, DESCRIPTOR_EXTENSION));
        if !path.is_file() {
            return Err(PipelineError::InvalidDescriptor(format!(
                "missing unpinned descriptor {}",
                path.display()
            )));
        }
        Descriptor::from_path(path)
    }

    /// Patch the stable descriptor with uprev and the `9999` one in place
    ///
    /// Both descriptors are checked before either is written, so a rule that
    /// misses in one leaves both untouched. Returns the new stable descriptor.
    pub fn update_descriptors(
        &self,
        patcher: &DescriptorPatcher<'_>,
        category: &str,
        package: &str,
        rules: &UpdateRules,
    ) -> PipelineResult<Descriptor> {
        let stable = self.stable(category, package)?;
        let head = self.head(category, package)?;

        let stable_content = patcher.plan(&stable, rules, true)?;
        let head_content = patcher.plan(&head, rules, false)?;

        let updated = patcher.commit(&stable, stable_content, true)?;
        patcher.commit(&head, head_content, false)?;
        Ok(updated)
    }
}
