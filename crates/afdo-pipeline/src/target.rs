//! Build target and SDK chroot descriptions

use crate::error::PipelineResult;
use crate::tool::{ToolInvocation, ToolOutput, ToolRunner};
use std::path::{Path, PathBuf};

/// Board being built, optionally with a variant (`board_variant`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Full target name, e.g. `eve` or `eve_kernelnext`
    pub name: String,
    /// Board part of the name
    pub board: String,
    /// Variant part of the name
    pub variant: Option<String>,
    /// Sysroot inside the chroot
    pub root: PathBuf,
}

impl BuildTarget {
    /// Create a new build target rooted at `/build/<name>`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (board, variant) = match name.split_once('_') {
            Some((board, variant)) => (board.to_string(), Some(variant.to_string())),
            None => (name.clone(), None),
        };
        let root = PathBuf::from("/build").join(&name);

        Self {
            name,
            board,
            variant,
            root,
        }
    }

    /// Set the sysroot
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Board-specific wrapper for a portage tool, e.g. `ebuild-eve`
    pub fn wrapper(&self, tool: &str) -> String {
        format!("{}-{}", tool, self.name)
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// SDK chroot the toolchain runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chroot {
    /// Chroot directory on the host
    pub path: PathBuf,
    /// Extra arguments for entering the chroot
    pub enter_args: Vec<String>,
    /// Wrap commands with the chroot entry tool
    pub enter: bool,
}

impl Chroot {
    /// Create new chroot description
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enter_args: Vec::new(),
            enter: true,
        }
    }

    /// Set chroot entry arguments
    pub fn with_enter_args(mut self, args: Vec<String>) -> Self {
        self.enter_args = args;
        self
    }

    /// Run commands directly; the caller is already inside the chroot
    pub fn already_inside(mut self) -> Self {
        self.enter = false;
        self
    }

    /// Host path of the chroot's /tmp
    pub fn tmp_dir(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// Host path for a path inside the chroot
    pub fn full_path(&self, inside: impl AsRef<Path>) -> PathBuf {
        let inside = inside.as_ref();
        self.path.join(inside.strip_prefix("/").unwrap_or(inside))
    }

    /// Path inside the chroot for a host path under it
    pub fn chroot_path(&self, host: impl AsRef<Path>) -> PathBuf {
        let host = host.as_ref();
        match host.strip_prefix(&self.path) {
            Ok(rel) => Path::new("/").join(rel),
            Err(_) => host.to_path_buf(),
        }
    }

    /// Wrap an invocation so it runs inside the chroot
    pub fn enter(&self, invocation: ToolInvocation) -> ToolInvocation {
        if !self.enter {
            return invocation;
        }

        let mut wrapped = ToolInvocation::new("cros_sdk")
            .args(self.enter_args.iter().cloned())
            .arg("--")
            .arg(invocation.program)
            .args(invocation.args);
        wrapped.cwd = invocation.cwd;
        wrapped.stdin = invocation.stdin;
        wrapped.stdout = invocation.stdout;
        wrapped
    }
}

/// Runs toolchain commands, inside the chroot when one is configured
///
/// Arguments naming files go through [`arg`](Self::arg) so they resolve
/// inside the chroot; stdin/stdout redirections stay host paths.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
    runner: &'a dyn ToolRunner,
    chroot: Option<&'a Chroot>,
}

impl<'a> Toolchain<'a> {
    /// Create new toolchain runner
    pub fn new(runner: &'a dyn ToolRunner, chroot: Option<&'a Chroot>) -> Self {
        Self { runner, chroot }
    }

    /// Underlying runner, for host-side commands
    pub fn runner(&self) -> &'a dyn ToolRunner {
        self.runner
    }

    /// Chroot the commands run in
    pub fn chroot(&self) -> Option<&'a Chroot> {
        self.chroot
    }

    /// Render a host path as the tool will see it
    pub fn arg(&self, host: &Path) -> String {
        match self.chroot {
            Some(chroot) if chroot.enter => chroot.chroot_path(host).display().to_string(),
            _ => host.display().to_string(),
        }
    }

    /// Run a command, failing on a non-zero exit
    pub fn run(&self, invocation: ToolInvocation) -> PipelineResult<ToolOutput> {
        let invocation = match self.chroot {
            Some(chroot) => chroot.enter(invocation),
            None => invocation,
        };
        self.runner.run_checked(&invocation)
    }
}
