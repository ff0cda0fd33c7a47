//! Module loaders.
//!
//! `import` resolves module paths through a [`ModuleLoader`].  Two are
//! provided: [`MemoryLoader`] for embedded sources and [`FsLoader`] for
//! files under a root directory.  Any `Fn(&str) -> Result<Script, LoadError>`
//! closure is a loader too.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::LoadError;
use crate::syntax::{self, Script};

/// Extension tried when a requested path names no existing file.
pub const SOURCE_EXTENSION: &str = "gshell";

/// Turns a module path into a syntax tree.
pub trait ModuleLoader: Send + Sync {
    fn parse(&self, path: &str) -> Result<Script, LoadError>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&str) -> Result<Script, LoadError> + Send + Sync,
{
    fn parse(&self, path: &str) -> Result<Script, LoadError> {
        self(path)
    }
}

// ── MemoryLoader ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Entry {
    Source(String),
    Tree(Script),
}

/// Path → module table held in memory.  Sources are parsed on each load.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    modules: HashMap<String, Entry>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, path: impl Into<String>, src: impl Into<String>) -> &mut Self {
        self.modules.insert(path.into(), Entry::Source(src.into()));
        self
    }

    pub fn add_script(&mut self, path: impl Into<String>, script: Script) -> &mut Self {
        self.modules.insert(path.into(), Entry::Tree(script));
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }
}

impl ModuleLoader for MemoryLoader {
    fn parse(&self, path: &str) -> Result<Script, LoadError> {
        match self.modules.get(path) {
            Some(Entry::Source(src)) => Ok(syntax::parse(src)?),
            Some(Entry::Tree(script)) => Ok(script.clone()),
            None => Err(LoadError::NotFound(path.to_owned())),
        }
    }
}

// ── FsLoader ──────────────────────────────────────────────────────────────────

/// Reads modules from files below `root`.
///
/// `lib/math` resolves to `<root>/lib/math`, or to `<root>/lib/math.gshell`
/// when the former does not exist.  Paths that are absolute or climb out
/// with `..` are never found.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsLoader { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            debug!(path, root = %self.root.display(), "module path leaves the loader root");
            return None;
        }
        let direct = self.root.join(relative);
        if direct.is_file() || direct.extension().is_some() {
            return Some(direct);
        }
        Some(direct.with_extension(SOURCE_EXTENSION))
    }
}

impl ModuleLoader for FsLoader {
    fn parse(&self, path: &str) -> Result<Script, LoadError> {
        let file = self.resolve(path).ok_or_else(|| LoadError::NotFound(path.to_owned()))?;
        let src = std::fs::read_to_string(&file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(path.to_owned()),
            _ => LoadError::Io { path: file.display().to_string(), source: e },
        })?;
        Ok(syntax::parse(&src)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
