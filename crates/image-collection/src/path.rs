//! Granule selection.
//!
//! A read names its granule with a `PATH = '<relative path>'` filter. When
//! it does not, the directory's configured default path is used, and when
//! there is none either the built-in placeholder. The chain is an ordered
//! list of providers, evaluated lazily until one yields a source.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoverageError, Result};

/// Attribute a path filter must compare against.
pub const PATH_ATTRIBUTE: &str = "PATH";

/// A granule selected by a path filter, relative to the collection root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSelector {
    relative: String,
}

impl PathSelector {
    pub fn new(relative: impl Into<String>) -> Self {
        Self {
            relative: relative.into(),
        }
    }

    /// Parse a `PATH = 'value'` equality filter.
    ///
    /// The attribute name is case-insensitive; the value must be single
    /// quoted, with `''` standing for one quote. Anything else is an
    /// `InvalidPathFilter` error.
    pub fn parse(filter: &str) -> Result<Self> {
        let invalid = || CoverageError::InvalidPathFilter(filter.to_string());

        let (attribute, literal) = filter.split_once('=').ok_or_else(invalid)?;
        if !attribute.trim().eq_ignore_ascii_case(PATH_ATTRIBUTE) {
            return Err(invalid());
        }

        let literal = literal.trim();
        let inner = literal
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .filter(|_| literal.len() >= 2)
            .ok_or_else(invalid)?;

        // a lone quote inside the literal ends it early
        let unquoted = inner.replace("''", "\u{0}");
        if unquoted.contains('\'') {
            return Err(invalid());
        }
        let value = unquoted.replace('\u{0}', "'");
        if value.trim().is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(value))
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = '{}'", PATH_ATTRIBUTE, self.relative.replace('\'', "''"))
    }
}

/// Where the pixels of a read come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GranuleSource {
    File(PathBuf),
    /// The built-in 1x1 image.
    Placeholder,
}

type Provider<'a> = Box<dyn FnOnce() -> Result<Option<GranuleSource>> + 'a>;

/// Ordered granule source providers; the first to yield a source wins and
/// the placeholder closes the chain.
pub struct SourceChain<'a> {
    providers: Vec<(&'static str, Provider<'a>)>,
}

impl<'a> SourceChain<'a> {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Append a provider. Errors stop the chain.
    pub fn then(
        mut self,
        name: &'static str,
        provider: impl FnOnce() -> Result<Option<GranuleSource>> + 'a,
    ) -> Self {
        self.providers.push((name, Box::new(provider)));
        self
    }

    pub fn resolve(self) -> Result<GranuleSource> {
        for (name, provider) in self.providers {
            if let Some(source) = provider()? {
                debug!(provider = name, source = ?source, "Selected granule source");
                return Ok(source);
            }
        }
        debug!("No granule source configured, using placeholder");
        Ok(GranuleSource::Placeholder)
    }
}

impl Default for SourceChain<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard chain: explicit selector, configured default, placeholder.
pub fn select_source(
    root: &Path,
    selector: Option<&PathSelector>,
    default_path: Option<&str>,
) -> Result<GranuleSource> {
    SourceChain::new()
        .then("path filter", || {
            selector
                .map(|s| resolve_within(root, s.relative()).map(GranuleSource::File))
                .transpose()
        })
        .then("default path", || {
            default_path
                .map(|p| resolve_within(root, p).map(GranuleSource::File))
                .transpose()
        })
        .resolve()
}

/// Join `relative` onto `root`, refusing anything that leaves `root`.
///
/// `..` components are resolved lexically and absolute paths are rejected.
/// When the target exists its canonical form must also stay inside the
/// canonical root, which catches symbolic links pointing outside.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let rejected = || CoverageError::traversal(relative, root);

    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.as_path() == root || !resolved.pop() {
                    return Err(rejected());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(rejected()),
        }
    }

    if let (Ok(target), Ok(base)) = (resolved.canonicalize(), root.canonicalize()) {
        if !target.starts_with(&base) {
            return Err(rejected());
        }
    }
    Ok(resolved)
}
