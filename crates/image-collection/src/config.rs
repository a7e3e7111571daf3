//! Collection configuration.
//!
//! Two layers:
//! - [`DirectoryConfig`]: per-directory settings persisted as
//!   `config.properties` in the collection root, created with discovered
//!   defaults when missing.
//! - [`ReaderConfig`]: process-level tuning (catalog size, check interval
//!   override, read strategy), from defaults or environment variables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use coverage_common::{BoundingBox, Crs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Georeferencing, DEFAULT_CATALOG_CAPACITY, DEFAULT_CHECK_INTERVAL_SECS};
use crate::codec::{CodecRegistry, ReadStrategy};
use crate::error::{CoverageError, Result};

/// Name of the configuration file in a collection root.
pub const CONFIG_FILE_NAME: &str = "config.properties";

/// Raster size advertised when no envelope is configured.
pub const DEFAULT_MAX_SIZE: usize = 65536;

/// Property keys.
pub mod keys {
    pub const COVERAGE_NAME: &str = "coverageName";
    pub const DEFAULT_PATH: &str = "defaultPath";
    pub const EXPAND: &str = "expand";
    pub const TIME_BETWEEN_CHECKS: &str = "timeBetweenChecks";
    pub const MAX_WIDTH: &str = "maxWidth";
    pub const MAX_HEIGHT: &str = "maxHeight";
    pub const EPSG_CODE: &str = "epsgCode";
    pub const ENVELOPE: &str = "envelope";
}

// ============================================================================
// Directory configuration
// ============================================================================

/// Settings of one collection directory. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub coverage_name: String,
    /// Granule read when a query names none, relative to the root.
    pub default_path: Option<String>,
    /// Expand palette rasters to RGB.
    pub expand: bool,
    /// Seconds a catalog entry is trusted without checking its file.
    pub time_between_checks: u64,
    pub max_width: usize,
    pub max_height: usize,
    pub epsg_code: Option<u32>,
    pub envelope: Option<BoundingBox>,
}

impl DirectoryConfig {
    pub fn builder(coverage_name: impl Into<String>) -> DirectoryConfigBuilder {
        DirectoryConfigBuilder::new(coverage_name)
    }

    /// Load `config.properties` from `root`, creating it when absent.
    ///
    /// A missing file is replaced by discovered defaults and written back;
    /// failing to write it only logs a warning. Malformed properties keep
    /// their defaults.
    pub fn load_or_create(root: &Path, codecs: &CodecRegistry) -> Result<Self> {
        if !root.is_dir() {
            return Err(CoverageError::source_input(root, "not a directory"));
        }

        let name = directory_name(root);
        let path = config_path(root);

        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "Loading collection configuration");
                Ok(Self::parse(&text, name, &path))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::discover(root, name, codecs);
                match fs::write(&path, config.to_properties()) {
                    Ok(()) => info!(
                        path = %path.display(),
                        coverage = %config.coverage_name,
                        default_path = ?config.default_path,
                        "Created collection configuration"
                    ),
                    Err(e) => warn!(
                        path = %path.display(),
                        error = %e,
                        "Could not write collection configuration, using discovered defaults"
                    ),
                }
                Ok(config)
            }
            Err(e) => {
                let err = CoverageError::config(&path, e.to_string());
                warn!(error = %err, "Using discovered defaults");
                Ok(Self::discover(root, name, codecs))
            }
        }
    }

    /// Parse properties text.
    ///
    /// `default_name` is used when `coverageName` is missing; `source` only
    /// appears in log lines.
    pub fn parse(text: &str, default_name: impl Into<String>, source: &Path) -> Self {
        let mut builder = DirectoryConfigBuilder::new(default_name);
        for (key, value) in parse_properties(text) {
            builder = builder.property(&key, &value, source);
        }
        builder.build()
    }

    /// Defaults for `root`: directory name plus the first raster any codec
    /// supports, in file name order.
    pub fn discover(root: &Path, coverage_name: impl Into<String>, codecs: &CodecRegistry) -> Self {
        let mut builder = DirectoryConfigBuilder::new(coverage_name);
        if let Some(path) = first_raster(root, codecs) {
            builder = builder.default_path(path);
        }
        builder.build()
    }

    /// Serialize as `config.properties` text.
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        let mut line = |key: &str, value: &str| {
            out.push_str(key);
            out.push('=');
            out.push_str(&escape(value));
            out.push('\n');
        };

        line(keys::COVERAGE_NAME, &self.coverage_name);
        if let Some(path) = &self.default_path {
            line(keys::DEFAULT_PATH, path);
        }
        line(keys::EXPAND, &self.expand.to_string());
        if self.time_between_checks != DEFAULT_CHECK_INTERVAL_SECS as u64 {
            line(keys::TIME_BETWEEN_CHECKS, &self.time_between_checks.to_string());
        }
        if self.max_width != DEFAULT_MAX_SIZE {
            line(keys::MAX_WIDTH, &self.max_width.to_string());
        }
        if self.max_height != DEFAULT_MAX_SIZE {
            line(keys::MAX_HEIGHT, &self.max_height.to_string());
        }
        if let Some(code) = self.epsg_code {
            line(keys::EPSG_CODE, &code.to_string());
        }
        if let Some(envelope) = &self.envelope {
            line(keys::ENVELOPE, &envelope.to_envelope_string());
        }
        out
    }

    /// CRS of the collection: `epsgCode`, else raster space.
    pub fn crs(&self) -> Crs {
        self.epsg_code.map(Crs::epsg).unwrap_or_default()
    }

    pub fn georeferencing(&self) -> Georeferencing {
        Georeferencing {
            envelope: self.envelope,
            crs: self.crs(),
        }
    }

    pub fn check_interval(&self) -> Duration {
        seconds(self.time_between_checks)
    }

    /// Envelope advertised for the whole collection.
    pub fn advertised_envelope(&self) -> BoundingBox {
        self.envelope.unwrap_or_else(|| {
            BoundingBox::new(0.0, 0.0, self.max_width as f64, self.max_height as f64)
        })
    }
}

/// Builds a [`DirectoryConfig`]; every unset field keeps its default.
#[derive(Debug, Clone)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl DirectoryConfigBuilder {
    pub fn new(coverage_name: impl Into<String>) -> Self {
        Self {
            config: DirectoryConfig {
                coverage_name: coverage_name.into(),
                default_path: None,
                expand: false,
                time_between_checks: DEFAULT_CHECK_INTERVAL_SECS as u64,
                max_width: DEFAULT_MAX_SIZE,
                max_height: DEFAULT_MAX_SIZE,
                epsg_code: None,
                envelope: None,
            },
        }
    }

    pub fn coverage_name(mut self, name: impl Into<String>) -> Self {
        self.config.coverage_name = name.into();
        self
    }

    pub fn default_path(mut self, path: impl Into<String>) -> Self {
        self.config.default_path = Some(path.into());
        self
    }

    pub fn expand(mut self, expand: bool) -> Self {
        self.config.expand = expand;
        self
    }

    pub fn time_between_checks(mut self, seconds: u64) -> Self {
        self.config.time_between_checks = seconds;
        self
    }

    pub fn max_size(mut self, width: usize, height: usize) -> Self {
        self.config.max_width = width;
        self.config.max_height = height;
        self
    }

    pub fn epsg_code(mut self, code: u32) -> Self {
        self.config.epsg_code = Some(code);
        self
    }

    pub fn envelope(mut self, envelope: BoundingBox) -> Self {
        self.config.envelope = Some(envelope);
        self
    }

    /// Apply one `key=value` property.
    ///
    /// Malformed values and unknown keys are logged and leave the builder
    /// unchanged.
    pub fn property(self, key: &str, value: &str, source: &Path) -> Self {
        match self.try_property(key, value) {
            Ok(builder) => builder,
            Err((builder, reason)) => {
                let err = CoverageError::config(source, format!("{}={}: {}", key, value, reason));
                warn!(key, value, error = %err, "Ignoring configuration property");
                builder
            }
        }
    }

    fn try_property(self, key: &str, value: &str) -> std::result::Result<Self, (Self, String)> {
        let value = value.trim();
        match key {
            keys::COVERAGE_NAME if !value.is_empty() => Ok(self.coverage_name(value)),
            keys::DEFAULT_PATH if !value.is_empty() => Ok(self.default_path(value)),
            keys::COVERAGE_NAME | keys::DEFAULT_PATH => Err((self, "empty value".to_string())),
            keys::EXPAND => match parse_bool(value) {
                Some(expand) => Ok(self.expand(expand)),
                None => Err((self, "expected true or false".to_string())),
            },
            keys::TIME_BETWEEN_CHECKS => match value.parse() {
                Ok(seconds) => Ok(self.time_between_checks(seconds)),
                Err(e) => Err((self, format!("{}", e))),
            },
            keys::MAX_WIDTH | keys::MAX_HEIGHT => match value.parse::<usize>() {
                Ok(0) => Err((self, "must be > 0".to_string())),
                Ok(size) => {
                    let mut builder = self;
                    if key == keys::MAX_WIDTH {
                        builder.config.max_width = size;
                    } else {
                        builder.config.max_height = size;
                    }
                    Ok(builder)
                }
                Err(e) => Err((self, format!("{}", e))),
            },
            keys::EPSG_CODE => match Crs::parse(value) {
                Ok(crs) => Ok(self.epsg_code(crs.epsg)),
                Err(e) => Err((self, e.to_string())),
            },
            keys::ENVELOPE => match BoundingBox::from_envelope_string(value) {
                Ok(envelope) => Ok(self.envelope(envelope)),
                Err(e) => Err((self, e.to_string())),
            },
            _ => Err((self, "unknown key".to_string())),
        }
    }

    pub fn build(self) -> DirectoryConfig {
        self.config
    }
}

/// Seconds as a duration, saturating at the largest representable one.
fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn directory_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(root)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "coverage".to_string())
}

/// First file under `root` (sorted walk) that a codec supports, as a
/// `/`-separated path relative to `root`.
fn first_raster(root: &Path, codecs: &CodecRegistry) -> Option<String> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() != CONFIG_FILE_NAME)
        .find(|entry| codecs.supports(entry.path()))
        .and_then(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
}

/// Parse `key=value` / `key: value` lines, skipping blanks and `#` / `!`
/// comments. Backslash escapes a single character; a trailing backslash
/// continues the line.
fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        let continued = line.ends_with('\\') && !line.ends_with("\\\\");
        pending.push_str(if continued { &line[..line.len() - 1] } else { line });
        if continued {
            continue;
        }

        let logical = std::mem::take(&mut pending);
        let (key, value) = split_property(&logical);
        if !key.is_empty() {
            props.insert(key, value);
        }
    }
    props
}

fn split_property(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars();
    let mut escaped = false;

    for c in chars.by_ref() {
        if escaped {
            key.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            break;
        } else {
            key.push(c);
        }
    }

    let rest: String = chars.collect();
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    (key, unescape(rest.trim()))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | ':' | '=' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Reader configuration
// ============================================================================

/// Process-level reader tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Maximum number of granules kept in the catalog.
    pub catalog_capacity: usize,

    /// Overrides the directory's `timeBetweenChecks` when set.
    pub check_interval_secs: Option<u64>,

    /// Read strategy used when a query does not ask for one.
    pub read_strategy: ReadStrategy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            catalog_capacity: DEFAULT_CATALOG_CAPACITY,
            check_interval_secs: None,
            read_strategy: ReadStrategy::WholeImageRead,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("IMAGE_COLLECTION_CACHE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.catalog_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("IMAGE_COLLECTION_CHECK_INTERVAL_SECS") {
            if let Ok(seconds) = val.parse() {
                config.check_interval_secs = Some(seconds);
            }
        }

        if let Ok(val) = std::env::var("IMAGE_COLLECTION_DIRECT_READ") {
            config.read_strategy =
                ReadStrategy::from_direct_read(val.to_lowercase() == "true" || val == "1");
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.catalog_capacity == 0 {
            return Err("catalog_capacity must be > 0".to_string());
        }
        Ok(())
    }

    /// Check interval for a directory, the override winning.
    pub fn check_interval(&self, directory: &DirectoryConfig) -> Duration {
        match self.check_interval_secs {
            Some(secs) => seconds(secs),
            None => directory.check_interval(),
        }
    }
}

/// Root-relative location of the configuration file.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}
