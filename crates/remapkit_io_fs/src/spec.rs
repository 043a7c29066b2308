//! Remap specification models, plan records and top-level error types.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

use crate::conf::N_SUFFIX_CONFLICT_MAX;
use crate::mapping::SpecMappingSelection;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Pattern matching mode for ad-hoc include/exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCopyPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    #[default]
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

/// Kind of one planned (and later executed) copy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnumCopyActionKind {
    /// Copy to the mapped destination unchanged.
    Copy,
    /// Do not copy; `reason` says why.
    Skip,
    /// Copy to a conflict-renamed destination.
    Rename,
    /// Planning or copying failed; `reason` carries the error text.
    Fail,
}

impl fmt::Display for EnumCopyActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_kind = match self {
            Self::Copy => "COPY",
            Self::Skip => "SKIP",
            Self::Rename => "RENAME",
            Self::Fail => "FAIL",
        };
        f.write_str(c_kind)
    }
}

/// Filesystem entry kind, observed without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumEntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, device nodes.
    Other,
}

/// What a table mapping does with paths no rule covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumMappingUnmatchedRule {
    /// Keep the relative source path.
    #[default]
    Identity,
    /// Do not copy the entry.
    Skip,
    /// Reject the entry (strict mode, recorded as FAIL).
    Fail,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PlanRecords

/// One discovered source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Absolute (or root-joined) source path.
    pub path_abs: PathBuf,
    /// Path relative to the source root.
    pub path_rel: PathBuf,
    /// Entry kind, symlinks not followed.
    pub kind: EnumEntryKind,
    /// Size in bytes as reported by `lstat`.
    pub n_bytes: u64,
    /// Modification time, when the platform reports one.
    pub time_modified: Option<SystemTime>,
}

impl SourceEntry {
    /// Build an entry from `lstat`-style metadata.
    pub fn from_metadata(path_abs: PathBuf, path_rel: PathBuf, meta: &fs::Metadata) -> Self {
        let cfg_file_type = meta.file_type();
        let kind = if cfg_file_type.is_symlink() {
            EnumEntryKind::Symlink
        } else if cfg_file_type.is_dir() {
            EnumEntryKind::Directory
        } else if cfg_file_type.is_file() {
            EnumEntryKind::File
        } else {
            EnumEntryKind::Other
        };
        Self {
            path_abs,
            path_rel,
            kind,
            n_bytes: meta.len(),
            time_modified: meta.modified().ok(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EnumEntryKind::Directory
    }

    /// Final path component as UTF-8 (lossy).
    pub fn name(&self) -> String {
        self.path_rel
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// One planned copy decision. Execution may only turn `Copy`/`Rename` into `Fail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyAction {
    /// Source path.
    pub path_src: PathBuf,
    /// Destination path under the target root; `None` for skips.
    pub path_dst: Option<PathBuf>,
    /// Action kind.
    pub kind: EnumCopyActionKind,
    /// Skip/fail reason, or the original candidate for renames.
    pub reason: Option<String>,
}

impl CopyAction {
    pub fn copy(path_src: PathBuf, path_dst: PathBuf) -> Self {
        Self {
            path_src,
            path_dst: Some(path_dst),
            kind: EnumCopyActionKind::Copy,
            reason: None,
        }
    }

    pub fn rename(path_src: PathBuf, path_dst: PathBuf, path_candidate: &Path) -> Self {
        Self {
            path_src,
            path_dst: Some(path_dst),
            kind: EnumCopyActionKind::Rename,
            reason: Some(format!("conflict with {}", path_candidate.display())),
        }
    }

    pub fn skip(path_src: PathBuf, reason: &str) -> Self {
        Self {
            path_src,
            path_dst: None,
            kind: EnumCopyActionKind::Skip,
            reason: Some(reason.to_string()),
        }
    }

    pub fn fail(path_src: PathBuf, path_dst: Option<PathBuf>, reason: String) -> Self {
        Self {
            path_src,
            path_dst,
            kind: EnumCopyActionKind::Fail,
            reason: Some(reason),
        }
    }

    /// Convert this action into a failure, keeping its paths.
    pub fn into_failure(self, reason: String) -> Self {
        Self::fail(self.path_src, self.path_dst, reason)
    }

    /// `true` for actions that write a destination file.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self.kind,
            EnumCopyActionKind::Copy | EnumCopyActionKind::Rename
        )
    }
}

impl fmt::Display for CopyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.path_src.display())?;
        if let Some(path_dst) = &self.path_dst {
            write!(f, " -> {}", path_dst.display())?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for [`crate::copy_tree`] and [`crate::plan_tree`].
#[derive(Debug, Clone)]
pub struct SpecCopyOptions {
    /// Mapping sources; resolved by priority into one policy.
    pub spec_mapping: SpecMappingSelection,
    /// Allow-list of file suffixes (`.py`, `.md`); `None` allows all.
    pub suffixes_allowed: Option<Vec<String>>,
    /// Ignore files, loaded in order.
    pub paths_ignore_files: Vec<PathBuf>,
    /// Inline ignore lines, evaluated after the ignore files.
    pub patterns_ignore: Vec<String>,
    /// Include patterns applied to relative path and file name.
    pub patterns_include_files: Option<Vec<String>>,
    /// Exclude patterns applied to relative path and file name.
    pub patterns_exclude_files: Option<Vec<String>>,
    /// Pattern interpretation mode for include/exclude.
    pub rule_pattern: EnumCopyPatternMode,
    /// Maximum worker threads for the file-copy stage.
    pub num_workers_max: Option<usize>,
    /// Highest numeric suffix tried by the conflict resolver.
    pub num_suffix_max: usize,
    /// Do not mutate filesystem; record what would happen.
    pub if_dry_run: bool,
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        Self {
            spec_mapping: SpecMappingSelection::default(),
            suffixes_allowed: None,
            paths_ignore_files: Vec::new(),
            patterns_ignore: Vec::new(),
            patterns_include_files: None,
            patterns_exclude_files: None,
            rule_pattern: EnumCopyPatternMode::Glob,
            num_workers_max: None,
            num_suffix_max: N_SUFFIX_CONFLICT_MAX,
            if_dry_run: false,
        }
    }
}

/// "Top-level call failed" errors (configuration / setup stage).
#[derive(Debug, Error)]
pub enum CopyTreeError {
    /// Invalid include/exclude pattern.
    #[error("{0}")]
    InvalidPattern(String),
    /// Invalid mapping table, strategy name or selection.
    #[error("{0}")]
    InvalidMapping(String),
    /// Invalid numeric or combined option.
    #[error("{0}")]
    InvalidOption(String),
    /// Mapping file could not be read or decoded.
    #[error("Failed to load mapping file {}: {message}", .path.display())]
    MappingFileInvalid {
        /// Mapping file path.
        path: PathBuf,
        /// Underlying IO/decoding error text.
        message: String,
    },
    /// Ignore file could not be read.
    #[error("Failed to read ignore file {}: {message}", .path.display())]
    IgnoreFileUnreadable {
        /// Ignore file path.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
    /// Source path is not a directory.
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    /// Source equals the destination or lies inside it.
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        .path_src.display(),
        .path_dst.display()
    )]
    SourceDestinationOverlap {
        /// Normalized source directory.
        path_src: PathBuf,
        /// Normalized destination directory.
        path_dst: PathBuf,
    },
    /// Destination directory initialization failed.
    #[error("Failed to initialize destination {}: {message}", .path.display())]
    DestinationInitFailed {
        /// Destination path that failed initialization.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
