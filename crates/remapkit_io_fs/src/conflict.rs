//! Destination collision handling via numeric suffixes.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::conf::N_SUFFIX_CONFLICT_MAX;

/// No free `name_<n>.ext` variant within the suffix bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No free destination name for {} within {n_suffix_max} numeric suffixes", .path.display())]
pub struct ConflictExhaustion {
    /// Original candidate path.
    pub path: PathBuf,
    /// Highest suffix tried.
    pub n_suffix_max: usize,
}

/// `name.ext` -> `name_<n>.ext`; `name` -> `name_<n>`.
pub fn derive_suffixed_path(path: &Path, n_suffix: usize) -> PathBuf {
    let mut name_file = OsString::new();
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            name_file.push(stem);
            name_file.push(format!("_{n_suffix}."));
            name_file.push(ext);
        }
        (Some(stem), None) => {
            name_file.push(stem);
            name_file.push(format!("_{n_suffix}"));
        }
        (None, _) => name_file.push(format!("_{n_suffix}")),
    }
    path.with_file_name(name_file)
}

/// Rebuild `path_candidate` component by component.
///
/// Directory components blocked by a file are suffixed first; the leaf is
/// suffixed last if it is still taken.
fn _resolve_with<D, L>(
    path_candidate: &Path,
    n_suffix_max: usize,
    is_dir_blocked: D,
    is_leaf_taken: L,
) -> Result<PathBuf, ConflictExhaustion>
where
    D: Fn(&Path) -> bool,
    L: Fn(&Path) -> bool,
{
    let err_exhausted = || ConflictExhaustion {
        path: path_candidate.to_path_buf(),
        n_suffix_max,
    };
    let l_parts: Vec<&OsStr> = path_candidate.iter().collect();
    let Some((name_leaf, l_dirs)) = l_parts.split_last() else {
        return Ok(path_candidate.to_path_buf());
    };

    let mut path_out = PathBuf::new();
    for name_dir in l_dirs {
        let path_dir = path_out.join(name_dir);
        path_out = if is_dir_blocked(&path_dir) {
            (1..=n_suffix_max)
                .map(|n| derive_suffixed_path(&path_dir, n))
                .find(|v| !is_dir_blocked(v))
                .ok_or_else(err_exhausted)?
        } else {
            path_dir
        };
    }

    let path_leaf = path_out.join(name_leaf);
    if !is_leaf_taken(&path_leaf) {
        return Ok(path_leaf);
    }
    (1..=n_suffix_max)
        .map(|n| derive_suffixed_path(&path_leaf, n))
        .find(|v| !is_leaf_taken(v))
        .ok_or_else(err_exhausted)
}

/// Resolve against an explicit set of claimed file paths and register the result.
///
/// A candidate is also taken when a claimed file lies below it, and its
/// directories are rerouted when one of them is a claimed file.
pub fn resolve_conflict(
    path_candidate: &Path,
    set_claimed: &mut HashSet<PathBuf>,
) -> Result<PathBuf, ConflictExhaustion> {
    let path_final = _resolve_with(
        path_candidate,
        N_SUFFIX_CONFLICT_MAX,
        |v| set_claimed.contains(v),
        |v| set_claimed.contains(v) || set_claimed.iter().any(|c| c.starts_with(v)),
    )?;
    set_claimed.insert(path_final.clone());
    Ok(path_final)
}

/// Claimed-path state of one run.
///
/// Paths are relative to the target root. Claiming a file also claims its
/// parent directories, so a file and a directory never share a name. With a
/// probe root, entries already present on disk count as claimed, so
/// re-running into a populated target renames instead of overwriting.
#[derive(Debug, Clone)]
pub struct ResolverConflict {
    set_claimed_files: HashSet<PathBuf>,
    set_claimed_dirs: HashSet<PathBuf>,
    path_dir_probe: Option<PathBuf>,
    n_suffix_max: usize,
}

impl ResolverConflict {
    pub fn new(n_suffix_max: usize) -> Self {
        Self {
            set_claimed_files: HashSet::new(),
            set_claimed_dirs: HashSet::new(),
            path_dir_probe: None,
            n_suffix_max,
        }
    }

    /// Treat existing entries under `path_dir_dst` as claimed.
    pub fn with_probe_root(mut self, path_dir_dst: PathBuf) -> Self {
        self.path_dir_probe = Some(path_dir_dst);
        self
    }

    /// `true` when a file cannot be placed at `path_rel`.
    pub fn is_claimed(&self, path_rel: &Path) -> bool {
        if self.set_claimed_files.contains(path_rel) || self.set_claimed_dirs.contains(path_rel) {
            return true;
        }
        self.path_dir_probe
            .as_ref()
            .is_some_and(|root| fs::symlink_metadata(root.join(path_rel)).is_ok())
    }

    /// `true` when `path_rel` cannot serve as a directory.
    fn is_dir_blocked(&self, path_rel: &Path) -> bool {
        if self.set_claimed_files.contains(path_rel) {
            return true;
        }
        if self.set_claimed_dirs.contains(path_rel) {
            return false;
        }
        let Some(root) = &self.path_dir_probe else {
            return false;
        };
        match fs::symlink_metadata(root.join(path_rel)) {
            Ok(meta) => !meta.is_dir(),
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        }
    }

    /// Return `path_candidate` or its first unclaimed variant, and claim it.
    pub fn resolve(&mut self, path_candidate: &Path) -> Result<PathBuf, ConflictExhaustion> {
        let path_final = _resolve_with(
            path_candidate,
            self.n_suffix_max,
            |v| self.is_dir_blocked(v),
            |v| self.is_claimed(v),
        )?;
        self.set_claimed_dirs.extend(
            path_final
                .ancestors()
                .skip(1)
                .filter(|v| !v.as_os_str().is_empty())
                .map(Path::to_path_buf),
        );
        self.set_claimed_files.insert(path_final.clone());
        Ok(path_final)
    }

    /// Number of claimed files.
    pub fn len(&self) -> usize {
        self.set_claimed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set_claimed_files.is_empty()
    }
}

impl Default for ResolverConflict {
    fn default() -> Self {
        Self::new(N_SUFFIX_CONFLICT_MAX)
    }
}
