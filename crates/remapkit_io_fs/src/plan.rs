//! Source tree traversal producing the copy plan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::conf::{
    C_NAME_IGNORE_FILE, C_REASON_EXCLUDED, C_REASON_IGNORED, C_REASON_UNMAPPED,
    C_REASON_UNSUPPORTED_ENTRY, load_ignore_files,
};
use crate::conflict::ResolverConflict;
use crate::mapping::MappingPolicy;
use crate::pattern::{IgnoreSpec, SpecCopyPatterns};
use crate::spec::{CopyAction, CopyTreeError, EnumEntryKind, SourceEntry, SpecCopyOptions};
use crate::util::{
    has_allowed_suffix, is_within, normalize_path, normalize_relative_path, normalize_suffix,
    to_slash_path,
};

/// Everything the walker needs besides the two roots.
#[derive(Debug, Clone)]
pub struct SpecPlanInputs {
    /// Resolved mapping policy.
    pub policy: Arc<dyn MappingPolicy>,
    /// Ignore rules in evaluation order.
    pub spec_ignore: IgnoreSpec,
    /// Ad-hoc include/exclude filters.
    pub spec_filters: SpecCopyPatterns,
    /// Suffix allow-list, normalized to start with `.`.
    pub suffixes_allowed: Option<Vec<String>>,
    /// Conflict resolver bound.
    pub n_suffix_max: usize,
}

/// Lazy depth-first plan over a source tree.
///
/// Siblings are visited in byte order of their names, ignored directories are
/// pruned, and conflicts are resolved in visit order, so the same tree state
/// always yields the same sequence of [`CopyAction`]s.
#[derive(Debug)]
pub struct PlanWalker {
    path_dir_src: PathBuf,
    path_dir_dst: PathBuf,
    path_dir_prune: Option<PathBuf>,
    spec_plan: SpecPlanInputs,
    resolver: ResolverConflict,
    l_stack: Vec<SourceEntry>,
    l_warnings: Vec<String>,
    cnt_scanned: u64,
    if_started: bool,
}

impl PlanWalker {
    /// Walker over `path_dir_src`; destinations are joined onto `path_dir_dst`.
    ///
    /// Existing entries under `path_dir_dst` count as claimed by the resolver.
    pub fn new(path_dir_src: PathBuf, path_dir_dst: PathBuf, spec_plan: SpecPlanInputs) -> Self {
        let resolver = ResolverConflict::new(spec_plan.n_suffix_max)
            .with_probe_root(path_dir_dst.clone());
        let path_dir_src_norm = normalize_path(&path_dir_src);
        let path_dir_dst_norm = normalize_path(&path_dir_dst);
        let path_dir_prune = (path_dir_dst_norm != path_dir_src_norm
            && path_dir_dst_norm.starts_with(&path_dir_src_norm))
        .then_some(path_dir_dst_norm);
        Self {
            path_dir_src,
            path_dir_dst,
            path_dir_prune,
            spec_plan,
            resolver,
            l_stack: Vec::new(),
            l_warnings: Vec::new(),
            cnt_scanned: 0,
            if_started: false,
        }
    }

    /// Number of entries visited so far.
    pub fn cnt_scanned(&self) -> u64 {
        self.cnt_scanned
    }

    pub fn warnings(&self) -> &[String] {
        &self.l_warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.l_warnings)
    }

    pub fn policy(&self) -> &dyn MappingPolicy {
        self.spec_plan.policy.as_ref()
    }

    fn push_children(&mut self, path_dir_abs: &Path, path_dir_rel: &Path) {
        let iter_entries = match fs::read_dir(path_dir_abs) {
            Ok(iter) => iter,
            Err(e) => {
                self.add_warning(format!(
                    "Failed to read directory {} ({e})",
                    path_dir_abs.display()
                ));
                return;
            }
        };

        let mut l_entries = Vec::new();
        for _entry_res in iter_entries {
            let entry = match _entry_res {
                Ok(v) => v,
                Err(e) => {
                    self.add_warning(format!(
                        "Failed to read directory entry under {} ({e})",
                        path_dir_abs.display()
                    ));
                    continue;
                }
            };
            let path_entry = entry.path();
            // DirEntry::metadata does not follow symlinks
            let meta_entry = match entry.metadata() {
                Ok(v) => v,
                Err(e) => {
                    self.add_warning(format!("Failed to inspect {} ({e})", path_entry.display()));
                    continue;
                }
            };
            let path_rel = path_dir_rel.join(entry.file_name());
            l_entries.push(SourceEntry::from_metadata(path_entry, path_rel, &meta_entry));
        }

        l_entries.sort_by(|a, b| a.path_rel.file_name().cmp(&b.path_rel.file_name()));
        self.l_stack.extend(l_entries.into_iter().rev());
    }

    fn add_warning(&mut self, message: String) {
        warn!(%message, "planning warning");
        self.l_warnings.push(message);
    }

    fn plan_directory(&mut self, spec_entry: SourceEntry) -> Option<CopyAction> {
        if let Some(path_dir_prune) = &self.path_dir_prune
            && normalize_path(&spec_entry.path_abs) == *path_dir_prune
        {
            debug!(path = %spec_entry.path_abs.display(), "pruning target root inside source");
            return None;
        }
        let c_path_rel = to_slash_path(&spec_entry.path_rel);
        if self.spec_plan.spec_ignore.is_entry_ignored(&c_path_rel, true) {
            return Some(CopyAction::skip(spec_entry.path_abs, C_REASON_IGNORED));
        }
        self.push_children(&spec_entry.path_abs, &spec_entry.path_rel);
        None
    }

    fn plan_file(&mut self, spec_entry: SourceEntry) -> Option<CopyAction> {
        let name_file = spec_entry.name();
        if let Some(suffixes_allowed) = &self.spec_plan.suffixes_allowed
            && !has_allowed_suffix(&name_file, suffixes_allowed)
        {
            return None;
        }

        let c_path_rel = to_slash_path(&spec_entry.path_rel);
        if self.spec_plan.spec_ignore.is_entry_ignored(&c_path_rel, false) {
            return Some(CopyAction::skip(spec_entry.path_abs, C_REASON_IGNORED));
        }
        if spec_entry.kind != EnumEntryKind::File {
            return Some(CopyAction::skip(
                spec_entry.path_abs,
                C_REASON_UNSUPPORTED_ENTRY,
            ));
        }
        if self.spec_plan.spec_filters.should_exclude(&c_path_rel, &name_file) {
            return Some(CopyAction::skip(spec_entry.path_abs, C_REASON_EXCLUDED));
        }

        let path_dst_rel = match self.spec_plan.policy.map(&spec_entry.path_rel) {
            Ok(Some(v)) => v,
            Ok(None) => return Some(CopyAction::skip(spec_entry.path_abs, C_REASON_UNMAPPED)),
            Err(reason) => return Some(CopyAction::fail(spec_entry.path_abs, None, reason)),
        };
        let Some(path_dst_rel) =
            normalize_relative_path(&path_dst_rel).filter(|v| !v.as_os_str().is_empty())
        else {
            return Some(CopyAction::fail(
                spec_entry.path_abs,
                None,
                format!(
                    "Mapped destination escapes target root: {}",
                    path_dst_rel.display()
                ),
            ));
        };

        match self.resolver.resolve(&path_dst_rel) {
            Ok(path_final) if path_final == path_dst_rel => Some(CopyAction::copy(
                spec_entry.path_abs,
                self.path_dir_dst.join(path_final),
            )),
            Ok(path_final) => Some(CopyAction::rename(
                spec_entry.path_abs,
                self.path_dir_dst.join(path_final),
                &path_dst_rel,
            )),
            Err(e) => Some(CopyAction::fail(
                spec_entry.path_abs,
                Some(self.path_dir_dst.join(&path_dst_rel)),
                e.to_string(),
            )),
        }
    }
}

impl Iterator for PlanWalker {
    type Item = CopyAction;

    fn next(&mut self) -> Option<CopyAction> {
        if !self.if_started {
            self.if_started = true;
            let path_dir_src = self.path_dir_src.clone();
            self.push_children(&path_dir_src, Path::new(""));
        }

        while let Some(spec_entry) = self.l_stack.pop() {
            self.cnt_scanned += 1;
            let action = if spec_entry.is_dir() {
                self.plan_directory(spec_entry)
            } else {
                self.plan_file(spec_entry)
            };
            if let Some(action) = action {
                debug!(%action, "planned");
                return Some(action);
            }
        }
        None
    }
}

/// Validate options and build a lazy plan for `dir_source` -> `dir_destination`.
///
/// Performs no write. Loads ignore files (the source root `.gitignore` is not
/// implied here; callers list every file in `paths_ignore_files`), compiles
/// filters and resolves the mapping policy. Malformed ignore lines become
/// walker warnings.
pub fn plan_tree<P, Q>(
    dir_source: P,
    dir_destination: Q,
    spec_cp_options: &SpecCopyOptions,
) -> Result<PlanWalker, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_dir_src = dir_source.as_ref().to_path_buf();
    let path_dir_dst = dir_destination.as_ref().to_path_buf();

    if !path_dir_src.is_dir() {
        return Err(CopyTreeError::SourceNotDirectory(path_dir_src));
    }
    if is_within(&path_dir_src, &path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            path_src: normalize_path(&path_dir_src),
            path_dst: normalize_path(&path_dir_dst),
        });
    }
    if spec_cp_options.num_suffix_max == 0 {
        return Err(CopyTreeError::InvalidOption(
            "`num_suffix_max` must be >= 1.".to_string(),
        ));
    }

    let (spec_ignore, l_warnings) = load_ignore_files(
        &spec_cp_options.paths_ignore_files,
        &spec_cp_options.patterns_ignore,
    )?;

    let spec_filters = SpecCopyPatterns::from_raw(
        spec_cp_options.patterns_include_files.as_deref(),
        spec_cp_options.patterns_exclude_files.as_deref(),
        spec_cp_options.rule_pattern,
    )?;
    let suffixes_allowed = spec_cp_options
        .suffixes_allowed
        .as_ref()
        .map(|v| v.iter().map(|s| normalize_suffix(s)).collect::<Vec<_>>());

    let policy = spec_cp_options.spec_mapping.resolve_policy();
    info!(
        source = %path_dir_src.display(),
        destination = %path_dir_dst.display(),
        policy = policy.name(),
        n_ignore_rules = spec_ignore.len(),
        if_dry_run = spec_cp_options.if_dry_run,
        "planning copy"
    );

    let mut walker = PlanWalker::new(
        path_dir_src,
        path_dir_dst,
        SpecPlanInputs {
            policy,
            spec_ignore,
            spec_filters,
            suffixes_allowed,
            n_suffix_max: spec_cp_options.num_suffix_max,
        },
    );
    walker.l_warnings = l_warnings;
    Ok(walker)
}

/// Ignore file path for a source root, if one exists there.
pub fn find_default_ignore_file(dir_source: &Path) -> Option<PathBuf> {
    let path_ignore_file = dir_source.join(C_NAME_IGNORE_FILE);
    path_ignore_file.is_file().then_some(path_ignore_file)
}
