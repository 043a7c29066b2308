//! Plan execution and the `copy_tree` entry point.

use std::fs;
use std::path::Path;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::plan::plan_tree;
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::spec::{CopyAction, CopyTreeError, SpecCopyOptions};
use crate::util::{calculate_worker_limit, copy_file_atomic, validate_destination_path_safety};

/// Remap and copy a directory tree from `dir_source` to `dir_destination`.
///
/// This function performs:
/// 1. Option validation, ignore loading, filter compilation and mapping
///    resolution. Any failure here returns [`CopyTreeError`] before any write.
/// 2. Planning: a deterministic depth-first walk producing one
///    [`CopyAction`] per relevant entry, conflicts already resolved.
/// 3. Execution (skipped in dry-run): serial or rayon thread pool, each file
///    written atomically.
/// 4. Report aggregation in plan order.
///
/// Per-entry problems never abort the run; they show up as `FAIL` actions.
pub fn copy_tree<P, Q>(
    dir_source: P,
    dir_destination: Q,
    spec_cp_options: SpecCopyOptions,
) -> Result<ReportCopy, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_dir_dst = dir_destination.as_ref().to_path_buf();
    let mut walker = plan_tree(dir_source, &path_dir_dst, &spec_cp_options)?;

    if let Ok(meta_dir_dst) = fs::symlink_metadata(&path_dir_dst)
        && meta_dir_dst.file_type().is_symlink()
    {
        return Err(CopyTreeError::DestinationInitFailed {
            path: path_dir_dst,
            message: "Destination root path must not be a symbolic link.".to_string(),
        });
    }
    if !spec_cp_options.if_dry_run {
        fs::create_dir_all(&path_dir_dst).map_err(|e| CopyTreeError::DestinationInitFailed {
            path: path_dir_dst.clone(),
            message: e.to_string(),
        })?;
    }

    let l_actions: Vec<CopyAction> = walker.by_ref().collect();
    let mut builder_cp_report = ReportCopyBuilder::new(spec_cp_options.if_dry_run);
    builder_cp_report.add_scanned(walker.cnt_scanned());
    builder_cp_report.extend_warnings(walker.take_warnings());

    _execute_into(
        l_actions,
        &path_dir_dst,
        spec_cp_options.if_dry_run,
        calculate_worker_limit(spec_cp_options.num_workers_max),
        &mut builder_cp_report,
    );

    let report = builder_cp_report.finalize();
    info!(summary = %report, "copy finished");
    Ok(report)
}

/// Execute an already built plan into `dir_destination`.
///
/// `SKIP`/`FAIL` actions are recorded unchanged. In dry-run mode nothing is
/// written and transfers are recorded as planned. The report holds no scan
/// count; callers that walked the tree add it themselves.
pub fn execute_plan<I>(
    l_actions: I,
    dir_destination: &Path,
    if_dry_run: bool,
    num_workers_max: Option<usize>,
) -> ReportCopy
where
    I: IntoIterator<Item = CopyAction>,
{
    let mut builder_cp_report = ReportCopyBuilder::new(if_dry_run);
    _execute_into(
        l_actions.into_iter().collect(),
        dir_destination,
        if_dry_run,
        calculate_worker_limit(num_workers_max),
        &mut builder_cp_report,
    );
    builder_cp_report.finalize()
}

fn _execute_into(
    l_actions: Vec<CopyAction>,
    path_dir_dst: &Path,
    if_dry_run: bool,
    n_workers_max: usize,
    builder_cp_report: &mut ReportCopyBuilder,
) {
    let apply_results = |l_results: Vec<CopyAction>, builder_cp_report: &mut ReportCopyBuilder| {
        for action in l_results {
            builder_cp_report.add_action(action);
        }
    };

    if if_dry_run {
        debug!(n_actions = l_actions.len(), "dry run, nothing written");
        apply_results(l_actions, builder_cp_report);
        return;
    }

    let run_serial = |l_actions: Vec<CopyAction>| {
        l_actions
            .into_iter()
            .map(|action| execute_action(action, path_dir_dst))
            .collect::<Vec<_>>()
    };

    if n_workers_max <= 1 {
        apply_results(run_serial(l_actions), builder_cp_report);
        return;
    }

    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers_max).build();
    let Ok(thread_pool) = thread_pool else {
        let message = format!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial copy."
        );
        warn!(%message);
        builder_cp_report.add_warning(message);
        apply_results(run_serial(l_actions), builder_cp_report);
        return;
    };

    // indexed parallel collect keeps plan order
    let l_results = thread_pool.install(|| {
        l_actions
            .into_par_iter()
            .map(|action| execute_action(action, path_dir_dst))
            .collect::<Vec<_>>()
    });
    apply_results(l_results, builder_cp_report);
}

fn execute_action(action: CopyAction, path_dir_dst: &Path) -> CopyAction {
    if !action.is_transfer() {
        return action;
    }
    let Some(path_file_dst) = action.path_dst.clone() else {
        return action;
    };

    let res_copy = validate_destination_path_safety(&path_file_dst, path_dir_dst).and_then(|_| {
        if let Some(path_dir_parent) = path_file_dst.parent() {
            fs::create_dir_all(path_dir_parent).map_err(|e| {
                format!(
                    "Failed to create directory {} ({e})",
                    path_dir_parent.display()
                )
            })?;
        }
        copy_file_atomic(&action.path_src, &path_file_dst).map_err(|e| e.to_string())
    });

    match res_copy {
        Ok(()) => {
            debug!(%action, "copied");
            action
        }
        Err(message) => {
            warn!(
                source = %action.path_src.display(),
                destination = %path_file_dst.display(),
                %message,
                "copy failed"
            );
            action.into_failure(message)
        }
    }
}
