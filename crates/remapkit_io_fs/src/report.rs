//! Run report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::spec::{CopyAction, EnumCopyActionKind};

/// Aggregate counters, diagnostics and ordered outcomes for one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReportCopy {
    /// Total visited source entries.
    pub cnt_scanned: u64,
    /// Files copied under their mapped name.
    pub cnt_copied: u64,
    /// Files copied under a suffixed name after a conflict.
    pub cnt_renamed: u64,
    /// Entries skipped by ignore rules, filters or the mapping policy.
    pub cnt_skipped: u64,
    /// Entries whose planning or copy failed.
    pub cnt_failed: u64,
    /// `true` when nothing was written.
    pub if_dry_run: bool,
    /// Non-fatal warnings collected during planning/copy.
    pub warnings: Vec<String>,
    /// Final action per entry, in plan order.
    pub actions: Vec<CopyAction>,
}

impl ReportCopy {
    /// Number of failed actions.
    pub fn error_count(&self) -> usize {
        self.cnt_failed as usize
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_renamed".to_string(), self.cnt_renamed);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_failed".to_string(), self.cnt_failed);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        let c_mode = if self.if_dry_run { " dry_run=true" } else { "" };
        format!(
            "{prefix} scanned={} copied={} renamed={} skipped={} failed={} warnings={}{c_mode}",
            dict_counts["cnt_scanned"],
            dict_counts["cnt_copied"],
            dict_counts["cnt_renamed"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_failed"],
            dict_counts["cnt_warnings"]
        )
    }

    /// Failed actions in plan order.
    pub fn failures(&self) -> impl Iterator<Item = &CopyAction> {
        self.actions
            .iter()
            .filter(|a| a.kind == EnumCopyActionKind::Fail)
    }

    /// Full report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[REMAP]"))
    }
}

/// Mutable accumulator filled while a plan executes.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    report: ReportCopy,
}

impl ReportCopyBuilder {
    pub fn new(if_dry_run: bool) -> Self {
        Self {
            report: ReportCopy {
                if_dry_run,
                ..ReportCopy::default()
            },
        }
    }

    /// Add `n` visited entries.
    pub fn add_scanned(&mut self, n: u64) {
        self.report.cnt_scanned += n;
    }

    /// Record one final action and bump its counter.
    pub fn add_action(&mut self, action: CopyAction) {
        match action.kind {
            EnumCopyActionKind::Copy => self.report.cnt_copied += 1,
            EnumCopyActionKind::Rename => self.report.cnt_renamed += 1,
            EnumCopyActionKind::Skip => self.report.cnt_skipped += 1,
            EnumCopyActionKind::Fail => self.report.cnt_failed += 1,
        }
        self.report.actions.push(action);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.report.warnings.push(warning);
    }

    pub fn extend_warnings<I>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.report.warnings.extend(warnings);
    }

    /// Finalize builder into immutable report.
    pub fn finalize(self) -> ReportCopy {
        self.report
    }
}
