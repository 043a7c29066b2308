//! `remapkit_io_fs` v1:
//! Rust-side file-tree remapping and copy engine.
//!
//! Modules:
//! - `conf`     : constants and mapping/ignore loaders
//! - `spec`     : enums/options/actions/errors
//! - `pattern`  : gitignore-style matching and include/exclude filters
//! - `mapping`  : mapping policies and the named strategy registry
//! - `conflict` : numeric-suffix conflict resolution
//! - `plan`     : deterministic tree walk producing the copy plan
//! - `copy`     : plan execution and `copy_tree`
//! - `report`   : run-time report model
//! - `util`     : shared helper functions

pub mod conf;
pub mod conflict;
pub mod copy;
pub mod mapping;
pub mod pattern;
pub mod plan;
pub mod report;
pub mod spec;
mod util;

pub use conf::{load_ignore_files, load_mapping_file, parse_simple_mapping};
pub use conflict::{ConflictExhaustion, ResolverConflict, derive_suffixed_path, resolve_conflict};
pub use copy::{copy_tree, execute_plan};
pub use mapping::{
    MappingByExtension, MappingCollectMarkdownFigures, MappingExplicitTable, MappingFlatten,
    MappingFn, MappingIdentity, MappingPolicy, MappingSelective, MappingSimplePrefix,
    RegistryMappingStrategy, SpecMappingSelection,
};
pub use pattern::{IgnoreSpec, SpecCopyPatterns, SpecIgnoreRule, is_ignored, matches};
pub use plan::{PlanWalker, find_default_ignore_file, plan_tree};
pub use report::{ReportCopy, ReportCopyBuilder};
pub use spec::{
    CopyAction, CopyTreeError, EnumCopyActionKind, EnumCopyPatternMode, EnumEntryKind,
    EnumMappingUnmatchedRule, SourceEntry, SpecCopyOptions,
};
