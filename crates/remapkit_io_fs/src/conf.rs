//! Remap constants and configuration loaders (mapping file, simple mapping).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::mapping::{MappingExplicitTable, MappingSimplePrefix};
use crate::pattern::IgnoreSpec;
use crate::spec::{CopyTreeError, EnumMappingUnmatchedRule};

/// Bucket used by `by_extension` for files without an extension.
pub const C_BUCKET_NO_EXTENSION: &str = "no_extension";
/// Sub-directory of the collection directory receiving figure files.
pub const C_DIR_FIGURES: &str = "figures";
/// Default collection directory of the markdown/figures strategy.
pub const C_DIR_COLLECT_DEFAULT: &str = "output";
/// Default names of figure directories scanned by the markdown/figures strategy.
pub const TUP_FIGURE_DIR_ALIASES_DEFAULT: [&str; 1] = ["images"];
/// Default suffixes copied by the `selective` strategy.
pub const TUP_SELECTIVE_SUFFIXES_DEFAULT: [&str; 4] = [".py", ".yaml", ".yml", ".json"];
/// Default highest numeric suffix tried by the conflict resolver.
pub const N_SUFFIX_CONFLICT_MAX: usize = 10_000;
/// Ignore file looked up in the source root when none is given.
pub const C_NAME_IGNORE_FILE: &str = ".gitignore";

/// Built-in strategy names.
pub const C_STRATEGY_FLATTEN: &str = "flatten";
pub const C_STRATEGY_BY_EXTENSION: &str = "by_extension";
pub const C_STRATEGY_SELECTIVE: &str = "selective";
pub const C_STRATEGY_COLLECT_MD_FIGURES: &str = "collect-markdown-and-figures";
pub const C_STRATEGY_COLLECT_MD_FIGURES_ALIAS: &str = "md-and-figures";

/// Skip reasons recorded on plan actions.
pub const C_REASON_UNMAPPED: &str = "unmapped";
pub const C_REASON_IGNORED: &str = "ignored";
pub const C_REASON_EXCLUDED: &str = "excluded";
pub const C_REASON_UNSUPPORTED_ENTRY: &str = "unsupported-entry-type";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeMappingDocument {
    Flat(BTreeMap<String, String>),
    Named(BTreeMap<String, BTreeMap<String, String>>),
}

/// Load an explicit mapping table from a JSON file.
///
/// The top level maps config names to `{source-subpath: dest-subpath}` tables.
/// `name_config` selects one; without it the file must hold exactly one table.
/// A flat `{source-subpath: dest-subpath}` document is accepted as-is.
pub fn load_mapping_file(
    path_mapping_file: &Path,
    name_config: Option<&str>,
    rule_unmatched: EnumMappingUnmatchedRule,
) -> Result<MappingExplicitTable, CopyTreeError> {
    let err_file = |message: String| CopyTreeError::MappingFileInvalid {
        path: path_mapping_file.to_path_buf(),
        message,
    };

    let txt = fs::read_to_string(path_mapping_file).map_err(|e| err_file(e.to_string()))?;
    let doc: TypeMappingDocument =
        serde_json::from_str(&txt).map_err(|e| err_file(e.to_string()))?;

    let dict_rules = match doc {
        TypeMappingDocument::Flat(dict_rules) => {
            if let Some(name) = name_config {
                return Err(err_file(format!(
                    "config `{name}` requested but the file holds a single flat table"
                )));
            }
            dict_rules
        }
        TypeMappingDocument::Named(mut dict_configs) => match name_config {
            Some(name) => dict_configs.remove(name).ok_or_else(|| {
                err_file(format!(
                    "config `{name}` not found; available: {:?}",
                    dict_configs.keys().collect::<Vec<_>>()
                ))
            })?,
            None if dict_configs.len() == 1 => dict_configs
                .into_values()
                .next()
                .unwrap_or_default(),
            None => {
                return Err(err_file(format!(
                    "file holds {} configs; select one by name: {:?}",
                    dict_configs.len(),
                    dict_configs.keys().collect::<Vec<_>>()
                )));
            }
        },
    };

    if dict_rules.is_empty() {
        return Err(err_file("mapping table is empty".to_string()));
    }
    MappingExplicitTable::new(dict_rules, rule_unmatched)
}

/// Parse `"src1:dst1,src2:dst2"` into a first-segment rewrite table.
pub fn parse_simple_mapping(
    txt_mapping: &str,
    rule_unmatched: EnumMappingUnmatchedRule,
) -> Result<MappingSimplePrefix, CopyTreeError> {
    let mut l_pairs = Vec::new();
    for c_pair in txt_mapping.split(',') {
        let c_pair = c_pair.trim();
        if c_pair.is_empty() {
            continue;
        }
        let Some((c_src, c_dst)) = c_pair.split_once(':') else {
            return Err(CopyTreeError::InvalidMapping(format!(
                "Invalid simple mapping pair `{c_pair}`: expected `source:target`"
            )));
        };
        l_pairs.push((c_src.trim().to_string(), c_dst.trim().to_string()));
    }
    if l_pairs.is_empty() {
        return Err(CopyTreeError::InvalidMapping(
            "Simple mapping holds no `source:target` pairs".to_string(),
        ));
    }
    MappingSimplePrefix::new(l_pairs, rule_unmatched)
}

/// Build one ignore spec from ignore files followed by inline patterns.
///
/// Layering follows argument order, so inline patterns override file rules.
/// Returns the rules and the warnings of skipped malformed lines.
pub fn load_ignore_files<S>(
    paths_ignore_files: &[PathBuf],
    patterns_inline: &[S],
) -> Result<(IgnoreSpec, Vec<String>), CopyTreeError>
where
    S: AsRef<str>,
{
    let mut spec_ignore = IgnoreSpec::new();
    let mut l_warnings = Vec::new();
    for path_ignore_file in paths_ignore_files {
        l_warnings.extend(spec_ignore.add_file(path_ignore_file)?);
    }
    l_warnings.extend(spec_ignore.add_lines(patterns_inline, "<inline>"));
    Ok((spec_ignore, l_warnings))
}
