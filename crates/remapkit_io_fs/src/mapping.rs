//! Mapping policies: source-relative path -> optional destination-relative path.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::conf::{
    C_BUCKET_NO_EXTENSION, C_DIR_COLLECT_DEFAULT, C_DIR_FIGURES, C_STRATEGY_BY_EXTENSION,
    C_STRATEGY_COLLECT_MD_FIGURES, C_STRATEGY_COLLECT_MD_FIGURES_ALIAS, C_STRATEGY_FLATTEN,
    C_STRATEGY_SELECTIVE, TUP_FIGURE_DIR_ALIASES_DEFAULT, TUP_SELECTIVE_SUFFIXES_DEFAULT,
};
use crate::spec::{CopyTreeError, EnumMappingUnmatchedRule};
use crate::util::{normalize_relative_path, normalize_suffix};

/// `Ok(None)`: do not copy. `Err(reason)`: the policy rejects the entry.
pub type TypeMapResult = Result<Option<PathBuf>, String>;

/// Pure path transformation applied to every planned file.
pub trait MappingPolicy: fmt::Debug + Send + Sync {
    /// Map a path relative to the source root onto a path relative to the target root.
    fn map(&self, path_rel: &Path) -> TypeMapResult;

    /// Strategy identifier used in logs.
    fn name(&self) -> &str;
}

////////////////////////////////////////////////////////////////////////////////
// #region TableStrategies

/// Preserve the relative path.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingIdentity;

impl MappingPolicy for MappingIdentity {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        Ok(Some(path_rel.to_path_buf()))
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Longest-prefix table of `source-subpath -> destination-subpath`.
#[derive(Debug, Clone)]
pub struct MappingExplicitTable {
    /// Rules sorted by source depth, deepest first.
    l_rules: Vec<(PathBuf, PathBuf)>,
    rule_unmatched: EnumMappingUnmatchedRule,
}

impl MappingExplicitTable {
    /// Build a table; keys/values are normalized and must stay inside their roots.
    pub fn new<I, S, T>(
        rules: I,
        rule_unmatched: EnumMappingUnmatchedRule,
    ) -> Result<Self, CopyTreeError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut l_rules = Vec::new();
        let mut set_sources = BTreeSet::new();
        for (c_src, c_dst) in rules {
            let path_src = _parse_table_path(c_src.as_ref(), "source")?;
            let path_dst = _parse_table_path(c_dst.as_ref(), "destination")?;
            if !set_sources.insert(path_src.clone()) {
                return Err(CopyTreeError::InvalidMapping(format!(
                    "Duplicate mapping source after normalization: `{}`",
                    c_src.as_ref()
                )));
            }
            l_rules.push((path_src, path_dst));
        }
        l_rules.sort_by(|a, b| {
            b.0.components()
                .count()
                .cmp(&a.0.components().count())
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(Self {
            l_rules,
            rule_unmatched,
        })
    }

    pub fn rules(&self) -> &[(PathBuf, PathBuf)] {
        &self.l_rules
    }

    fn _map_unmatched(&self, path_rel: &Path) -> TypeMapResult {
        match self.rule_unmatched {
            EnumMappingUnmatchedRule::Identity => Ok(Some(path_rel.to_path_buf())),
            EnumMappingUnmatchedRule::Skip => Ok(None),
            EnumMappingUnmatchedRule::Fail => Err(format!(
                "No mapping rule covers {} (strict mode)",
                path_rel.display()
            )),
        }
    }
}

impl MappingPolicy for MappingExplicitTable {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        for (path_src, path_dst) in &self.l_rules {
            let Ok(path_rest) = path_rel.strip_prefix(path_src) else {
                continue;
            };
            if path_rest.as_os_str().is_empty() {
                return Ok(Some(path_dst.clone()));
            }
            return Ok(Some(path_dst.join(path_rest)));
        }
        self._map_unmatched(path_rel)
    }

    fn name(&self) -> &str {
        "explicit_table"
    }
}

/// Table restricted to the first path segment (`--simple-mapping`).
#[derive(Debug, Clone)]
pub struct MappingSimplePrefix {
    table: MappingExplicitTable,
}

impl MappingSimplePrefix {
    pub fn new<I, S, T>(
        rules: I,
        rule_unmatched: EnumMappingUnmatchedRule,
    ) -> Result<Self, CopyTreeError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let table = MappingExplicitTable::new(rules, rule_unmatched)?;
        for (path_src, _) in table.rules() {
            if path_src.components().count() != 1 {
                return Err(CopyTreeError::InvalidMapping(format!(
                    "Simple mapping source must be one top-level segment: `{}`",
                    path_src.display()
                )));
            }
        }
        Ok(Self { table })
    }
}

impl MappingPolicy for MappingSimplePrefix {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        self.table.map(path_rel)
    }

    fn name(&self) -> &str {
        "simple_prefix"
    }
}

fn _parse_table_path(value: &str, c_role: &str) -> Result<PathBuf, CopyTreeError> {
    let c_trimmed = value.trim().trim_matches('/');
    if c_role == "source" && c_trimmed.is_empty() {
        return Err(CopyTreeError::InvalidMapping(format!(
            "Mapping {c_role} must not be empty"
        )));
    }
    normalize_relative_path(Path::new(c_trimmed)).ok_or_else(|| {
        CopyTreeError::InvalidMapping(format!(
            "Mapping {c_role} must be a relative path without `..`: `{value}`"
        ))
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region NamedStrategies

/// Drop directory structure; keep only the file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingFlatten;

impl MappingPolicy for MappingFlatten {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        Ok(path_rel.file_name().map(PathBuf::from))
    }

    fn name(&self) -> &str {
        C_STRATEGY_FLATTEN
    }
}

/// `<extension>/<file name>`, extension lowercased and without the dot.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingByExtension;

impl MappingPolicy for MappingByExtension {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        let Some(name_file) = path_rel.file_name() else {
            return Ok(None);
        };
        let c_bucket = path_rel
            .extension()
            .map(|v| v.to_string_lossy().to_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| C_BUCKET_NO_EXTENSION.to_string());
        Ok(Some(Path::new(&c_bucket).join(name_file)))
    }

    fn name(&self) -> &str {
        C_STRATEGY_BY_EXTENSION
    }
}

/// Keep the relative path of files with an allowed suffix; drop the rest.
#[derive(Debug, Clone)]
pub struct MappingSelective {
    set_suffixes: BTreeSet<String>,
}

impl MappingSelective {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            set_suffixes: suffixes
                .into_iter()
                .map(|v| normalize_suffix(v.as_ref()).to_lowercase())
                .collect(),
        }
    }
}

impl Default for MappingSelective {
    fn default() -> Self {
        Self::new(TUP_SELECTIVE_SUFFIXES_DEFAULT)
    }
}

impl MappingPolicy for MappingSelective {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        let Some(ext) = path_rel.extension() else {
            return Ok(None);
        };
        let c_suffix = format!(".{}", ext.to_string_lossy().to_lowercase());
        if self.set_suffixes.contains(&c_suffix) {
            Ok(Some(path_rel.to_path_buf()))
        } else {
            Ok(None)
        }
    }

    fn name(&self) -> &str {
        C_STRATEGY_SELECTIVE
    }
}

/// Collect `*.md` pages and their figure folders out of per-document directories.
///
/// For each immediate child directory `<doc>` of the source root:
/// - `<doc>/<name>.md` maps to `<collect>/<name>.md`;
/// - any file below a `<doc>/**/images/` directory (or a configured alias)
///   maps to `<collect>/figures/<file name>`, flattening the figure subtree.
///
/// Everything else, including top-level files, is not copied.
#[derive(Debug, Clone)]
pub struct MappingCollectMarkdownFigures {
    path_dir_collect: PathBuf,
    l_names_figure_dirs: Vec<String>,
}

impl MappingCollectMarkdownFigures {
    pub fn new<P, I, S>(dir_collect: P, names_figure_dirs: I) -> Result<Self, CopyTreeError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path_dir_collect = normalize_relative_path(dir_collect.as_ref()).ok_or_else(|| {
            CopyTreeError::InvalidMapping(format!(
                "Collection directory must be a relative path without `..`: {}",
                dir_collect.as_ref().display()
            ))
        })?;
        let l_names_figure_dirs: Vec<String> =
            names_figure_dirs.into_iter().map(Into::into).collect();
        if l_names_figure_dirs.is_empty() {
            return Err(CopyTreeError::InvalidMapping(
                "At least one figure directory name is required".to_string(),
            ));
        }
        Ok(Self {
            path_dir_collect,
            l_names_figure_dirs,
        })
    }

    fn _is_figure_dir(&self, name_dir: &OsStr) -> bool {
        self.l_names_figure_dirs
            .iter()
            .any(|v| OsStr::new(v.as_str()) == name_dir)
    }
}

impl Default for MappingCollectMarkdownFigures {
    fn default() -> Self {
        Self {
            path_dir_collect: PathBuf::from(C_DIR_COLLECT_DEFAULT),
            l_names_figure_dirs: TUP_FIGURE_DIR_ALIASES_DEFAULT
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

impl MappingPolicy for MappingCollectMarkdownFigures {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        let l_parts: Vec<&OsStr> = path_rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(v) => Some(v),
                _ => None,
            })
            .collect();
        // child dir + file at minimum
        if l_parts.len() < 2 {
            return Ok(None);
        }
        let name_file = l_parts[l_parts.len() - 1];

        // case-sensitive: `DOC.MD` is not collected
        let b_is_markdown = Path::new(name_file)
            .extension()
            .is_some_and(|v| v == "md");
        if l_parts.len() == 2 && b_is_markdown {
            return Ok(Some(self.path_dir_collect.join(name_file)));
        }

        let b_under_figures = l_parts[1..l_parts.len() - 1]
            .iter()
            .any(|v| self._is_figure_dir(v));
        if b_under_figures {
            return Ok(Some(
                self.path_dir_collect.join(C_DIR_FIGURES).join(name_file),
            ));
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        C_STRATEGY_COLLECT_MD_FIGURES
    }
}

/// Caller-supplied mapping closure registered under a name.
#[derive(Clone)]
pub struct MappingFn {
    name: String,
    func: Arc<dyn Fn(&Path) -> TypeMapResult + Send + Sync>,
}

impl MappingFn {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Path) -> TypeMapResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for MappingFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingFn").field("name", &self.name).finish()
    }
}

impl MappingPolicy for MappingFn {
    fn map(&self, path_rel: &Path) -> TypeMapResult {
        (self.func)(path_rel)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RegistryAndSelection

/// Named strategy registry resolved at start-up.
#[derive(Debug, Clone, Default)]
pub struct RegistryMappingStrategy {
    dict_strategies: BTreeMap<String, Arc<dyn MappingPolicy>>,
}

impl RegistryMappingStrategy {
    /// Registry with no strategies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in named strategies with default settings.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(C_STRATEGY_FLATTEN, Arc::new(MappingFlatten));
        registry.register(C_STRATEGY_BY_EXTENSION, Arc::new(MappingByExtension));
        registry.register(C_STRATEGY_SELECTIVE, Arc::new(MappingSelective::default()));
        registry.register_collect(MappingCollectMarkdownFigures::default());
        registry
    }

    /// Register (or replace) a strategy.
    pub fn register(&mut self, name: &str, policy: Arc<dyn MappingPolicy>) {
        self.dict_strategies.insert(name.to_string(), policy);
    }

    /// Register a closure as a strategy.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Path) -> TypeMapResult + Send + Sync + 'static,
    {
        self.register(name, Arc::new(MappingFn::new(name, func)));
    }

    /// Register the markdown/figures strategy under its name and alias.
    pub fn register_collect(&mut self, policy: MappingCollectMarkdownFigures) {
        let policy: Arc<dyn MappingPolicy> = Arc::new(policy);
        self.register(C_STRATEGY_COLLECT_MD_FIGURES, Arc::clone(&policy));
        self.register(C_STRATEGY_COLLECT_MD_FIGURES_ALIAS, policy);
    }

    /// Look up a strategy; `_` and `-` are interchangeable.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn MappingPolicy>, CopyTreeError> {
        if let Some(policy) = self.dict_strategies.get(name) {
            return Ok(Arc::clone(policy));
        }
        let c_key = name.replace('_', "-");
        self.dict_strategies
            .iter()
            .find(|(k, _)| k.replace('_', "-") == c_key)
            .map(|(_, v)| Arc::clone(v))
            .ok_or_else(|| {
                CopyTreeError::InvalidMapping(format!(
                    "Unknown mapping strategy: `{name}`. Expected one of: {:?}",
                    self.names()
                ))
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.dict_strategies.keys().cloned().collect()
    }
}

/// Mapping sources of one run; [`Self::resolve_policy`] picks by priority.
///
/// Priority: explicit table > simple mapping > custom strategy >
/// markdown/figures mode > identity.
#[derive(Debug, Clone, Default)]
pub struct SpecMappingSelection {
    pub table_explicit: Option<MappingExplicitTable>,
    pub table_simple: Option<MappingSimplePrefix>,
    pub strategy_custom: Option<Arc<dyn MappingPolicy>>,
    pub collect_md_figures: Option<MappingCollectMarkdownFigures>,
}

impl SpecMappingSelection {
    /// Number of configured (non-identity) mapping sources.
    pub fn count_sources(&self) -> usize {
        usize::from(self.table_explicit.is_some())
            + usize::from(self.table_simple.is_some())
            + usize::from(self.strategy_custom.is_some())
            + usize::from(self.collect_md_figures.is_some())
    }

    pub fn resolve_policy(&self) -> Arc<dyn MappingPolicy> {
        if let Some(table) = &self.table_explicit {
            return Arc::new(table.clone());
        }
        if let Some(table) = &self.table_simple {
            return Arc::new(table.clone());
        }
        if let Some(policy) = &self.strategy_custom {
            return Arc::clone(policy);
        }
        if let Some(policy) = &self.collect_md_figures {
            return Arc::new(policy.clone());
        }
        Arc::new(MappingIdentity)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::{
        MappingByExtension, MappingCollectMarkdownFigures, MappingExplicitTable, MappingFlatten,
        MappingPolicy, MappingSelective, MappingSimplePrefix, RegistryMappingStrategy,
        SpecMappingSelection,
    };
    use crate::spec::EnumMappingUnmatchedRule;

    fn mapped(policy: &dyn MappingPolicy, path: &str) -> Option<PathBuf> {
        policy.map(Path::new(path)).expect("map must not reject")
    }

    #[test]
    fn explicit_table_prefers_longest_prefix() {
        let table = MappingExplicitTable::new(
            [("magic_pdf", "src/core"), ("magic_pdf/model", "models")],
            EnumMappingUnmatchedRule::Identity,
        )
        .expect("table");

        assert_eq!(
            mapped(&table, "magic_pdf/model/net.py"),
            Some(PathBuf::from("models/net.py"))
        );
        assert_eq!(
            mapped(&table, "magic_pdf/utils.py"),
            Some(PathBuf::from("src/core/utils.py"))
        );
        // prefix matching is per component, not per character
        assert_eq!(
            mapped(&table, "magic_pdf_extra/a.py"),
            Some(PathBuf::from("magic_pdf_extra/a.py"))
        );
    }

    #[test]
    fn explicit_table_unmatched_rules() {
        let rules = [("docs", "documentation")];
        let identity =
            MappingExplicitTable::new(rules, EnumMappingUnmatchedRule::Identity).expect("table");
        let skip = MappingExplicitTable::new(rules, EnumMappingUnmatchedRule::Skip).expect("table");
        let strict =
            MappingExplicitTable::new(rules, EnumMappingUnmatchedRule::Fail).expect("table");

        assert_eq!(mapped(&identity, "src/a.rs"), Some(PathBuf::from("src/a.rs")));
        assert_eq!(mapped(&skip, "src/a.rs"), None);
        assert!(strict.map(Path::new("src/a.rs")).is_err());
        assert_eq!(
            mapped(&strict, "docs/index.md"),
            Some(PathBuf::from("documentation/index.md"))
        );
    }

    #[test]
    fn explicit_table_rejects_escaping_paths() {
        assert!(
            MappingExplicitTable::new([("src", "../outside")], EnumMappingUnmatchedRule::Identity)
                .is_err()
        );
        assert!(
            MappingExplicitTable::new([("src", "a"), ("src/", "b")], EnumMappingUnmatchedRule::Identity)
                .is_err()
        );
    }

    #[test]
    fn simple_prefix_rewrites_first_segment_only() {
        let table = MappingSimplePrefix::new([("tests", "qa")], EnumMappingUnmatchedRule::Identity)
            .expect("simple");
        assert_eq!(mapped(&table, "tests/unit/a.py"), Some(PathBuf::from("qa/unit/a.py")));
        assert_eq!(mapped(&table, "src/tests/a.py"), Some(PathBuf::from("src/tests/a.py")));
        assert!(
            MappingSimplePrefix::new([("a/b", "c")], EnumMappingUnmatchedRule::Identity).is_err()
        );
    }

    #[test]
    fn flatten_and_by_extension() {
        assert_eq!(mapped(&MappingFlatten, "a/b/c.txt"), Some(PathBuf::from("c.txt")));
        assert_eq!(
            mapped(&MappingByExtension, "a/b/Photo.JPG"),
            Some(PathBuf::from("jpg/Photo.JPG"))
        );
        assert_eq!(
            mapped(&MappingByExtension, "a/Makefile"),
            Some(PathBuf::from("no_extension/Makefile"))
        );
        assert_eq!(
            mapped(&MappingByExtension, "a/.bashrc"),
            Some(PathBuf::from("no_extension/.bashrc"))
        );
    }

    #[test]
    fn selective_keeps_configured_suffixes() {
        let policy = MappingSelective::default();
        assert_eq!(mapped(&policy, "pkg/conf.yaml"), Some(PathBuf::from("pkg/conf.yaml")));
        assert_eq!(mapped(&policy, "pkg/readme.md"), None);

        let policy = MappingSelective::new(["md"]);
        assert_eq!(mapped(&policy, "pkg/readme.md"), Some(PathBuf::from("pkg/readme.md")));
    }

    #[test]
    fn collect_markdown_and_figures_layout() {
        let policy =
            MappingCollectMarkdownFigures::new("collect", ["images", "figures"]).expect("policy");

        assert_eq!(mapped(&policy, "sub1/doc1.md"), Some(PathBuf::from("collect/doc1.md")));
        assert_eq!(
            mapped(&policy, "sub1/images/a.png"),
            Some(PathBuf::from("collect/figures/a.png"))
        );
        assert_eq!(
            mapped(&policy, "sub2/figures/deep/nested/b.jpg"),
            Some(PathBuf::from("collect/figures/b.jpg"))
        );
        assert_eq!(
            mapped(&policy, "sub2/pages/images/c.png"),
            Some(PathBuf::from("collect/figures/c.png"))
        );
        // markdown below the first level, stray files and top-level files are dropped
        assert_eq!(mapped(&policy, "sub1/nested/doc.md"), None);
        assert_eq!(mapped(&policy, "sub1/layout.json"), None);
        assert_eq!(mapped(&policy, "root.md"), None);
        // the child directory itself does not count as a figure directory
        assert_eq!(mapped(&policy, "images/a.png"), None);
    }

    #[test]
    fn collect_markdown_suffix_is_case_sensitive() {
        let policy =
            MappingCollectMarkdownFigures::new("collect", ["images"]).expect("policy");

        assert_eq!(mapped(&policy, "sub1/DOC.MD"), None);
        assert_eq!(mapped(&policy, "sub1/Doc.Md"), None);
        assert_eq!(mapped(&policy, "sub1/DOC.md"), Some(PathBuf::from("collect/DOC.md")));
    }

    #[test]
    fn registry_resolves_builtins_and_custom() {
        let mut registry = RegistryMappingStrategy::with_builtins();
        registry.register_fn("upper", |p| {
            Ok(Some(PathBuf::from(p.to_string_lossy().to_uppercase())))
        });

        let policy = registry.resolve("by-extension").expect("alias with dash");
        assert_eq!(policy.name(), "by_extension");
        let policy = registry.resolve("md-and-figures").expect("alias");
        assert_eq!(policy.name(), "collect-markdown-and-figures");
        let policy = registry.resolve("upper").expect("custom");
        assert_eq!(mapped(policy.as_ref(), "a/b.txt"), Some(PathBuf::from("A/B.TXT")));
        assert!(registry.resolve("nope").is_err());
    }

    #[test]
    fn selection_priority_order() {
        let mut spec_mapping = SpecMappingSelection::default();
        assert_eq!(spec_mapping.resolve_policy().name(), "identity");

        spec_mapping.collect_md_figures = Some(MappingCollectMarkdownFigures::default());
        assert_eq!(
            spec_mapping.resolve_policy().name(),
            "collect-markdown-and-figures"
        );

        spec_mapping.strategy_custom = Some(Arc::new(MappingFlatten));
        assert_eq!(spec_mapping.resolve_policy().name(), "flatten");

        spec_mapping.table_simple = Some(
            MappingSimplePrefix::new([("a", "b")], EnumMappingUnmatchedRule::Identity)
                .expect("simple"),
        );
        assert_eq!(spec_mapping.resolve_policy().name(), "simple_prefix");

        spec_mapping.table_explicit = Some(
            MappingExplicitTable::new([("a", "c")], EnumMappingUnmatchedRule::Identity)
                .expect("table"),
        );
        assert_eq!(spec_mapping.resolve_policy().name(), "explicit_table");
        assert_eq!(spec_mapping.count_sources(), 4);
    }
}
