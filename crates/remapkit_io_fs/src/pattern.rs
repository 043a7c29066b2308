//! Ignore-file evaluation (gitignore layering) and ad-hoc include/exclude filters.

use std::fs;
use std::path::Path;

use globset::{Glob, GlobBuilder, GlobMatcher};
use regex::Regex;
use tracing::warn;

use crate::spec::{CopyTreeError, EnumCopyPatternMode};

////////////////////////////////////////////////////////////////////////////////
// #region IgnoreSpec

/// One compiled ignore line.
#[derive(Debug, Clone)]
pub struct SpecIgnoreRule {
    /// Line as written (trailing whitespace trimmed).
    pub pattern: String,
    /// `<source>:<line>` for diagnostics.
    pub origin: String,
    /// `!pattern`: re-include.
    pub if_negated: bool,
    /// `pattern/`: directories only.
    pub if_dir_only: bool,
    /// `/pattern`: relative to the source root only.
    pub if_anchored: bool,
    matcher: GlobMatcher,
}

/// Strip line endings and trailing blanks not protected by a backslash.
fn _trim_unescaped_end(line: &str) -> &str {
    let mut c_line = line.trim_end_matches(['\r', '\n']);
    while let Some(rest) = c_line.strip_suffix([' ', '\t']) {
        let n_backslashes = rest.chars().rev().take_while(|c| *c == '\\').count();
        if n_backslashes % 2 == 1 {
            break;
        }
        c_line = rest;
    }
    c_line
}

impl SpecIgnoreRule {
    /// Compile one ignore line. `Ok(None)` for blank lines and comments.
    pub fn parse(line: &str, origin: &str) -> Result<Option<Self>, String> {
        let c_line = _trim_unescaped_end(line);
        if c_line.is_empty() || c_line.starts_with('#') {
            return Ok(None);
        }

        let (if_negated, c_body) = match c_line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, c_line),
        };
        let (if_dir_only, c_body) = match c_body.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, c_body),
        };
        let (if_anchored, c_body) = match c_body.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, c_body),
        };
        if c_body.is_empty() {
            return Err(format!("Empty ignore pattern `{c_line}` ({origin})"));
        }

        let c_glob = if if_anchored || c_body.starts_with("**/") {
            c_body.to_string()
        } else {
            format!("**/{c_body}")
        };
        let matcher = GlobBuilder::new(&c_glob)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| format!("Invalid ignore pattern `{c_line}` ({origin}): {e}"))?
            .compile_matcher();

        Ok(Some(Self {
            pattern: c_line.to_string(),
            origin: origin.to_string(),
            if_negated,
            if_dir_only,
            if_anchored,
            matcher,
        }))
    }

    /// Does this rule's glob select `path_rel` (negation not applied)?
    pub fn is_match(&self, path_rel: &str, if_is_dir: bool) -> bool {
        if self.if_dir_only && !if_is_dir {
            return false;
        }
        self.matcher.is_match(path_rel)
    }
}

/// Ordered ignore rules; the last matching rule decides.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSpec {
    l_rules: Vec<SpecIgnoreRule>,
}

impl IgnoreSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from lines; malformed lines are returned as warnings and skipped.
    pub fn from_lines<I, S>(lines: I, origin: &str) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec_ignore = Self::new();
        let l_warnings = spec_ignore.add_lines(lines, origin);
        (spec_ignore, l_warnings)
    }

    /// Append lines after the existing rules. Returns warnings for skipped lines.
    pub fn add_lines<I, S>(&mut self, lines: I, origin: &str) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut l_warnings = Vec::new();
        for (n_idx, line) in lines.into_iter().enumerate() {
            let c_origin = format!("{origin}:{}", n_idx + 1);
            match SpecIgnoreRule::parse(line.as_ref(), &c_origin) {
                Ok(Some(rule)) => self.l_rules.push(rule),
                Ok(None) => {}
                Err(message) => {
                    warn!(%message, "skipping malformed ignore pattern");
                    l_warnings.push(message);
                }
            }
        }
        l_warnings
    }

    /// Append the rules of an ignore file.
    pub fn add_file(&mut self, path_ignore_file: &Path) -> Result<Vec<String>, CopyTreeError> {
        let txt = fs::read_to_string(path_ignore_file).map_err(|e| {
            CopyTreeError::IgnoreFileUnreadable {
                path: path_ignore_file.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        Ok(self.add_lines(txt.lines(), &path_ignore_file.display().to_string()))
    }

    pub fn rules(&self) -> &[SpecIgnoreRule] {
        &self.l_rules
    }

    pub fn len(&self) -> usize {
        self.l_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_rules.is_empty()
    }

    /// Verdict for the entry itself, ancestors not consulted.
    ///
    /// Used by the walker, which never reaches entries below a pruned directory.
    pub fn is_entry_ignored(&self, path_rel: &str, if_is_dir: bool) -> bool {
        self.l_rules
            .iter()
            .rev()
            .find(|rule| rule.is_match(path_rel, if_is_dir))
            .is_some_and(|rule| !rule.if_negated)
    }
}

/// Does a single ignore pattern match `path_rel` (treated as a file)?
///
/// Negation is not applied; malformed patterns match nothing.
pub fn matches(path_rel: &str, pattern: &str) -> bool {
    match SpecIgnoreRule::parse(pattern, "<inline>") {
        Ok(Some(rule)) => rule.is_match(_trim_relative(path_rel), false),
        _ => false,
    }
}

/// Final ignore verdict for `path_rel`, honouring ignored ancestor directories.
pub fn is_ignored(path_rel: &str, if_is_dir: bool, spec_ignore: &IgnoreSpec) -> bool {
    let c_path = _trim_relative(path_rel);
    if c_path.is_empty() {
        return false;
    }
    let l_parts: Vec<&str> = c_path.split('/').filter(|v| !v.is_empty()).collect();
    for n_end in 1..l_parts.len() {
        if spec_ignore.is_entry_ignored(&l_parts[..n_end].join("/"), true) {
            return true;
        }
    }
    spec_ignore.is_entry_ignored(&l_parts.join("/"), if_is_dir)
}

fn _trim_relative(path_rel: &str) -> &str {
    let mut c_path = path_rel;
    while let Some(rest) = c_path.strip_prefix("./") {
        c_path = rest;
    }
    c_path.trim_matches('/')
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AdHocFilters

#[derive(Debug, Clone)]
pub(crate) enum TypeCopyPatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

impl TypeCopyPatternSeq {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Literal(v) => v.iter().any(|p| value.contains(p.as_str())),
            Self::Glob(v) => v.iter().any(|p| p.is_match(value)),
            Self::Regex(v) => v.iter().any(|p| p.is_match(value)),
        }
    }
}

/// Compiled `--include` / `--exclude` file filters.
#[derive(Debug, Clone, Default)]
pub struct SpecCopyPatterns {
    pub(crate) patterns_include_files: Option<TypeCopyPatternSeq>,
    pub(crate) patterns_exclude_files: Option<TypeCopyPatternSeq>,
}

impl SpecCopyPatterns {
    pub fn from_raw(
        patterns_include_files: Option<&[String]>,
        patterns_exclude_files: Option<&[String]>,
        rule_pattern: EnumCopyPatternMode,
    ) -> Result<Self, CopyTreeError> {
        Ok(Self {
            patterns_include_files: _compile(patterns_include_files, rule_pattern)?,
            patterns_exclude_files: _compile(patterns_exclude_files, rule_pattern)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns_include_files.is_none() && self.patterns_exclude_files.is_none()
    }

    /// `true` when the file fails the include list or hits the exclude list.
    ///
    /// Each list is tested against the relative path and the file name.
    pub fn should_exclude(&self, path_rel: &str, name_file: &str) -> bool {
        let is_hit = |patterns: &TypeCopyPatternSeq| {
            patterns.is_match(path_rel) || patterns.is_match(name_file)
        };
        if let Some(patterns) = &self.patterns_include_files
            && !is_hit(patterns)
        {
            return true;
        }
        self.patterns_exclude_files.as_ref().is_some_and(is_hit)
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumCopyPatternMode,
) -> Result<Option<TypeCopyPatternSeq>, CopyTreeError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumCopyPatternMode::Literal => Ok(Some(TypeCopyPatternSeq::Literal(patterns.to_vec()))),
        EnumCopyPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| {
                        CopyTreeError::InvalidPattern(format!(
                            "Invalid pattern in include/exclude: {e}"
                        ))
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeCopyPatternSeq::Glob(l_glob)))
        }
        EnumCopyPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| {
                    CopyTreeError::InvalidPattern(format!(
                        "Invalid pattern in include/exclude: {e}"
                    ))
                })?;
                l_regex.push(regex);
            }
            Ok(Some(TypeCopyPatternSeq::Regex(l_regex)))
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{IgnoreSpec, SpecCopyPatterns, is_ignored, matches};
    use crate::spec::{CopyTreeError, EnumCopyPatternMode};

    fn spec(lines: &[&str]) -> IgnoreSpec {
        let (spec_ignore, l_warnings) = IgnoreSpec::from_lines(lines, "test");
        assert!(l_warnings.is_empty(), "{l_warnings:?}");
        spec_ignore
    }

    #[test]
    fn negation_reincludes_later_match() {
        let spec_ignore = spec(&["*.log", "!keep.log"]);
        assert!(!is_ignored("keep.log", false, &spec_ignore));
        assert!(is_ignored("other.log", false, &spec_ignore));
        assert!(!is_ignored("notes.txt", false, &spec_ignore));
    }

    #[test]
    fn last_matching_pattern_wins() {
        // exclusion after re-inclusion wins again
        let spec_ignore = spec(&["*.log", "!keep.log", "keep.log"]);
        assert!(is_ignored("keep.log", false, &spec_ignore));

        // negation before the exclusion has no effect
        let spec_ignore = spec(&["!keep.log", "*.log"]);
        assert!(is_ignored("keep.log", false, &spec_ignore));
    }

    #[test]
    fn unanchored_matches_any_depth_anchored_only_root() {
        let spec_ignore = spec(&["build", "/dist"]);
        assert!(is_ignored("build", true, &spec_ignore));
        assert!(is_ignored("a/b/build", true, &spec_ignore));
        assert!(is_ignored("dist", true, &spec_ignore));
        assert!(!is_ignored("pkg/dist", true, &spec_ignore));
    }

    #[test]
    fn directory_only_pattern_skips_files_and_covers_descendants() {
        let spec_ignore = spec(&["cache/"]);
        assert!(!is_ignored("cache", false, &spec_ignore));
        assert!(is_ignored("cache", true, &spec_ignore));
        assert!(is_ignored("cache/a/b.bin", false, &spec_ignore));
        assert!(is_ignored("src/cache/x.txt", false, &spec_ignore));
    }

    #[test]
    fn negation_cannot_reinclude_below_ignored_directory() {
        let spec_ignore = spec(&["logs/", "!logs/keep.log"]);
        assert!(is_ignored("logs/keep.log", false, &spec_ignore));
    }

    #[test]
    fn wildcards_and_character_classes() {
        assert!(matches("a/b/c.txt", "*.txt"));
        assert!(matches("a/b/c.txt", "a/**/c.txt"));
        assert!(matches("a/x/y/c.txt", "/a/**/c.txt"));
        assert!(!matches("a/b/c.txt", "/a/*.txt"));
        assert!(matches("file1.txt", "file?.txt"));
        assert!(matches("file1.txt", "file[0-9].txt"));
        assert!(!matches("filea.txt", "file[0-9].txt"));
        assert!(!matches("dir", "dir/"));
    }

    #[test]
    fn comments_blanks_and_escapes() {
        let spec_ignore = spec(&["# comment", "", "   ", r"\#hash", r"\!bang"]);
        assert_eq!(spec_ignore.len(), 2);
        assert!(is_ignored("#hash", false, &spec_ignore));
        assert!(is_ignored("!bang", false, &spec_ignore));
    }

    #[test]
    fn malformed_pattern_is_skipped_with_warning() {
        let (spec_ignore, l_warnings) =
            IgnoreSpec::from_lines(["[", "*.tmp", "!", "/"], "bad");
        assert_eq!(l_warnings.len(), 3);
        assert_eq!(spec_ignore.len(), 1);
        assert!(is_ignored("x.tmp", false, &spec_ignore));
    }

    #[test]
    fn verdict_is_stable_across_calls() {
        let spec_ignore = spec(&["*.log", "!keep.log"]);
        for _ in 0..3 {
            assert!(!is_ignored("./keep.log", false, &spec_ignore));
            assert!(is_ignored("/x/other.log", false, &spec_ignore));
        }
    }

    #[test]
    fn adhoc_filters_include_then_exclude() {
        let spec_filters = SpecCopyPatterns::from_raw(
            Some(&["*.csv".to_string()]),
            Some(&["*skip*".to_string()]),
            EnumCopyPatternMode::Glob,
        )
        .expect("compile");
        assert!(!spec_filters.should_exclude("data/report.csv", "report.csv"));
        assert!(spec_filters.should_exclude("data/report_skip.csv", "report_skip.csv"));
        assert!(spec_filters.should_exclude("data/notes.txt", "notes.txt"));
    }

    #[test]
    fn adhoc_filters_regex_and_literal() {
        let spec_filters = SpecCopyPatterns::from_raw(
            Some(&[r"^report_\d+\.csv$".to_string()]),
            None,
            EnumCopyPatternMode::Regex,
        )
        .expect("compile");
        assert!(!spec_filters.should_exclude("x/report_01.csv", "report_01.csv"));
        assert!(spec_filters.should_exclude("x/report_a.csv", "report_a.csv"));

        let spec_filters = SpecCopyPatterns::from_raw(
            None,
            Some(&["tmp".to_string()]),
            EnumCopyPatternMode::Literal,
        )
        .expect("compile");
        assert!(spec_filters.should_exclude("tmp/a.txt", "a.txt"));
        assert!(!spec_filters.should_exclude("src/a.txt", "a.txt"));
    }

    #[test]
    fn adhoc_filters_reject_invalid_patterns() {
        let err = SpecCopyPatterns::from_raw(
            Some(&["(".to_string()]),
            None,
            EnumCopyPatternMode::Regex,
        )
        .expect_err("invalid regex must fail");
        assert!(matches!(err, CopyTreeError::InvalidPattern(_)));
    }

    #[test]
    fn escaped_trailing_space_is_kept() {
        let spec_ignore = spec(&[r"foo\ ", "bar   ", "baz\t\r"]);
        assert!(is_ignored("foo ", false, &spec_ignore));
        assert!(!is_ignored("foo", false, &spec_ignore));
        assert!(is_ignored("bar", false, &spec_ignore));
        assert!(!is_ignored("bar ", false, &spec_ignore));
        assert!(is_ignored("baz", false, &spec_ignore));

        // `\\` escapes itself, so the blank after it is trimmed
        assert!(matches(r"qux\", r"qux\\ "));
    }
}
