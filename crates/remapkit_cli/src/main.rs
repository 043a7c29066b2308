//! remapkit command-line tool.
//!
//! Copies a source tree into a target root under a remapped layout: explicit
//! or simple prefix tables, named strategies, or the markdown/figures
//! collection mode. Ignore files and include/exclude filters narrow the
//! candidate set; name conflicts are resolved with numeric suffixes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use remapkit_io_fs::conf::{
    C_DIR_COLLECT_DEFAULT, N_SUFFIX_CONFLICT_MAX, TUP_FIGURE_DIR_ALIASES_DEFAULT,
};
use remapkit_io_fs::{
    EnumCopyPatternMode, EnumMappingUnmatchedRule, MappingCollectMarkdownFigures,
    RegistryMappingStrategy, ReportCopy, SpecCopyOptions, SpecMappingSelection, copy_tree,
    find_default_ignore_file, load_mapping_file, parse_simple_mapping,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArgUnmatched {
    Identity,
    Skip,
    Fail,
}

impl From<ArgUnmatched> for EnumMappingUnmatchedRule {
    fn from(value: ArgUnmatched) -> Self {
        match value {
            ArgUnmatched::Identity => Self::Identity,
            ArgUnmatched::Skip => Self::Skip,
            ArgUnmatched::Fail => Self::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArgPatternMode {
    Glob,
    Regex,
    Literal,
}

impl From<ArgPatternMode> for EnumCopyPatternMode {
    fn from(value: ArgPatternMode) -> Self {
        match value {
            ArgPatternMode::Glob => Self::Glob,
            ArgPatternMode::Regex => Self::Regex,
            ArgPatternMode::Literal => Self::Literal,
        }
    }
}

/// Copy a directory tree into a remapped layout.
#[derive(Parser, Debug)]
#[command(name = "remapkit", version, about = "Remap and copy a directory tree")]
struct Cli {
    /// Directory to read from.
    source_root: PathBuf,

    /// Directory to write into (created if missing).
    target_root: PathBuf,

    /// JSON mapping file: {config-name: {source-subpath: target-subpath}}.
    #[arg(long)]
    mapping_file: Option<PathBuf>,

    /// Config to use from the mapping file.
    #[arg(long, requires = "mapping_file")]
    mapping_name: Option<String>,

    /// Inline first-segment mapping, e.g. "src1:dst1,src2:dst2".
    #[arg(long)]
    simple_mapping: Option<String>,

    /// Named mapping strategy (flatten, by_extension, selective, md-and-figures, ...).
    #[arg(long)]
    custom_mapping: Option<String>,

    /// Collect child-directory markdown files and their figures.
    #[arg(long)]
    md_and_figures: bool,

    /// What table mappings do with paths no rule covers.
    #[arg(long, value_enum, default_value = "identity")]
    unmatched: ArgUnmatched,

    /// Collection directory for the markdown/figures mode.
    #[arg(long, default_value = C_DIR_COLLECT_DEFAULT)]
    collect_dir: String,

    /// Figure directory name recognised by the markdown/figures mode (repeatable).
    #[arg(long = "figures-alias")]
    figures_aliases: Vec<String>,

    /// Only consider files with these suffixes (space or comma separated).
    ///
    /// Takes every following value, so pass it after SOURCE_ROOT TARGET_ROOT
    /// or use the comma form `--extensions=.py,.md`.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    extensions: Vec<String>,

    /// Gitignore-style file (repeatable). Defaults to SOURCE_ROOT/.gitignore.
    #[arg(long = "gitignore")]
    gitignore_files: Vec<PathBuf>,

    /// Do not read SOURCE_ROOT/.gitignore implicitly.
    #[arg(long, conflicts_with = "gitignore_files")]
    no_gitignore: bool,

    /// Include filter for files (repeatable).
    #[arg(long = "include")]
    patterns_include: Vec<String>,

    /// Exclude filter for files (repeatable).
    #[arg(long = "exclude")]
    patterns_exclude: Vec<String>,

    /// How --include/--exclude values are interpreted.
    #[arg(long, value_enum, default_value = "glob")]
    pattern_mode: ArgPatternMode,

    /// Plan and report without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Maximum copy worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Highest numeric suffix tried when names collide.
    #[arg(long, default_value_t = N_SUFFIX_CONFLICT_MAX)]
    max_suffix: usize,

    /// Write the full report as JSON to this path.
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Print every action, not only failures.
    #[arg(long)]
    list_actions: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let c_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(c_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(report) => {
            print_report(&report, cli.list_actions);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ReportCopy> {
    let spec_cp_options = build_options(cli)?;
    debug!(?spec_cp_options, "resolved options");
    let report = copy_tree(&cli.source_root, &cli.target_root, spec_cp_options)
        .with_context(|| {
            format!(
                "Cannot remap {} into {}",
                cli.source_root.display(),
                cli.target_root.display()
            )
        })?;

    if let Some(path_report) = &cli.report_json {
        let txt = report.to_json().context("Failed to serialize report")?;
        std::fs::write(path_report, txt)
            .with_context(|| format!("Failed to write report to {}", path_report.display()))?;
    }
    Ok(report)
}

fn print_report(report: &ReportCopy, if_list_actions: bool) {
    println!("{report}");
    if if_list_actions {
        for action in &report.actions {
            println!("  {action}");
        }
        return;
    }
    for action in report.failures() {
        println!("  {action}");
    }
}

// ---------------------------------------------------------------------------
// Option assembly
// ---------------------------------------------------------------------------

fn build_options(cli: &Cli) -> Result<SpecCopyOptions> {
    let n_sources = usize::from(cli.mapping_file.is_some())
        + usize::from(cli.simple_mapping.is_some())
        + usize::from(cli.custom_mapping.is_some())
        + usize::from(cli.md_and_figures);
    if n_sources != 1 {
        bail!(
            "Exactly one of --mapping-file, --simple-mapping, --custom-mapping or \
             --md-and-figures is required (got {n_sources})"
        );
    }
    if !cli.source_root.is_dir() {
        bail!("Source root is not a directory: {}", cli.source_root.display());
    }

    let rule_unmatched = EnumMappingUnmatchedRule::from(cli.unmatched);
    let l_figure_aliases: Vec<String> = if cli.figures_aliases.is_empty() {
        TUP_FIGURE_DIR_ALIASES_DEFAULT
            .iter()
            .map(|v| v.to_string())
            .collect()
    } else {
        cli.figures_aliases.clone()
    };
    let policy_collect = MappingCollectMarkdownFigures::new(&cli.collect_dir, l_figure_aliases)?;

    let mut spec_mapping = SpecMappingSelection::default();
    if let Some(path_mapping_file) = &cli.mapping_file {
        spec_mapping.table_explicit = Some(load_mapping_file(
            path_mapping_file,
            cli.mapping_name.as_deref(),
            rule_unmatched,
        )?);
    } else if let Some(txt_mapping) = &cli.simple_mapping {
        spec_mapping.table_simple = Some(parse_simple_mapping(txt_mapping, rule_unmatched)?);
    } else if let Some(name_strategy) = &cli.custom_mapping {
        let mut registry = RegistryMappingStrategy::with_builtins();
        registry.register_collect(policy_collect);
        spec_mapping.strategy_custom = Some(registry.resolve(name_strategy)?);
    } else {
        spec_mapping.collect_md_figures = Some(policy_collect);
    }

    let paths_ignore_files = if !cli.gitignore_files.is_empty() {
        cli.gitignore_files.clone()
    } else if cli.no_gitignore {
        Vec::new()
    } else {
        find_default_ignore_file(&cli.source_root)
            .into_iter()
            .collect()
    };

    let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
    Ok(SpecCopyOptions {
        spec_mapping,
        suffixes_allowed: non_empty(&cli.extensions),
        paths_ignore_files,
        patterns_ignore: Vec::new(),
        patterns_include_files: non_empty(&cli.patterns_include),
        patterns_exclude_files: non_empty(&cli.patterns_exclude),
        rule_pattern: cli.pattern_mode.into(),
        num_workers_max: cli.workers,
        num_suffix_max: cli.max_suffix,
        if_dry_run: cli.dry_run,
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use clap::{CommandFactory, Parser};
    use tempfile::TempDir;

    use super::{Cli, build_options, run};

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    fn parse(tmp: &TempDir, l_extra: &[&str]) -> Cli {
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        let mut l_args = vec![
            "remapkit".to_string(),
            src.display().to_string(),
            dst.display().to_string(),
        ];
        l_args.extend(l_extra.iter().map(|v| v.to_string()));
        Cli::try_parse_from(l_args).expect("parse args")
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exactly_one_mapping_source_is_required() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&tmp.path().join("src/a.md"), "a");

        let err = build_options(&parse(&tmp, &[])).expect_err("no mapping must fail");
        assert!(err.to_string().contains("got 0"));

        let cli = parse(&tmp, &["--md-and-figures", "--simple-mapping", "a:b"]);
        let err = build_options(&cli).expect_err("two mappings must fail");
        assert!(err.to_string().contains("got 2"));

        assert!(build_options(&parse(&tmp, &["--md-and-figures"])).is_ok());
    }

    #[test]
    fn mapping_name_requires_mapping_file() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src").display().to_string();
        let dst = tmp.path().join("dst").display().to_string();
        let res = Cli::try_parse_from([
            "remapkit",
            src.as_str(),
            dst.as_str(),
            "--mapping-name",
            "cfg",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn unknown_strategy_and_bad_mapping_file_are_config_errors() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&tmp.path().join("src/a.md"), "a");
        write_text(&tmp.path().join("broken.json"), "{not json");

        assert!(build_options(&parse(&tmp, &["--custom-mapping", "nope"])).is_err());
        assert!(build_options(&parse(&tmp, &["--custom-mapping", "by-extension"])).is_ok());

        let path_broken = tmp.path().join("broken.json").display().to_string();
        assert!(build_options(&parse(&tmp, &["--mapping-file", &path_broken])).is_err());
    }

    #[test]
    fn missing_source_root_is_config_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = build_options(&parse(&tmp, &["--md-and-figures"]))
            .expect_err("missing source must fail");
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn run_simple_mapping_uses_default_gitignore() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&tmp.path().join("src/.gitignore"), "*.log\n");
        write_text(&tmp.path().join("src/data/a.txt"), "a");
        write_text(&tmp.path().join("src/data/run.log"), "log");

        let report = run(&parse(&tmp, &["--simple-mapping", "data:out"])).expect("run");
        assert_eq!(report.error_count(), 0);
        assert!(tmp.path().join("dst/out/a.txt").is_file());
        assert!(!tmp.path().join("dst/out/run.log").exists());

        let report = run(&parse(
            &tmp,
            &["--simple-mapping", "data:out", "--no-gitignore", "--dry-run"],
        ))
        .expect("dry run");
        assert!(
            report
                .actions
                .iter()
                .any(|a| a.path_src.ends_with("data/run.log") && a.is_transfer())
        );
    }

    #[test]
    fn run_writes_report_json() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&tmp.path().join("src/sub1/doc1.md"), "d1");
        write_text(&tmp.path().join("src/sub1/images/a.png"), "a");
        let path_report = tmp.path().join("report.json").display().to_string();

        let report = run(&parse(
            &tmp,
            &["--custom-mapping", "md-and-figures", "--report-json", &path_report],
        ))
        .expect("run");
        assert_eq!(report.cnt_copied, 2);
        assert!(tmp.path().join("dst/output/figures/a.png").is_file());

        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&path_report).expect("read report"),
        )
        .expect("parse report");
        assert_eq!(value["cnt_copied"], 2);
        assert_eq!(value["actions"][0]["kind"], "COPY");
    }

    #[test]
    fn extensions_accept_space_and_comma_lists() {
        let tmp = TempDir::new().expect("tempdir");
        let l_expected = vec![".py".to_string(), ".md".to_string()];

        assert_eq!(parse(&tmp, &["--extensions", ".py", ".md"]).extensions, l_expected);
        assert_eq!(parse(&tmp, &["--extensions", ".py,.md"]).extensions, l_expected);
        assert_eq!(parse(&tmp, &["--extensions=.py,.md"]).extensions, l_expected);
    }

    #[test]
    fn extensions_before_positionals_is_a_usage_error() {
        let err = Cli::try_parse_from(["remapkit", "--extensions", ".py", "src", "dst"])
            .expect_err("positionals are consumed by the list");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );

        let cli = Cli::try_parse_from(["remapkit", "--extensions=.py,.md", "src", "dst"])
            .expect("comma form leaves positionals alone");
        assert_eq!(cli.source_root, PathBuf::from("src"));
        assert_eq!(cli.target_root, PathBuf::from("dst"));
        assert_eq!(cli.extensions, vec![".py".to_string(), ".md".to_string()]);
    }
}
