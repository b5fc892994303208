use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use sitetool_core::attrs::scan_resource_attrs;
use sitetool_core::config::{SiteConfig, load_config};
use sitetool_core::filesystem::scan_stats;
use sitetool_core::normalize::normalize_tree;
use sitetool_core::prettify::prettify_tree;
use sitetool_core::queries::fix_query_strings;
use sitetool_core::refactor::{RefactorOptions, RefactorReport, run_refactor};
use sitetool_core::rename::rename_html_to_php;
use sitetool_core::runtime::{
    PathOverrides, ResolvedPaths, inspect_runtime, normalize_for_display, resolve_paths,
};

#[derive(Debug, Parser)]
#[command(
    name = "sitetool",
    version,
    about = "Post-process a mirrored site tree: normalize, rename, and factor shared blocks into includes"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    site_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(
        long,
        short = 'v',
        global = true,
        help = "Print per-occurrence records and resolved-path diagnostics"
    )]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    site_root: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            site_root: cli.site_root.clone(),
            config: cli.config.clone(),
            verbose: cli.verbose,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show the resolved runtime and page-file counts")]
    Status,
    #[command(about = "Factor duplicated blocks into includes/ and rewrite pages")]
    Refactor(RefactorArgs),
    #[command(about = "Root relative links and drop legacy double extensions")]
    Normalize(NormalizeArgs),
    #[command(name = "fix-queries", about = "Clean @-suffixed file names and references")]
    FixQueries,
    #[command(about = "Rename .html pages to .php and update references")]
    Rename,
    #[command(about = "Re-indent page markup")]
    Prettify,
    #[command(about = "Scan lazy-load attributes for extra resource URLs")]
    Attrs(AttrsArgs),
}

#[derive(Debug, Args)]
struct RefactorArgs {
    #[arg(long, value_name = "CHARS", help = "Minimum block size in characters")]
    min_block_size: Option<usize>,
    #[arg(long, value_name = "RATIO", help = "Similarity threshold in [0, 1]")]
    similarity_threshold: Option<f64>,
    #[arg(long, value_name = "N", help = "Minimum occurrences for extraction")]
    min_occurrences: Option<usize>,
    #[arg(long, help = "Print the full report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    #[arg(long, value_name = "URL", help = "Site domain used to relativize absolute URLs")]
    domain: Option<String>,
}

#[derive(Debug, Args)]
struct AttrsArgs {
    #[arg(long, value_name = "URL", help = "Site domain used to absolutize discovered URLs")]
    domain: Option<String>,
    #[arg(
        long,
        value_name = "NAMES",
        help = "Comma-separated attribute names to scan"
    )]
    attrs: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Refactor(args)) => run_refactor_command(&runtime, args),
        Some(Commands::Normalize(args)) => run_normalize(&runtime, args),
        Some(Commands::FixQueries) => run_fix_queries(&runtime),
        Some(Commands::Rename) => run_rename(&runtime),
        Some(Commands::Prettify) => run_prettify(&runtime),
        Some(Commands::Attrs(args)) => run_attrs(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = resolve_runtime(runtime)?;
    let status = inspect_runtime(&paths);
    let stats = scan_stats(&paths.site_root, &config.page_extensions())?;

    println!("runtime status");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("site_root_exists: {}", format_flag(status.site_root_exists));
    println!("includes_exists: {}", format_flag(status.includes_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "domain: {}",
        config.domain().as_deref().unwrap_or("<unset>")
    );
    println!("page_extensions: {}", config.page_extensions().join(","));
    println!("refactor.min_block_size: {}", config.min_block_size());
    println!(
        "refactor.similarity_threshold: {}",
        config.similarity_threshold()
    );
    println!("refactor.min_occurrences: {}", config.min_occurrences());
    println!("scan.total_files: {}", stats.total_files);
    println!("scan.total_bytes: {}", stats.total_bytes);
    for (extension, count) in &stats.by_extension {
        println!("scan.extension.{extension}: {count}");
    }
    print_warnings(&status.warnings);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_refactor_command(runtime: &RuntimeOptions, args: RefactorArgs) -> Result<()> {
    let (paths, config) = resolve_runtime(runtime)?;
    let options = RefactorOptions {
        min_block_size: args.min_block_size.unwrap_or_else(|| config.min_block_size()),
        similarity_threshold: args
            .similarity_threshold
            .unwrap_or_else(|| config.similarity_threshold()),
        min_occurrences: args
            .min_occurrences
            .unwrap_or_else(|| config.min_occurrences()),
        page_extensions: config.page_extensions(),
    };

    let report = run_refactor(&paths.site_root, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("refactor");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("min_block_size: {}", options.min_block_size);
    println!("similarity_threshold: {}", options.similarity_threshold);
    println!("min_occurrences: {}", options.min_occurrences);
    println!("files_scanned: {}", report.files_scanned);
    println!("blocks_extracted: {}", report.blocks_extracted);
    println!("clusters_retained: {}", report.clusters_retained);
    println!("replacements: {}", report.replacements);
    for artifact in &report.artifacts {
        println!("artifact.{}: {}", artifact.cluster_id, artifact.relative_path);
    }
    if runtime.verbose {
        print_records(&report);
    }
    print_warnings(&report.warnings);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_normalize(runtime: &RuntimeOptions, args: NormalizeArgs) -> Result<()> {
    let (paths, config) = resolve_runtime(runtime)?;
    let domain = args.domain.or_else(|| config.domain());

    let report = normalize_tree(&paths.site_root, domain.as_deref())?;

    println!("normalize");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("domain: {}", domain.as_deref().unwrap_or("<unset>"));
    println!("renamed_files: {}", report.renamed_files);
    println!("updated_files: {}", report.updated_files);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_fix_queries(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, _config) = resolve_runtime(runtime)?;
    let report = fix_query_strings(&paths.site_root)?;

    println!("fix-queries");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("renamed_files: {}", report.renamed_files);
    println!("deleted_files: {}", report.deleted_files);
    println!("updated_files: {}", report.updated_files);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_rename(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, _config) = resolve_runtime(runtime)?;
    let report = rename_html_to_php(&paths.site_root)?;

    println!("rename");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("renamed_files: {}", report.renamed_files);
    println!("updated_files: {}", report.updated_files);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_prettify(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, _config) = resolve_runtime(runtime)?;
    let report = prettify_tree(&paths.site_root)?;

    println!("prettify");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("processed_files: {}", report.processed_files);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_attrs(runtime: &RuntimeOptions, args: AttrsArgs) -> Result<()> {
    let (paths, config) = resolve_runtime(runtime)?;
    let Some(domain) = args.domain.or_else(|| config.domain()) else {
        bail!(
            "attrs needs a site domain; pass --domain or set [site].domain in {}",
            normalize_for_display(&paths.config_path)
        );
    };
    let attr_names: Vec<String> = args
        .attrs
        .unwrap_or_else(|| config.resource_attrs())
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let report = scan_resource_attrs(&paths.site_root, &domain, &attr_names)?;

    println!("attrs");
    println!("site_root: {}", normalize_for_display(&paths.site_root));
    println!("domain: {domain}");
    println!("attrs: {}", attr_names.join(","));
    println!("inspected_files: {}", report.inspected_files);
    println!("updated_files: {}", report.updated_files);
    println!("discovered_urls.count: {}", report.discovered_urls.len());
    for url in &report.discovered_urls {
        println!("discovered_urls.url: {url}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn print_records(report: &RefactorReport) {
    println!("records:");
    for record in &report.records {
        println!(
            "  - cluster: {} file: {} tier: {}",
            record.cluster_id,
            record.relative_path,
            record
                .tier
                .map(|tier| tier.as_str())
                .unwrap_or("<unresolved>")
        );
    }
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("warnings:");
    for warning in warnings {
        println!("  - {warning}");
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.verbose {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, SiteConfig)> {
    dotenvy::dotenv().ok();

    let overrides = PathOverrides {
        site_root: runtime.site_root.clone(),
        config: runtime.config.clone(),
    };
    let paths = resolve_paths(&overrides)?;
    let site_env = paths.site_root.join(".env");
    if site_env.exists() {
        let _ = dotenvy::from_path_override(&site_env);
    }
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
