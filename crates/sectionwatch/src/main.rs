use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use sectionwatch_core::config::{WatchConfig, load_config};
use sectionwatch_core::mediawiki::{MediaWikiClient, MediaWikiClientConfig, Publisher};
use sectionwatch_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, normalize_for_display,
    resolve_paths,
};
use sectionwatch_core::watch::{
    Delivery, WatchOptions, inspect_state, rebuild_report, reset_checkpoints, run_watch,
};

#[derive(Debug, Parser)]
#[command(
    name = "sectionwatch",
    version,
    about = "Watch a wiki category for section changes and publish a prioritized report"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .sectionwatch/ with a default config")]
    Init(InitArgs),
    #[command(about = "Scan the category, build the report and publish it")]
    Scan(ScanArgs),
    #[command(about = "Show checkpoint and pending-record counts")]
    Status,
    #[command(about = "Forget every checkpoint")]
    Reset(ResetArgs),
    #[command(about = "Rebuild the local report from pending records without scanning")]
    Report,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(short = 'c', long, value_name = "NAME", help = "Category to scan")]
    category: Option<String>,
    #[arg(long, help = "Write the local report but do not publish it")]
    dry_run: bool,
    #[arg(long, value_name = "N", help = "Number of concurrent page workers")]
    max_parallelism: Option<usize>,
    #[arg(long, value_name = "DAYS", help = "Oldest checkpoint for unseen pages")]
    oldest_days: Option<i64>,
    #[arg(long, value_name = "TITLE", help = "Wiki page the report is published to")]
    report_page: Option<String>,
}

#[derive(Debug, Args)]
struct ResetArgs {
    #[arg(long, help = "Confirm the reset")]
    yes: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);
    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Scan(args)) => run_scan(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Reset(args)) => run_reset(&runtime, args),
        Some(Commands::Report) => run_report(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;
    println!("Initialized sectionwatch runtime layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_scan(runtime: &RuntimeOptions, args: ScanArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let options = scan_options(&config, &args);

    let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
    let publishing = !options.dry_run && options.report_page.is_some();
    if publishing {
        login_bot(&client)?;
    }
    let publisher: Option<&dyn Publisher> = if publishing { Some(&client) } else { None };

    let outcome = run_watch(&paths, &options, &client, &client, publisher)?;
    println!("scan");
    println!("category: {}", options.scan.category);
    println!("examined: {}", outcome.summary.examined);
    println!("changed: {}", outcome.summary.changed);
    println!("skipped: {}", outcome.summary.skipped);
    println!("failed: {}", outcome.summary.failed);
    println!("restored_records: {}", outcome.restored_records);
    println!("reported_records: {}", outcome.reported_records);
    println!("report_path: {}", normalize_for_display(&outcome.report_path));
    match outcome.delivery {
        Delivery::Published { page } => println!("published: {page}"),
        Delivery::LocalOnly => println!("published: <no report page configured>"),
        Delivery::DryRun => println!("published: <dry run>"),
    }
    println!("api_requests: {}", client.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn scan_options(config: &WatchConfig, args: &ScanArgs) -> WatchOptions {
    let mut options = WatchOptions::from_config(config);
    if let Some(category) = args.category.as_deref() {
        options.scan.category = category.to_string();
    }
    if let Some(workers) = args.max_parallelism {
        options.scan.max_parallelism = workers;
    }
    if let Some(days) = args.oldest_days {
        options.oldest_days = days;
    }
    if let Some(page) = args.report_page.as_deref().map(str::trim) {
        options.report_page = (!page.is_empty()).then(|| page.to_string());
    }
    options.dry_run = args.dry_run;
    options
}

fn login_bot(client: &MediaWikiClient) -> Result<()> {
    let username = env::var("WIKI_BOT_USER").unwrap_or_default();
    let password = env::var("WIKI_BOT_PASS").unwrap_or_default();
    if username.trim().is_empty() || password.is_empty() {
        bail!("WIKI_BOT_USER and WIKI_BOT_PASS are required to publish (or pass --dry-run)");
    }
    client.login(username.trim(), &password)
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let state = inspect_state(&paths, &config);
    println!("status");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("category: {}", config.watch.category);
    println!("checkpoints: {}", state.checkpoints);
    println!("pending_records: {}", state.pending_records);
    println!(
        "report_page: {}",
        config.report_page().unwrap_or("<none>")
    );
    println!(
        "last_report: {}",
        if paths.report_path.exists() {
            normalize_for_display(&paths.report_path)
        } else {
            "<none>".to_string()
        }
    );
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_reset(runtime: &RuntimeOptions, args: ResetArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    if !args.yes {
        bail!(
            "refusing to reset {} without --yes",
            normalize_for_display(&paths.checkpoint_path)
        );
    }
    let config = load_config(&paths.config_path)?;
    let dropped = reset_checkpoints(&paths, &config)?;
    println!("reset");
    println!("checkpoints_dropped: {dropped}");
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_report(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let (_, records) = rebuild_report(&paths, &config, Utc::now())?;
    println!("report");
    println!("records: {records}");
    println!("report_path: {}", normalize_for_display(&paths.report_path));
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}
