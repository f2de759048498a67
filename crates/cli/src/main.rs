use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use media_organizer_core::{
    app_paths, load_config_from, load_manifest, plan_renames, render_preview_sample,
    save_config_to, save_manifest, validate_template, AppConfig, BatchRenameExecutor,
    ConflictResolution, EventKind, LibraryFinalizer, MediaRecord, PostProcessingSummary,
    ProcessingEvent, RenamePlan, TemplateSet,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "media-organizer")]
#[command(about = "Renames and files identified movies and episodes into a media library")]
struct Cli {
    /// Config file to use instead of the one in the OS config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Batch-rename the records of a manifest as one all-or-nothing unit.
    Rename(RenameArgs),
    /// Move or copy matched records into the library layout.
    Finalize(FinalizeArgs),
    Template(TemplateArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct RenameArgs {
    /// JSON file holding an array of media records.
    #[arg(long)]
    manifest: PathBuf,
    /// Directory rendered targets are placed under.
    #[arg(long)]
    base_dir: Option<PathBuf>,
    #[arg(long)]
    movie_template: Option<String>,
    #[arg(long)]
    tv_template: Option<String>,
    #[arg(long)]
    staging_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct FinalizeArgs {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long)]
    library_root: Option<PathBuf>,
    #[arg(long, value_enum)]
    conflict: Option<ConflictArg>,
    /// Copy files instead of moving them.
    #[arg(long, default_value_t = false)]
    copy: bool,
    /// Remove source folders emptied by the run.
    #[arg(long, default_value_t = false)]
    cleanup_empty_dirs: bool,
    /// Report what would happen without touching any file.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Save the updated record paths back into the manifest.
    #[arg(long, default_value_t = false)]
    write_back: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct TemplateArgs {
    #[command(subcommand)]
    action: TemplateAction,
}

#[derive(Debug, Subcommand)]
enum TemplateAction {
    /// Validate template syntax and placeholder names.
    Check { template: String },
    /// Render a template against manifest records.
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
struct PreviewArgs {
    template: String,
    /// Records to render; two built-in sample records are used when omitted.
    #[arg(long)]
    manifest: Option<PathBuf>,
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    /// Write a config file with the default settings.
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictArg {
    Skip,
    Overwrite,
    Rename,
}

impl From<ConflictArg> for ConflictResolution {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Skip => ConflictResolution::Skip,
            ConflictArg::Overwrite => ConflictResolution::Overwrite,
            ConflictArg::Rename => ConflictResolution::Rename,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => app_paths()?.config_path,
    };

    match cli.command {
        Commands::Rename(args) => cmd_rename(&config_path, args),
        Commands::Finalize(args) => cmd_finalize(&config_path, args),
        Commands::Template(template) => match template.action {
            TemplateAction::Check { template } => cmd_template_check(&template),
            TemplateAction::Preview(args) => cmd_template_preview(args),
        },
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(&config_path),
            ConfigAction::Init { force } => cmd_config_init(&config_path, force),
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn cmd_rename(config_path: &Path, args: RenameArgs) -> Result<()> {
    let config = load_config_from(config_path)?;
    let templates = TemplateSet::new(
        args.movie_template.as_deref().unwrap_or(&config.movie_template),
        args.tv_template.as_deref().unwrap_or(&config.tv_template),
    )?;
    let records = load_manifest(&args.manifest)?;
    let mut plan = plan_renames(&records, &templates, args.base_dir.as_deref())?;

    let mut executor = BatchRenameExecutor::new();
    if let Some(dir) = args.staging_dir {
        executor = executor.with_staging_dir(dir);
    }
    if let Some(space) = executor.disk_space_info(&plan.operations) {
        if !space.is_sufficient() {
            warn!(
                required = space.required_bytes,
                available = space.available_bytes,
                "staging may run out of disk space"
            );
        }
    }

    let outcome = executor.execute(&mut plan.operations, !args.apply)?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Table => print_plan(&plan),
    }

    if outcome.dry_run {
        eprintln!("dry run: no files were changed, pass --apply to rename");
    } else {
        info!(executed = outcome.executed, unchanged = outcome.unchanged, "rename applied");
    }
    Ok(())
}

fn cmd_finalize(config_path: &Path, args: FinalizeArgs) -> Result<()> {
    let mut config = load_config_from(config_path)?;
    if let Some(root) = args.library_root {
        config.library_root = Some(root);
    }
    if let Some(conflict) = args.conflict {
        config.conflict_resolution = conflict.into();
    }
    config.copy_mode |= args.copy;
    config.cleanup_empty_dirs |= args.cleanup_empty_dirs;

    let mut records = load_manifest(&args.manifest)?;
    let finalizer = LibraryFinalizer::new(config.layout(), config.templates()?);
    let options = config.post_processing_options(args.dry_run);

    let mut on_progress = |position: usize, total: usize| {
        eprint!("\r[{position}/{total}]");
        if position == total {
            eprintln!();
        }
    };
    let mut on_event = |event: &ProcessingEvent| {
        if event.kind == EventKind::Failed {
            warn!(
                path = %event.source_path.display(),
                reason = event.message.as_deref().unwrap_or("unknown"),
                "item failed"
            );
        }
    };
    let summary = finalizer
        .process(&mut records, &options, Some(&mut on_progress), Some(&mut on_event))
        .with_context(|| format!("finalization of {} failed", args.manifest.display()))?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => print_summary(&summary),
    }

    if options.dry_run {
        eprintln!("dry run: no files were changed");
    } else if args.write_back {
        save_manifest(&args.manifest, &records)?;
        info!(path = %args.manifest.display(), "manifest updated");
    }
    Ok(())
}

fn cmd_template_check(template: &str) -> Result<()> {
    validate_template(template)?;
    println!("template ok");
    Ok(())
}

fn cmd_template_preview(args: PreviewArgs) -> Result<()> {
    let templates = TemplateSet::new(&args.template, &args.template)?;
    let records = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => vec![
            MediaRecord::movie("Inception.mkv", "Inception", 2010),
            MediaRecord::episode("test.show.s01e02.mkv", "Test Show", 1, 2),
        ],
    };

    for record in &records {
        match render_preview_sample(&templates, record, args.base_dir.as_deref()) {
            Ok(rendered) => println!("{} -> {rendered}", record.source_path.display()),
            Err(err) => println!("{} -> error: {err}", record.source_path.display()),
        }
    }
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = load_config_from(config_path)?;
    println!("config file: {}", config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }
    save_config_to(config_path, &AppConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(())
}

fn print_plan(plan: &RenamePlan) {
    println!("source -> target");
    for operation in &plan.operations {
        println!(
            "{} -> {}{}",
            operation.source_path.display(),
            operation.target_path.display(),
            if operation.executed { "" } else { " (pending)" }
        );
    }

    println!(
        "\nsummary: records={} unmatched={} planned={} unchanged={}",
        plan.stats.records, plan.stats.unmatched, plan.stats.planned, plan.stats.unchanged
    );
}

fn print_summary(summary: &PostProcessingSummary) {
    for item in summary
        .processed
        .iter()
        .chain(&summary.skipped)
        .chain(&summary.failed)
    {
        let target = item
            .target_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match &item.message {
            Some(message) => println!(
                "{:<12} {} -> {} ({message})",
                item.action.as_str(),
                item.source_path.display(),
                target
            ),
            None => println!(
                "{:<12} {} -> {}",
                item.action.as_str(),
                item.source_path.display(),
                target
            ),
        }
    }

    println!(
        "\nsummary: processed={} skipped={} failed={}",
        summary.processed.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
}
