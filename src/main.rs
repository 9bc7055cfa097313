//! Shelve - hybrid organization engine for knowledge vaults
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shelve::cli::detect::DetectOptions;
use shelve::cli::organize::{OrganizeInput, OrganizeOptions};
use shelve::cli::stats::StatsOptions;
use shelve::cli::templates::TemplatesOptions;
use shelve::cli::validate::ValidateOptions;
use shelve::cli::{
    build_unit, load_registries, parse_context, DetectCommand, OrganizeCommand, StatsCommand,
    TemplatesCommand, ValidateCommand,
};
use shelve::config::{shelve_home, Config};
use shelve::core::schema::ResponseValidator;
use shelve::error::exit_codes;
use shelve::util::read_to_string_limited;

// =============================================================================
// CLI Definition
// =============================================================================

/// Shelve - file generated content into a knowledge vault
#[derive(Parser)]
#[command(name = "shelve")]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide where a file belongs, place it and run checkpoints
    Organize {
        /// File to organize
        file: PathBuf,
        /// Filename hint (defaults to the input file's name)
        #[arg(long)]
        filename: Option<String>,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Vault root (defaults to the current directory)
        #[arg(long)]
        vault: Option<PathBuf>,
        /// Decide and check without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show type detection scores for a file
    Detect {
        /// File to score
        file: PathBuf,
        /// Filename hint (defaults to the input file's name)
        #[arg(long)]
        filename: Option<String>,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// List registered templates
    Templates {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Validate a raw model response against the decision schema
    Validate {
        /// File holding the response
        file: PathBuf,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Summarise the stats log
    Stats {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Show failure reasons and checkpoint breakdowns
        #[arg(long, short)]
        detailed: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    setup_logging();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("shelve error: {}", e);
            ExitCode::from(exit_codes::USAGE as u8)
        }
    }
}

/// Log to stderr, filtered by `SHELVE_LOG` (default `warn`).
fn setup_logging() {
    let filter = EnvFilter::try_from_env("SHELVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.shelve/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("shelve panic: {}", info);

        if let Some(home) = shelve_home() {
            let _ = std::fs::create_dir_all(&home);
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Organize {
            file,
            filename,
            context,
            vault,
            dry_run,
            json,
            quiet,
        } => {
            let options = OrganizeOptions {
                json,
                quiet,
                dry_run,
                vault,
            };
            run_organize(&file, filename, &context, &options, &cwd)
        }
        Commands::Detect {
            file,
            filename,
            context,
            json,
            quiet,
        } => run_detect(&file, filename, &context, json, quiet, &cwd),
        Commands::Templates { json, quiet } => run_templates(json, quiet, &cwd),
        Commands::Validate { file, json, quiet } => run_validate(&file, json, quiet),
        Commands::Stats {
            json,
            quiet,
            detailed,
        } => run_stats(json, quiet, detailed, &cwd),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::CHECKPOINT_FAILURE as u8)
    }
}

/// The filename hint, or the input file's own name.
fn filename_hint(file: &Path, filename: Option<String>) -> Option<String> {
    filename.or_else(|| {
        file.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    })
}

fn print_output(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

fn run_organize(
    file: &Path,
    filename: Option<String>,
    context: &[String],
    options: &OrganizeOptions,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let input = OrganizeInput {
        content: read_to_string_limited(file)?,
        filename: filename_hint(file, filename),
        context: parse_context(context)?,
    };

    let cmd = OrganizeCommand::new(Config::load(), cwd);
    let output = cmd.run(&input, options);
    print_output(&cmd.format_output(&output, options));

    if output.error.is_some() {
        return Ok(ExitCode::from(exit_codes::USAGE as u8));
    }
    Ok(success_to_exit_code(output.success))
}

fn run_detect(
    file: &Path,
    filename: Option<String>,
    context: &[String],
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let content = read_to_string_limited(file)?;
    let unit = build_unit(content, filename_hint(file, filename), &parse_context(context)?);

    let config = Config::load();
    let (templates, _) = load_registries(&config, cwd);
    let cmd = DetectCommand::new(config, templates);
    let output = cmd.run(&unit);
    print_output(&cmd.format_output(&output, &DetectOptions { json, quiet }));

    Ok(ExitCode::from(exit_codes::SUCCESS as u8))
}

fn run_templates(json: bool, quiet: bool, cwd: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = Config::load();
    let (templates, _) = load_registries(&config, cwd);
    let cmd = TemplatesCommand::new(templates);
    let output = cmd.run();
    print_output(&cmd.format_output(&output, &TemplatesOptions { json, quiet }));

    Ok(ExitCode::from(exit_codes::SUCCESS as u8))
}

fn run_validate(file: &Path, json: bool, quiet: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let raw = read_to_string_limited(file)?;
    let cmd = ValidateCommand::new(ResponseValidator::from_config(&Config::load()));
    let output = cmd.run(&raw);
    print_output(&cmd.format_output(&output, &ValidateOptions { json, quiet }));

    Ok(success_to_exit_code(output.valid))
}

fn run_stats(
    json: bool,
    quiet: bool,
    detailed: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = StatsCommand::new(cwd);
    let output = cmd.run();
    let options = StatsOptions {
        json,
        quiet,
        detailed,
    };
    print_output(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}
