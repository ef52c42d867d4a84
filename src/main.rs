// ABOUTME: CLI entry point for sqlite-json-repair
// ABOUTME: Parses arguments, builds the repair configuration and runs the repair

use clap::Parser;
use sqlite_json_repair::commands;
use sqlite_json_repair::config::RepairConfig;

#[derive(Parser)]
#[command(name = "sqlite-json-repair", version)]
#[command(
    about = "Repair a SQLite database whose JSON columns were serialized more than once",
    long_about = None
)]
struct Cli {
    /// The input sqlite file to fix
    #[arg(short, long)]
    input: String,
    /// The output sqlite file (must not exist yet)
    #[arg(short, long)]
    output: String,
    /// Check the integrity of the output against the input
    #[arg(short = 'c', long)]
    check_integrity: bool,
    /// Report every integrity issue instead of stopping at the first one
    #[arg(long, requires = "check_integrity")]
    keep_going: bool,
    /// Column holding the JSON values to unwrap (default: json)
    #[arg(long)]
    json_column: Option<String>,
    /// Column identifying rows for the integrity check (default: ID)
    #[arg(long)]
    key_column: Option<String>,
    /// How long the output database waits on a locked file (default: 60)
    #[arg(long)]
    busy_timeout_secs: Option<u64>,
    /// TOML file with column names and per-table overrides
    #[arg(long)]
    config: Option<String>,
    /// Do not draw progress bars
    #[arg(long)]
    no_progress: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Usage errors exit with 1 like every other failure; help and version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            e.print()?;
            std::process::exit(code);
        }
    };

    let mut config = match cli.config {
        Some(ref path) => RepairConfig::load_from_file(path)?,
        None => RepairConfig::default(),
    };
    if let Some(column) = cli.json_column {
        config = config.with_json_column(column)?;
    }
    if let Some(column) = cli.key_column {
        config = config.with_key_column(column)?;
    }
    if let Some(secs) = cli.busy_timeout_secs {
        config = config.with_busy_timeout_secs(secs);
    }
    let config = config
        .with_check_integrity(cli.check_integrity)
        .with_keep_going(cli.keep_going)
        .with_progress(!cli.no_progress);

    commands::repair(&cli.input, &cli.output, &config)?;

    Ok(())
}
