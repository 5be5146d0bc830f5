//! `florandei` command line entry point.
//!
//! # Responsibility
//! - Parse arguments and resolve configuration (defaults < file < env < flags).
//! - Bootstrap logging and the database, then hand off to a command.

mod commands;

use clap::{Args, Parser, Subcommand};
use florandei_core::config::{DATA_DIR_ENV, LOG_LEVEL_ENV};
use florandei_core::{
    init_logging, open_db, AppConfig, ConfigError, RegistroService, SettingsService, SortOrder,
    SqliteRegistroRepository, SqliteSettingsRepository,
};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const WELCOME_MESSAGE: &str = "Bem-vindo ao Florandei! 🌿";
const EMPTY_JOURNAL_HINT: &str = "Run `florandei add` to record your first observation.";

/// Field journal of geo-tagged plant observations.
#[derive(Parser)]
#[command(name = "florandei", version)]
struct Cli {
    /// Config file (defaults to florandei.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the database, logs and caches
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new observation
    Add(AddArgs),
    /// Show one registro
    Show { id: String },
    /// Change an existing registro
    Edit(EditArgs),
    /// Delete a registro and its photo
    Delete { id: String },
    /// List registros, optionally filtered
    List(ListArgs),
    /// List tags in use
    Tags {
        /// Also list the suggested tags
        #[arg(long, action)]
        suggested: bool,
    },
    /// Journal statistics
    Stats {
        #[arg(long, action)]
        json: bool,
    },
    /// Write a JSON backup of every registro
    Export {
        /// Defaults to florandei-backup-YYYY-MM-DD.json in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore registros from a JSON backup
    Import { file: PathBuf },
    /// Delete every registro
    Clear {
        #[arg(long, action)]
        yes: bool,
    },
    /// Registros near a position
    Near(NearArgs),
    /// App-shell cache lifecycle
    #[command(subcommand)]
    Offline(OfflineCommand),
    /// Map tile cache
    #[command(subcommand)]
    Tiles(TilesCommand),
}

#[derive(Args)]
struct AddArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lng: Option<f64>,
    #[arg(short, long)]
    description: String,
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// Image file to attach
    #[arg(long)]
    photo: Option<PathBuf>,
}

#[derive(Args)]
struct EditArgs {
    id: String,
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lng: Option<f64>,
    #[arg(short, long)]
    description: Option<String>,
    /// Tag to add; combine with --clear-tags to replace the list
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    #[arg(long, action)]
    clear_tags: bool,
    #[arg(long, conflicts_with = "remove_photo")]
    photo: Option<PathBuf>,
    #[arg(long, action)]
    remove_photo: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Case-insensitive text searched in descriptions
    #[arg(short, long)]
    search: Option<String>,
    /// Exact tag
    #[arg(short, long)]
    tag: Option<String>,
    /// date-desc|date-asc
    #[arg(long, default_value = "date-desc")]
    sort: SortOrder,
}

#[derive(Args)]
struct NearArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    #[arg(long, allow_negative_numbers = true)]
    lng: f64,
    #[arg(long, default_value_t = 1.0)]
    radius_km: f64,
    /// Accuracy of the position in metres
    #[arg(long)]
    accuracy: Option<f64>,
}

#[derive(Subcommand)]
enum OfflineCommand {
    /// Precache the app shell
    Install,
    /// Delete stale caches
    Activate,
    /// Fetch a URL through the offline cache
    Fetch {
        url: String,
        /// Treat the request as a page navigation
        #[arg(long, action)]
        navigate: bool,
        /// Write the response body to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TilesCommand {
    /// Download every tile covering the map area
    Prefetch {
        /// Zoom level to fetch; repeatable
        #[arg(long = "zoom")]
        zooms: Vec<u8>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(&cli)?;
    std::fs::create_dir_all(&config.data_dir)?;
    if let Err(err) = init_logging(&config.log_level, config.log_dir()) {
        eprintln!("warning: file logging disabled: {err}");
    }
    info!(
        "event=cli_start module=cli status=ok version={}",
        florandei_core::core_version()
    );

    let mut conn = open_db(config.database_path())?;
    let first_run = SettingsService::new(SqliteSettingsRepository::new(&conn)).take_first_run();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn)?);
    if first_run {
        println!("{WELCOME_MESSAGE}");
        if service.list()?.is_empty() {
            println!("{EMPTY_JOURNAL_HINT}");
        }
    }

    commands::dispatch(cli.command, &config, &mut service)
}

/// Flags act as the highest-precedence environment overrides, so
/// `--data-dir` also steers where the implicit config file is looked up.
fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let data_dir = cli
        .data_dir
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());
    let log_level = cli.log_level.clone();

    AppConfig::load_with(cli.config.as_deref(), |key| match key {
        DATA_DIR_ENV if data_dir.is_some() => data_dir.clone(),
        LOG_LEVEL_ENV if log_level.is_some() => log_level.clone(),
        _ => std::env::var(key).ok(),
    })
}
