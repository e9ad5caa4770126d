// storyforge CLI - inspect and maintain user preferences without the web app

mod commands;
mod exit_codes;

use std::cell::Cell;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use storyforge_config::{Backend, StoreConfig};
use storyforge_prefs::{
    ActivityKind, DirMedium, KeyValueMedium, MemoryMedium, PlanStatus, PlanType, PlanUpdate,
    PreferencesSession, PreferencesStore, SqliteMedium,
};
use tracing_subscriber::EnvFilter;

use commands::{parse_timestamp, BetaAction, CliError};
use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "storyforge")]
#[command(about = "Inspect and maintain storyforge user preferences")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Config file (default: <config dir>/storyforge/prefs.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// User identity (email) whose preferences to operate on
    #[arg(long, short = 'u', global = true, env = "STORYFORGE_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the user's preferences
    Show {
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set one preference field
    #[command(after_help = "\
Examples:
  storyforge -u ada@example.com set theme dark
  storyforge -u ada@example.com set wordCountGoal 2500
  storyforge -u ada@example.com set customSettings '{\"editorWidth\": 72}'")]
    Set {
        /// Field name as stored (camelCase)
        key: String,

        /// JSON value; bare words are taken as strings
        value: String,
    },

    /// Change plan fields
    Plan {
        #[arg(long = "type", value_enum)]
        plan_type: Option<PlanTypeArg>,

        #[arg(long, value_enum)]
        status: Option<PlanStatusArg>,

        /// RFC 3339 start of term
        #[arg(long, value_parser = parse_timestamp)]
        start: Option<DateTime<Utc>>,

        /// RFC 3339 end of term
        #[arg(long, value_parser = parse_timestamp)]
        end: Option<DateTime<Utc>>,
    },

    /// Start a one-year professional plan now
    Upgrade,

    /// Record a login (logins within 30 minutes count once)
    Login,

    /// Mark a book or story as recently opened
    Recent {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
    },

    /// Enable, disable or check a beta feature
    Beta {
        #[arg(value_enum)]
        action: BetaArg,
        tag: String,
    },

    /// Write the record as JSON (backup)
    Export {
        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Replace the record from an exported JSON file (restore)
    Import {
        file: PathBuf,
    },

    /// Reset preferences to defaults, keeping account age and login count
    Reset,

    /// Delete the user's stored preferences
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print account age in days
    Age,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlanTypeArg {
    Freelance,
    Professional,
}

impl From<PlanTypeArg> for PlanType {
    fn from(arg: PlanTypeArg) -> Self {
        match arg {
            PlanTypeArg::Freelance => PlanType::Freelance,
            PlanTypeArg::Professional => PlanType::Professional,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PlanStatusArg {
    Active,
    Expired,
    Cancelled,
}

impl From<PlanStatusArg> for PlanStatus {
    fn from(arg: PlanStatusArg) -> Self {
        match arg {
            PlanStatusArg::Active => PlanStatus::Active,
            PlanStatusArg::Expired => PlanStatus::Expired,
            PlanStatusArg::Cancelled => PlanStatus::Cancelled,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Book,
    Story,
}

impl From<KindArg> for ActivityKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Book => ActivityKind::Book,
            KindArg::Story => ActivityKind::Story,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BetaArg {
    Enable,
    Disable,
    Check,
}

impl From<BetaArg> for BetaAction {
    fn from(arg: BetaArg) -> Self {
        match arg {
            BetaArg::Enable => BetaAction::Enable,
            BetaArg::Disable => BetaAction::Disable,
            BetaArg::Check => BetaAction::Check,
        }
    }
}

/// Log to stderr. RUST_LOG wins over the config's level.
fn init_logging(config: &StoreConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn open_medium(config: &StoreConfig) -> Result<Box<dyn KeyValueMedium>, CliError> {
    match config.backend {
        Backend::Dir => {
            let root = config.resolved_data_dir();
            log::debug!("preferences directory: {}", root.display());
            Ok(Box::new(DirMedium::new(root)))
        }
        Backend::Sqlite => {
            let path = config.sqlite_path();
            log::debug!("preferences database: {}", path.display());
            let medium = SqliteMedium::open(&path)
                .map_err(|e| CliError::storage(format!("cannot open {}: {e}", path.display())))?;
            Ok(Box::new(medium))
        }
        Backend::Memory => Ok(Box::new(MemoryMedium::new())),
    }
}

fn run(cli: Cli, config: StoreConfig) -> Result<(), CliError> {
    let medium = open_medium(&config)?;

    // Storage failures are swallowed by the store; count them so the run can
    // still end with a warning.
    let failures = Rc::new(Cell::new(0usize));
    let counter = failures.clone();
    let store = PreferencesStore::new(medium)
        .with_key_prefix(config.key_prefix.clone())
        .with_failure_hook(move |_| counter.set(counter.get() + 1));

    let mut session = PreferencesSession::new(store);
    session.set_identity(cli.user);

    let mut stdout = io::stdout().lock();
    let out = &mut stdout;
    let result = match cli.command {
        Commands::Show { json } => commands::cmd_show(&session, json, out),
        Commands::Set { key, value } => commands::cmd_set(&mut session, &key, &value),
        Commands::Plan { plan_type, status, start, end } => commands::cmd_plan(
            &mut session,
            PlanUpdate {
                plan_type: plan_type.map(Into::into),
                status: status.map(Into::into),
                start_date: start,
                end_date: end,
                features: None,
            },
        ),
        Commands::Upgrade => commands::cmd_upgrade(&mut session, out),
        Commands::Login => commands::cmd_login(&mut session, out),
        Commands::Recent { kind, id } => commands::cmd_recent(&mut session, kind.into(), &id, out),
        Commands::Beta { action, tag } => commands::cmd_beta(&mut session, action.into(), &tag, out),
        Commands::Export { output } => commands::cmd_export(&mut session, output, out),
        Commands::Import { file } => commands::cmd_import(&mut session, file),
        Commands::Reset => commands::cmd_reset(&mut session),
        Commands::Clear { yes } => commands::cmd_clear(&mut session, yes, out),
        Commands::Age => commands::cmd_age(&mut session, out),
    };

    if failures.get() > 0 && result.is_ok() {
        eprintln!(
            "warning: {} storage operation(s) failed; results may not be saved (see RUST_LOG=warn)",
            failures.get()
        );
    }
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is configured from the file, so a bad file is only reported
    // once the subscriber is up.
    let config_path = cli.config.clone().unwrap_or_else(StoreConfig::config_path);
    let (config, config_error) = match StoreConfig::try_load_from(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (StoreConfig::default(), Some(e)),
    };
    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Error loading {}: {e}; using default config", config_path.display());
    }

    match run(cli, config) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
