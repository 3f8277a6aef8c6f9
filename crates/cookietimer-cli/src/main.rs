use clap::{Parser, Subcommand};
use cookietimer_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "cookietimer", version, about = "Cookie Timer: named kitchen countdowns")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Timers(commands::timers::TimerAction),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Background timer service
    Service {
        #[command(subcommand)]
        action: commands::service::ServiceAction,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_env("COOKIETIMER_LOG").unwrap_or_else(|_| {
        EnvFilter::try_new(Config::load_or_default().logging.level)
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Timers(action) => commands::timers::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Service { action } => commands::service::run(action),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
