use calsample::context::CancellationToken;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::process;
use tracing::{error, warn, Level};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about = "Optimal calibrated sampling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Search(cmd::search::SearchArgs),
    Validate(cmd::validate::ValidateArgs),
}

/// First Ctrl-C asks the search to wind down, the second one aborts.
fn install_interrupt_handler(token: &CancellationToken) {
    let token = token.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            eprintln!("[BREAK]");
            process::exit(1);
        }
        eprintln!("🛑 Interrupt received, stopping after the current node (Ctrl-C again to abort)");
        token.cancel();
    });
    if let Err(e) = installed {
        warn!("⚠️  Could not install the interrupt handler: {}", e);
    }
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let token = CancellationToken::new();
    install_interrupt_handler(&token);

    let sub_matches = matches
        .subcommand()
        .map(|(_, m)| m.clone())
        .unwrap_or_else(ArgMatches::default);

    let result = match &cli.command {
        Commands::Search(args) => cmd::search::run(args, &sub_matches, token),
        Commands::Validate(args) => cmd::validate::run(args),
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        process::exit(1);
    }
}
