//! stow - move objects between storage backends
//!
//! Objects are addressed by JSON storage descriptors whose secrets are
//! stored encrypted and decrypted just before use.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use commands::Commands;
use output::OutputConfig;

#[derive(Parser, Debug)]
#[command(name = "stow", version, about, long_about = None)]
struct Cli {
    /// Output strict JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };
    if !output::Formatter::new(output_config).colors_enabled() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let code = commands::execute(cli.command, output_config).await;
    std::process::exit(code.as_i32());
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "stow=debug,stowage_core=debug,stowage_s3=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}
