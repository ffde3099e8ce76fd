//! Attestrace CLI - App Attest challenges, offline verification and share pages.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Verification failed or invalid trace
  66  Cannot read input file
  74  Cannot write output file";

#[derive(Parser)]
#[command(name = "attestrace")]
#[command(author, version, about = "Attested conversation trace tooling", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Only print the result, no decoration
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the challenge a client must attest its key against
    Challenge {
        /// base64 App Attest key identifier
        #[arg(value_name = "KEY_ID")]
        key_id: String,

        /// HMAC secret shared with the server
        #[arg(long, env = "HMAC_SHA_KEY", hide_env_values = true)]
        secret: String,
    },

    /// Verify an App Attest attestation object offline
    Verify {
        /// base64 App Attest key identifier
        #[arg(long, value_name = "KEY_ID")]
        key_id: String,

        /// Attestation object file (base64 text or raw CBOR)
        #[arg(long, value_name = "FILE")]
        attestation: PathBuf,

        /// Trust root certificate (PEM or DER)
        #[arg(long, value_name = "FILE")]
        root: PathBuf,

        /// `<TeamID>.<bundle id>` the key must belong to
        #[arg(long, env = "APP_ID")]
        app_id: String,

        /// HMAC secret the challenge was derived with
        #[arg(long, env = "HMAC_SHA_KEY", hide_env_values = true)]
        secret: String,

        /// Deployment tier: production, development or test
        #[arg(long, env = "ENV", default_value = "production")]
        tier: String,

        /// Verification time as Unix seconds (defaults to now)
        #[arg(long, value_name = "UNIX_SECS")]
        at: Option<i64>,
    },

    /// Validate a trace JSON file and render its share page
    Render {
        /// Trace JSON file
        #[arg(value_name = "TRACE_JSON")]
        trace: PathBuf,

        /// Share-page template (defaults to the built-in one)
        #[arg(short, long, value_name = "FILE")]
        template: Option<PathBuf>,

        /// Output HTML file (defaults to stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Challenge { key_id, secret } => {
            commands::challenge::execute(&key_id, secret, cli.quiet)
        }
        Commands::Verify {
            key_id,
            attestation,
            root,
            app_id,
            secret,
            tier,
            at,
        } => commands::verify::execute(
            commands::verify::VerifyArgs {
                key_id,
                attestation,
                root,
                app_id,
                secret,
                tier,
                at,
            },
            cli.quiet,
        ),
        Commands::Render {
            trace,
            template,
            output,
        } => commands::render::execute(trace, template, output, cli.quiet),
    };

    if let Err(err) = result {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
