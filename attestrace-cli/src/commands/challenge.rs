//! Challenge command implementation.

use anyhow::{bail, Context, Result};
use attestrace_core::{ChallengeGenerator, ServerSecret};
use colored::Colorize;
use tracing::info;

/// Execute the challenge command.
pub fn execute(key_id: &str, secret: String, quiet: bool) -> Result<()> {
    if secret.is_empty() {
        bail!("Invalid argument: secret must not be empty");
    }
    let generator = ChallengeGenerator::new(ServerSecret::new(secret));
    let challenge = generator
        .generate_challenge(key_id)
        .context("Challenge generation failed")?;

    info!(key_id_len = key_id.len(), "Challenge derived");

    if quiet {
        println!("{}", challenge.as_base64());
    } else {
        println!();
        println!("   {} {}", "Key ID:".dimmed(), key_id);
        println!("   {} {}", "Challenge:".dimmed(), challenge.as_base64().green().bold());
    }
    Ok(())
}
