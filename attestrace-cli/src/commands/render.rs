//! Render command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use attestrace_core::{ConversationTrace, ShareTemplate};
use colored::Colorize;
use tracing::info;

use crate::utils::read_input;

/// Execute the render command.
pub fn execute(
    trace_path: PathBuf,
    template: Option<PathBuf>,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let raw = read_input(&trace_path, "trace file")?;
    let raw = String::from_utf8(raw).context("Trace file is not UTF-8")?;
    let trace = ConversationTrace::from_json(&raw)?;

    let template = match template {
        Some(path) => {
            let source = read_input(&path, "template")?;
            ShareTemplate::new(String::from_utf8_lossy(&source).into_owned())
        }
        None => ShareTemplate::builtin(),
    };

    let json = trace.to_json()?;
    let html = template.render(&json);

    match output {
        Some(path) => {
            std::fs::write(&path, &html)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!(path = %path.display(), bytes = html.len(), "Wrote share page");

            if !quiet {
                println!();
                println!("   {} {}", "Trace:".dimmed(), trace.id);
                println!("   {} {}", "Messages:".dimmed(), trace.messages.len());
                println!("   {} {}", "Log key:".dimmed(), trace.log_key("logs"));
                println!("   {} {}", "Share key:".dimmed(), trace.share_key("share"));
                println!("   {} {}", "Written:".dimmed(), path.display().to_string().green());
            }
        }
        None => print!("{}", html),
    }
    Ok(())
}
