//! Verify command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use attestrace_core::{
    AttestationVerifier, ChallengeGenerator, DeploymentTier, ServerSecret, TrustRoot,
};
use colored::Colorize;
use tracing::{error, info};

use crate::utils::{attestation_base64, format_timestamp, read_input, resolve_time};

/// Arguments for an offline verification.
pub struct VerifyArgs {
    pub key_id: String,
    pub attestation: PathBuf,
    pub root: PathBuf,
    pub app_id: String,
    pub secret: String,
    pub tier: String,
    pub at: Option<i64>,
}

/// Execute the verify command.
pub fn execute(args: VerifyArgs, quiet: bool) -> Result<()> {
    let at = resolve_time(args.at)?;
    let tier = DeploymentTier::from_config_value(&args.tier);

    let root_bytes = read_input(&args.root, "trust root")?;
    let trust_root = TrustRoot::from_bytes(&root_bytes).context("Invalid trust root")?;
    info!(
        subject = %trust_root.subject(),
        fingerprint = %trust_root.fingerprint(),
        "Loaded trust root"
    );

    let attestation = read_input(&args.attestation, "attestation")?;
    let attestation = attestation_base64(&attestation);

    let verifier = AttestationVerifier::new(
        ChallengeGenerator::new(ServerSecret::new(args.secret)),
        args.app_id.as_str(),
        tier,
        Arc::new(trust_root),
    );

    match verifier.verify_at(&args.key_id, &attestation, at) {
        Ok(()) => {
            info!(%tier, "Attestation verified");
            if !quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".green());
                println!(
                    "{}",
                    "║              ATTESTED                  ║".green().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".green());
                println!();
                println!("   {} {}", "App ID:".dimmed(), args.app_id);
                println!("   {} {}", "Tier:".dimmed(), tier);
                println!("   {} {}", "Checked at:".dimmed(), format_timestamp(at));
            }
            Ok(())
        }
        Err(e) => {
            if e.is_parse_failure() {
                error!(error = %e, "Error while parsing attestation object");
            } else {
                error!(error = %e, "Error verifying attestation");
            }

            if !quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".red());
                println!(
                    "{}",
                    "║              REJECTED                  ║".red().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".red());
                println!();
                println!("   {} {}", "Reason:".dimmed(), e.to_string().red());
            }
            Err(e).context("Attestation verification failed")
        }
    }
}
