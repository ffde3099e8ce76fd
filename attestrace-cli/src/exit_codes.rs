//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use attestrace_core::{TraceError, TrustRootError, VerifyError};

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (attestation rejected, invalid trace).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = if err.downcast_ref::<VerifyError>().is_some()
            || err.downcast_ref::<TraceError>().is_some()
        {
            VERIFICATION_FAILED
        } else if err.downcast_ref::<TrustRootError>().is_some() {
            USAGE_ERROR
        } else if message.contains("Failed to read") {
            INPUT_ERROR
        } else if message.contains("Failed to write") {
            IO_ERROR
        } else if message.contains("Invalid argument") {
            USAGE_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classifies_typed_errors() {
        let err = anyhow::Error::new(TraceError::EmptyMessages);
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);

        let err = anyhow::Error::new(TrustRootError::NotCa).context("Invalid trust root");
        assert_eq!(ExitCode::from_anyhow(&err).code, USAGE_ERROR);
    }

    #[test]
    fn test_classifies_io_messages() {
        let read: anyhow::Result<()> = Err(std::io::Error::other("gone"))
            .context("Failed to read trace file: t.json");
        assert_eq!(ExitCode::from_anyhow(&read.unwrap_err()).code, INPUT_ERROR);

        let write: anyhow::Result<()> =
            Err(std::io::Error::other("full")).context("Failed to write output: out.html");
        assert_eq!(ExitCode::from_anyhow(&write.unwrap_err()).code, IO_ERROR);

        let other = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::from_anyhow(&other).code, GENERAL_ERROR);
    }
}
