//! Subcommand implementations.

pub mod challenge;
pub mod render;
pub mod verify;
