//! Subcommand implementations

pub mod bundle;
pub mod latest;
pub mod prepare;
pub mod publish;
pub mod upload;
