//! CLI command implementations.

pub mod artifact;
pub mod inbox;
pub mod init;
pub mod reminders;
pub mod workflow;

use crate::domain::models::ArtifactKind;

/// clap value parser for artifact kinds (`collection`, `pta`, `pia`, ...).
pub fn parse_kind(s: &str) -> Result<ArtifactKind, String> {
    ArtifactKind::parse(s).map_err(|e| e.to_string())
}
