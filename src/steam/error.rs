//! Typed errors for the Steam Web API boundary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SteamError {
    /// Configuration error; fatal at the boundary that needs the key.
    #[error("Steam Web API key is not configured; set steam_api_key in config.toml")]
    MissingApiKey,

    /// The profile refuses per-user achievement status.
    #[error("Steam profile is private; per-user achievement status is unavailable")]
    PrivateProfile,
}
