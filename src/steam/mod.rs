//! Steam Web API collaborator
//!
//! The rest of the system depends only on the shapes in this module,
//! not on the transport; `SteamClient` is the shipped reqwest
//! implementation.

mod error;
mod rest;

pub use error::SteamError;
pub use rest::SteamClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::db::{Achievement, Game};

/// Candidate returned by store search.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub id: i64,
    pub name: String,
    pub icon_url: Option<String>,
}

/// Entry from the owned-games listing.
#[derive(Debug, Clone)]
pub struct OwnedGame {
    pub id: i64,
    pub name: String,
}

/// Per-user unlock status for one achievement.
#[derive(Debug, Clone, Copy)]
pub struct PlayerUnlock {
    pub unlocked: bool,
    pub unlock_time: Option<DateTime<Utc>>,
}

/// Remote catalog and achievement source.
#[async_trait]
pub trait SteamApi: Send + Sync {
    /// Search the store by name; first candidate, if any.
    async fn resolve_game(&self, name: &str) -> Result<Option<GameInfo>>;

    /// Achievement schema (names, descriptions, icons, hidden flags)
    /// for a game.
    async fn achievement_schema(&self, game_id: i64) -> Result<Vec<Achievement>>;

    /// Global unlock percentage per achievement id.
    async fn global_percentages(&self, game_id: i64) -> Result<HashMap<String, f64>>;

    /// Per-user unlock status per achievement id.
    async fn player_achievements(
        &self,
        game_id: i64,
        steam_id: &str,
    ) -> Result<HashMap<String, PlayerUnlock>>;

    /// Games owned by the account.
    async fn owned_games(&self, steam_id: &str) -> Result<Vec<OwnedGame>>;
}

/// Assemble a full `Game` for the library: schema merged with global
/// percentages and, when a user is signed in, their unlock status.
pub async fn fetch_game(
    api: &dyn SteamApi,
    info: &GameInfo,
    steam_id: Option<&str>,
) -> Result<Game> {
    let mut achievements = api.achievement_schema(info.id).await?;

    // Percentages are merged best-effort; a failed fetch only costs
    // metadata for this cycle.
    match api.global_percentages(info.id).await {
        Ok(percentages) => {
            for a in &mut achievements {
                a.global_percentage = percentages.get(&a.id).copied();
            }
        }
        Err(e) => tracing::warn!("Global percentages unavailable for {}: {e:#}", info.id),
    }

    if let Some(steam_id) = steam_id {
        match api.player_achievements(info.id, steam_id).await {
            Ok(status) => {
                for a in &mut achievements {
                    if let Some(s) = status.get(&a.id) {
                        a.is_unlocked = s.unlocked;
                        // Keep the flag/timestamp pairing invariant even
                        // when the API omits the unlock time.
                        a.unlock_date = if s.unlocked {
                            s.unlock_time.or_else(|| Some(Utc::now()))
                        } else {
                            None
                        };
                    }
                }
            }
            Err(e) => tracing::warn!("Player status unavailable for {}: {e:#}", info.id),
        }
    }

    let mut game = Game::new(info.id, info.name.clone());
    game.icon_url = info.icon_url.clone();
    game.achievements = achievements;
    Ok(game)
}
