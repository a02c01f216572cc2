//! Steam Web API client

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{GameInfo, OwnedGame, PlayerUnlock, SteamApi, SteamError};
use crate::db::Achievement;

const STORE_SEARCH_URL: &str = "https://store.steampowered.com/api/storesearch/";
const API_BASE: &str = "https://api.steampowered.com";
const CDN_BASE: &str = "https://cdn.cloudflare.steamstatic.com/steam/apps";

/// Reqwest-backed implementation of [`SteamApi`].
#[derive(Clone)]
pub struct SteamClient {
    client: Arc<reqwest::Client>,
    api_key: String,
}

impl SteamClient {
    /// Build a client. Fails fast when the key is absent so the
    /// configuration error is reported once, at the boundary.
    pub fn new(api_key: Option<&str>) -> Result<Self> {
        let api_key = api_key.map(str::trim).unwrap_or_default();
        if api_key.is_empty() {
            return Err(SteamError::MissingApiKey.into());
        }

        let client = reqwest::Client::builder()
            .user_agent("trophycase/0.1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: Arc::new(client),
            api_key: api_key.to_string(),
        })
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> reqwest::RequestBuilder {
        self.client.get(url).query(query)
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .get(url, query)
            .send()
            .await
            .context("Failed to send request")?;
        let response = response
            .error_for_status()
            .context("Steam API returned an error status")?;
        response.json().await.context("Invalid JSON from Steam API")
    }

    /// Library capsule art, kept only when the CDN actually has it.
    async fn validate_icon(&self, game_id: i64) -> Option<String> {
        let url = format!("{CDN_BASE}/{game_id}/library_600x900.jpg");
        match self.client.head(&url).send().await {
            Ok(r) if r.status().is_success() => Some(url),
            _ => None,
        }
    }
}

#[async_trait]
impl SteamApi for SteamClient {
    async fn resolve_game(&self, name: &str) -> Result<Option<GameInfo>> {
        let doc = self
            .get_json(STORE_SEARCH_URL, &[("term", name), ("cc", "us"), ("l", "en")])
            .await?;

        let Some(first) = doc
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };

        let id = first
            .get("id")
            .and_then(Value::as_i64)
            .context("Store result missing id")?;
        let name = first
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Name")
            .to_string();

        Ok(Some(GameInfo {
            id,
            name,
            icon_url: self.validate_icon(id).await,
        }))
    }

    async fn achievement_schema(&self, game_id: i64) -> Result<Vec<Achievement>> {
        let url = format!("{API_BASE}/ISteamUserStats/GetSchemaForGame/v2/");
        let appid = game_id.to_string();
        let doc = self
            .get_json(
                &url,
                &[("key", self.api_key.as_str()), ("appid", appid.as_str())],
            )
            .await?;

        let Some(entries) = doc
            .pointer("/game/availableGameStats/achievements")
            .and_then(Value::as_array)
        else {
            // Games without achievements return an empty stats block.
            return Ok(Vec::new());
        };

        let mut achievements = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(id) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let mut a = Achievement::new(
                id,
                entry
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or(id),
            );
            a.description = entry
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            a.icon = entry.get("icon").and_then(Value::as_str).map(str::to_string);
            a.gray_icon = entry
                .get("icongray")
                .and_then(Value::as_str)
                .map(str::to_string);
            a.is_hidden = entry.get("hidden").and_then(Value::as_i64) == Some(1);
            achievements.push(a);
        }
        Ok(achievements)
    }

    async fn global_percentages(&self, game_id: i64) -> Result<HashMap<String, f64>> {
        let url = format!("{API_BASE}/ISteamUserStats/GetGlobalAchievementPercentagesForApp/v2/");
        let gameid = game_id.to_string();
        let doc = self
            .get_json(&url, &[("gameid", gameid.as_str())])
            .await?;

        let mut out = HashMap::new();
        if let Some(entries) = doc
            .pointer("/achievementpercentages/achievements")
            .and_then(Value::as_array)
        {
            for entry in entries {
                let Some(name) = entry.get("name").and_then(Value::as_str) else {
                    continue;
                };
                // Steam serves percent as either number or string.
                let percent = match entry.get("percent") {
                    Some(Value::Number(n)) => n.as_f64(),
                    Some(Value::String(s)) => s.parse().ok(),
                    _ => None,
                };
                if let Some(percent) = percent {
                    out.insert(name.to_string(), percent);
                }
            }
        }
        Ok(out)
    }

    async fn player_achievements(
        &self,
        game_id: i64,
        steam_id: &str,
    ) -> Result<HashMap<String, PlayerUnlock>> {
        let url = format!("{API_BASE}/ISteamUserStats/GetPlayerAchievements/v1/");
        let appid = game_id.to_string();
        let doc = self
            .get_json(
                &url,
                &[
                    ("key", self.api_key.as_str()),
                    ("steamid", steam_id),
                    ("appid", appid.as_str()),
                ],
            )
            .await?;

        let stats = doc.get("playerstats").cloned().unwrap_or(Value::Null);
        if stats.get("success").and_then(Value::as_bool) == Some(false) {
            let message = stats.get("error").and_then(Value::as_str).unwrap_or("");
            if message.contains("Profile is not public") {
                return Err(SteamError::PrivateProfile.into());
            }
            anyhow::bail!("Steam rejected the player achievements request: {message}");
        }

        let mut out = HashMap::new();
        if let Some(entries) = stats.get("achievements").and_then(Value::as_array) {
            for entry in entries {
                let Some(api_name) = entry.get("apiname").and_then(Value::as_str) else {
                    continue;
                };
                let unlocked = entry.get("achieved").and_then(Value::as_i64) == Some(1);
                let unlock_time = entry
                    .get("unlocktime")
                    .and_then(Value::as_i64)
                    .filter(|&t| unlocked && t > 0)
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0));
                out.insert(
                    api_name.to_string(),
                    PlayerUnlock {
                        unlocked,
                        unlock_time,
                    },
                );
            }
        }
        Ok(out)
    }

    async fn owned_games(&self, steam_id: &str) -> Result<Vec<OwnedGame>> {
        let url = format!("{API_BASE}/IPlayerService/GetOwnedGames/v0001/");
        let doc = self
            .get_json(
                &url,
                &[
                    ("key", self.api_key.as_str()),
                    ("steamid", steam_id),
                    ("include_appinfo", "true"),
                    ("format", "json"),
                ],
            )
            .await?;

        let mut out = Vec::new();
        if let Some(entries) = doc.pointer("/response/games").and_then(Value::as_array) {
            for entry in entries {
                let (Some(id), Some(name)) = (
                    entry.get("appid").and_then(Value::as_i64),
                    entry.get("name").and_then(Value::as_str),
                ) else {
                    continue;
                };
                out.push(OwnedGame {
                    id,
                    name: name.to_string(),
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_fatal_at_construction() {
        assert!(SteamClient::new(None).is_err());
        assert!(SteamClient::new(Some("   ")).is_err());
        assert!(SteamClient::new(Some("ABCDEF0123456789")).is_ok());
    }

    #[test]
    fn test_query_parameters_round_trip_through_the_builder() {
        let client = SteamClient::new(Some("ABCDEF0123456789")).unwrap();
        let request = client
            .get(STORE_SEARCH_URL, &[("term", "Half-Life 2: R&D"), ("cc", "us")])
            .build()
            .unwrap();
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("term".to_string(), "Half-Life 2: R&D".to_string())));
        assert!(pairs.contains(&("cc".to_string(), "us".to_string())));
    }
}
