//! Application state and orchestration

mod actions;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{Database, Game};
use crate::steam::{SteamApi, SteamClient};
use crate::sync;

/// Startup progress, reported through an explicit callback rather than
/// a process-wide broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStatus {
    OpeningDatabase,
    LoadingLibrary,
    SyncingRemote,
    Ready,
}

/// User-facing notification collaborator. The CLI prints; a graphical
/// shell would subscribe here instead.
pub trait Notifier: Send {
    fn achievement_unlocked(&self, game: &Game, achievement: &crate::db::Achievement);
}

/// Main application struct that ties the store, the reconciliation
/// engine and the watcher together.
pub struct App {
    pub config: Config,

    /// Database handle. Published only after migrations completed in
    /// `Database::open`.
    pub db: Arc<Database>,

    /// Loaded library, achievements attached.
    pub games: Vec<Game>,
}

impl App {
    /// Open the database, run migrations and load the library,
    /// reporting progress through the callback.
    pub fn load(config: Config, progress: impl FnMut(LoadingStatus)) -> Result<Self> {
        let db_file = config.paths.database_file();
        Self::load_from(config, &db_file, progress)
    }

    /// As `load`, with an explicit database location.
    pub fn load_from(
        config: Config,
        db_file: &std::path::Path,
        mut progress: impl FnMut(LoadingStatus),
    ) -> Result<Self> {
        progress(LoadingStatus::OpeningDatabase);
        let db = Database::open(db_file).context("Failed to open database")?;
        let db = Arc::new(db);

        progress(LoadingStatus::LoadingLibrary);
        let games = db.load_games()?;
        tracing::info!("Loaded {} game(s) from library", games.len());

        progress(LoadingStatus::Ready);
        Ok(Self { config, db, games })
    }

    /// Build the Steam client from configuration. The missing-key
    /// error surfaces here, once, at the boundary that needs it.
    pub fn steam_client(&self) -> Result<SteamClient> {
        SteamClient::new(self.config.steam_api_key.as_deref())
    }

    /// Fetch a fresh remote snapshot for every remote-backed game and
    /// merge it into the store. A game whose fetch fails is treated as
    /// absent from the snapshot this cycle, which the merge never
    /// turns into a deletion.
    pub async fn refresh_library(
        &mut self,
        api: &dyn SteamApi,
        mut progress: impl FnMut(LoadingStatus),
    ) -> Result<usize> {
        progress(LoadingStatus::SyncingRemote);
        let user = self.db.load_user()?;
        let mut remote = Vec::new();

        for game in self.games.iter().filter(|g| !g.is_local) {
            let info = crate::steam::GameInfo {
                id: game.steam_id,
                name: game.name.clone(),
                icon_url: game.icon_url.clone(),
            };
            match crate::steam::fetch_game(api, &info, user.as_deref()).await {
                Ok(mut fetched) => {
                    // Remote has no notion of where the game lives on
                    // this machine.
                    fetched.executable_path = game.executable_path.clone();
                    remote.push(fetched);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} this cycle: {e:#}", game.name);
                }
            }
        }

        let upserted = sync::sync(&self.db, &remote, &self.games)?;
        if upserted > 0 {
            self.games = self.db.load_games()?;
        }
        progress(LoadingStatus::Ready);
        Ok(upserted)
    }

    /// Downstream consumer for watcher events: find the achievement,
    /// skip when already unlocked, otherwise mark it unlocked now,
    /// persist and notify.
    pub fn on_achievement_unlocked(
        &mut self,
        achievement_id: &str,
        notifier: &dyn Notifier,
    ) -> Result<bool> {
        for gi in 0..self.games.len() {
            let Some(ai) = self.games[gi]
                .achievements
                .iter()
                .position(|a| a.id == achievement_id)
            else {
                continue;
            };

            if self.games[gi].achievements[ai].is_unlocked {
                tracing::debug!("{achievement_id} already unlocked, ignoring");
                return Ok(false);
            }

            self.games[gi].achievements[ai].unlock();
            let game = &self.games[gi];
            let achievement = &game.achievements[ai];
            self.db.update_achievement(
                game.steam_id,
                &achievement.id,
                true,
                achievement.unlock_date,
                None,
            )?;
            notifier.achievement_unlocked(game, achievement);
            return Ok(true);
        }

        tracing::warn!("Unlock event for unknown achievement {achievement_id}");
        Ok(false)
    }

    /// Sidecar file the watcher reads for a game: a configured
    /// override, or achievements.json next to the executable.
    pub fn sidecar_path(&self, game: &Game) -> Option<PathBuf> {
        if let Some(override_path) = &self.config.sidecar_override {
            return Some(PathBuf::from(override_path));
        }
        let exe = PathBuf::from(game.executable_path.as_deref()?);
        Some(exe.parent()?.join("achievements.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Achievement;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn achievement_unlocked(&self, _game: &Game, achievement: &Achievement) {
            self.seen.lock().unwrap().push(achievement.id.clone());
        }
    }

    fn test_app() -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("library.db")).unwrap();

        let mut game = Game::new(400, "Portal");
        game.add_achievement(Achievement::new("ACH_CAKE", "Cake"));
        let mut done = Achievement::new("ACH_DONE", "Done");
        done.unlock();
        game.add_achievement(done);
        db.save_game(&game).unwrap();

        let games = db.load_games().unwrap();
        let app = App {
            config: Config::default(),
            db: Arc::new(db),
            games,
        };
        (dir, app)
    }

    #[test]
    fn test_unlock_event_persists_and_notifies() {
        let (_dir, mut app) = test_app();
        let notifier = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
        };

        assert!(app.on_achievement_unlocked("ACH_CAKE", &notifier).unwrap());
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["ACH_CAKE"]);

        // Persisted with a timestamp, per the pairing invariant.
        let stored = app.db.get_game(400).unwrap().unwrap();
        let a = stored.achievement_by_id("ACH_CAKE").unwrap();
        assert!(a.is_unlocked);
        assert!(a.unlock_date.is_some());
    }

    #[test]
    fn test_unlock_event_skips_already_unlocked() {
        let (_dir, mut app) = test_app();
        let notifier = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
        };

        assert!(!app.on_achievement_unlocked("ACH_DONE", &notifier).unwrap());
        assert!(notifier.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unlock_event_for_unknown_achievement_is_ignored() {
        let (_dir, mut app) = test_app();
        let notifier = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
        };
        assert!(!app.on_achievement_unlocked("ACH_GHOST", &notifier).unwrap());
    }

    #[test]
    fn test_load_reports_progress_in_order() {
        let dir = TempDir::new().unwrap();
        let db_file = dir.path().join("library.db");

        let mut stages = Vec::new();
        let app = App::load_from(Config::default(), &db_file, |s| stages.push(s)).unwrap();

        assert!(app.games.is_empty());
        assert_eq!(
            stages,
            vec![
                LoadingStatus::OpeningDatabase,
                LoadingStatus::LoadingLibrary,
                LoadingStatus::Ready
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_reports_sync_stage() {
        use crate::steam::{GameInfo, OwnedGame, PlayerUnlock, SteamApi};
        use std::collections::HashMap;

        struct EmptyApi;

        #[async_trait::async_trait]
        impl SteamApi for EmptyApi {
            async fn resolve_game(&self, _name: &str) -> Result<Option<GameInfo>> {
                Ok(None)
            }
            async fn achievement_schema(&self, _game_id: i64) -> Result<Vec<Achievement>> {
                Ok(Vec::new())
            }
            async fn global_percentages(&self, _game_id: i64) -> Result<HashMap<String, f64>> {
                Ok(HashMap::new())
            }
            async fn player_achievements(
                &self,
                _game_id: i64,
                _steam_id: &str,
            ) -> Result<HashMap<String, PlayerUnlock>> {
                Ok(HashMap::new())
            }
            async fn owned_games(&self, _steam_id: &str) -> Result<Vec<OwnedGame>> {
                Ok(Vec::new())
            }
        }

        let (_dir, mut app) = test_app();
        let mut stages = Vec::new();
        app.refresh_library(&EmptyApi, |s| stages.push(s)).await.unwrap();
        assert_eq!(
            stages,
            vec![LoadingStatus::SyncingRemote, LoadingStatus::Ready]
        );
    }

    #[test]
    fn test_sidecar_path_defaults_next_to_executable() {
        let (_dir, mut app) = test_app();
        app.games[0].executable_path = Some("/games/portal/portal.exe".to_string());
        assert_eq!(
            app.sidecar_path(&app.games[0]),
            Some(PathBuf::from("/games/portal/achievements.json"))
        );

        app.config.sidecar_override = Some("/tmp/override.json".to_string());
        assert_eq!(
            app.sidecar_path(&app.games[0]),
            Some(PathBuf::from("/tmp/override.json"))
        );
    }
}
