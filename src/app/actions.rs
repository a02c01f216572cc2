//! CLI command action handlers

use super::{App, Notifier};
use crate::db::{Achievement, Game};
use crate::steam::{fetch_game, GameInfo, SteamApi};
use crate::watch::{SidecarFile, UnlockWatcher};
use anyhow::{bail, Result};
use chrono::Utc;
use std::path::Path;
use tokio::sync::mpsc;

/// Prints unlock notifications to the terminal.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn achievement_unlocked(&self, game: &Game, achievement: &Achievement) {
        println!(
            "🏆 {} — {} ({})",
            game.name,
            achievement.name,
            achievement.display_description()
        );
    }
}

impl App {
    // ========== Game Commands ==========

    pub async fn cmd_game_list(&self) -> Result<()> {
        if self.games.is_empty() {
            println!("Library is empty. Add a game with 'trophycase game add <name>'.");
            return Ok(());
        }

        println!("Library:");
        println!("{:-<60}", "");
        for game in &self.games {
            let origin = if game.is_local { " [local]" } else { "" };
            println!(
                "  {} ({}){}\n    Achievements: {}/{}",
                game.name,
                game.steam_id,
                origin,
                game.unlocked_count(),
                game.achievements.len()
            );
        }
        Ok(())
    }

    /// Resolve a name against the store and add the game, or add a
    /// local-only entry when requested.
    pub async fn cmd_game_add(
        &mut self,
        name: &str,
        executable: Option<&str>,
        local: bool,
    ) -> Result<()> {
        let mut game = if local {
            // Local-only entries get an id outside the catalog range.
            let next_id = self
                .games
                .iter()
                .map(|g| g.steam_id)
                .max()
                .unwrap_or(0)
                .max(1_000_000_000)
                + 1;
            let mut game = Game::new(next_id, name);
            game.is_local = true;
            game
        } else {
            let api = self.steam_client()?;
            let Some(info) = api.resolve_game(name).await? else {
                bail!("No Steam game found matching '{name}'");
            };
            println!("Matched '{}' (app {})", info.name, info.id);
            let user = self.db.load_user()?;
            fetch_game(&api, &info, user.as_deref()).await?
        };

        game.executable_path = executable.map(str::to_string);
        self.db.save_game(&game)?;
        println!(
            "Added {} with {} achievement(s)",
            game.name,
            game.achievements.len()
        );
        self.games = self.db.load_games()?;
        Ok(())
    }

    /// Explicit removal; reconciliation never deletes.
    pub async fn cmd_game_remove(&mut self, ids: &[i64]) -> Result<()> {
        self.db.delete_games_by_ids(ids)?;
        self.games = self.db.load_games()?;
        println!("Removed {} game(s)", ids.len());
        Ok(())
    }

    pub async fn cmd_game_set_exe(&mut self, id: i64, path: &str) -> Result<()> {
        if self.db.get_game(id)?.is_none() {
            bail!("No game with id {id} in the library");
        }
        self.db.update_game_executable(id, path)?;
        self.games = self.db.load_games()?;
        println!("Executable for {id} set to {path}");
        Ok(())
    }

    // ========== Achievement Commands ==========

    /// Manual override: unlock or relock one achievement.
    pub async fn cmd_achievement_set(
        &mut self,
        game_id: i64,
        achievement_id: &str,
        unlocked: bool,
    ) -> Result<()> {
        let Some(game) = self.db.get_game(game_id)? else {
            bail!("No game with id {game_id} in the library");
        };
        if game.achievement_by_id(achievement_id).is_none() {
            bail!("Game {} has no achievement '{achievement_id}'", game.name);
        }

        let date = unlocked.then(Utc::now);
        self.db
            .update_achievement(game_id, achievement_id, unlocked, date, None)?;
        self.games = self.db.load_games()?;
        println!(
            "{} {achievement_id} for {}",
            if unlocked { "Unlocked" } else { "Relocked" },
            game.name
        );
        Ok(())
    }

    // ========== Sync ==========

    /// Merge a fresh remote snapshot into the library; optionally
    /// discover owned games missing locally first.
    pub async fn cmd_sync(&mut self, discover: bool) -> Result<()> {
        let api = self.steam_client()?;

        if discover {
            let Some(user) = self.db.load_user()? else {
                bail!("Sign in first with 'trophycase user login <steam-id>'");
            };
            match api.owned_games(&user).await {
                Ok(owned) => {
                    for entry in owned {
                        if self.games.iter().any(|g| g.steam_id == entry.id) {
                            continue;
                        }
                        let info = GameInfo {
                            id: entry.id,
                            name: entry.name,
                            icon_url: None,
                        };
                        match fetch_game(&api, &info, Some(user.as_str())).await {
                            Ok(game) => {
                                println!("Discovered {}", game.name);
                                self.db.save_game(&game)?;
                            }
                            Err(e) => tracing::warn!("Skipping {}: {e:#}", info.name),
                        }
                    }
                    self.games = self.db.load_games()?;
                }
                Err(e) => tracing::warn!("Owned games unavailable this cycle: {e:#}"),
            }
        }

        let upserted = self
            .refresh_library(&api, |status| tracing::debug!("sync stage: {status:?}"))
            .await?;
        println!("Sync complete: {upserted} game(s) updated");
        Ok(())
    }

    // ========== Watch ==========

    /// Arm the unlock watcher for one game and consume its events
    /// until interrupted.
    pub async fn cmd_watch(&mut self, game_id: i64) -> Result<()> {
        let Some(game) = self.db.get_game(game_id)? else {
            bail!("No game with id {game_id} in the library");
        };
        let Some(sidecar) = self.sidecar_path(&game) else {
            bail!(
                "{} has no executable configured; set one with 'trophycase game set-exe' \
                 so the watcher knows where to look",
                game.name
            );
        };
        let exe = game.executable_path.clone().unwrap_or_default();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = UnlockWatcher::new();
        watcher.start(Path::new(&exe), SidecarFile::new(&sidecar), tx)?;

        println!(
            "Watching {} ({}) — Ctrl-C to stop",
            game.name,
            sidecar.display()
        );

        let notifier = ConsoleNotifier;
        loop {
            tokio::select! {
                maybe_id = rx.recv() => {
                    let Some(achievement_id) = maybe_id else { break };
                    self.on_achievement_unlocked(&achievement_id, &notifier)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("Stopping watch");
                    break;
                }
            }
        }

        watcher.stop();
        Ok(())
    }

    // ========== User & Language ==========

    pub async fn cmd_user_login(&self, steam_id: &str) -> Result<()> {
        self.db.save_user(steam_id)?;
        println!("Signed in as {steam_id}");
        Ok(())
    }

    pub async fn cmd_user_logout(&self) -> Result<()> {
        match self.db.load_user()? {
            Some(current) => {
                self.db.delete_user(&current)?;
                println!("Signed out {current}");
            }
            None => println!("Not signed in"),
        }
        Ok(())
    }

    pub async fn cmd_user_show(&self) -> Result<()> {
        match self.db.load_user()? {
            Some(current) => println!("Signed in as {current}"),
            None => println!("Not signed in"),
        }
        Ok(())
    }

    pub async fn cmd_lang_set(&self, locale: &str) -> Result<()> {
        self.db.save_language(locale)?;
        println!("Language set to {locale}");
        Ok(())
    }

    pub async fn cmd_lang_show(&self) -> Result<()> {
        match self.db.load_language()? {
            Some(locale) => println!("Language: {locale}"),
            None => println!("Language: default (en-US)"),
        }
        Ok(())
    }
}
