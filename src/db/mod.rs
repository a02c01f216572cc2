//! SQLite persistence for the game library

mod migrations;
mod schema;

pub use migrations::{latest_version, registry, Migration};
pub use schema::{Achievement, Game, HIDDEN_DESCRIPTION};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Settings key holding the signed-in Steam account id.
const KEY_ACCOUNT: &str = "steam_account_id";
/// Settings key holding the selected locale code.
const KEY_LOCALE: &str = "locale";

/// Database wrapper with thread-safe access.
///
/// `open` runs all pending migrations before the handle is returned,
/// so a published `Database` always sits on the current schema.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path).context("Failed to open database")?;
        migrations::initialize(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========== Games & Achievements ==========

    /// Upsert one game and all of its achievements in one transaction.
    pub fn save_game(&self, game: &Game) -> Result<()> {
        self.save_games(std::slice::from_ref(game))
    }

    /// Upsert a batch of games and their achievements. A failure
    /// anywhere rolls back the whole batch.
    pub fn save_games(&self, games: &[Game]) -> Result<()> {
        if games.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut game_stmt = tx.prepare(
                "INSERT OR REPLACE INTO games (id, name, executable_path, icon_url, is_local)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut ach_stmt = tx.prepare(
                "INSERT OR REPLACE INTO achievements
                     (game_id, id, name, description, icon, gray_icon,
                      global_percentage, is_hidden, is_unlocked, unlock_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            for game in games {
                game_stmt.execute(params![
                    game.steam_id,
                    game.name,
                    game.executable_path,
                    game.icon_url,
                    game.is_local as i32,
                ])?;

                for a in &game.achievements {
                    ach_stmt.execute(params![
                        game.steam_id,
                        a.id,
                        a.name,
                        a.description,
                        a.icon,
                        a.gray_icon,
                        a.global_percentage,
                        a.is_hidden as i32,
                        a.is_unlocked as i32,
                        a.unlock_date,
                    ])?;
                }
            }
        }
        tx.commit().context("Failed to commit game batch")?;
        Ok(())
    }

    /// Delete a game and its achievements.
    pub fn delete_game(&self, steam_id: i64) -> Result<()> {
        self.delete_games_by_ids(&[steam_id])
    }

    /// Delete the named games, cascading to their achievements. An
    /// empty id list is a no-op.
    pub fn delete_games_by_ids(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        tx.execute(
            &format!("DELETE FROM achievements WHERE game_id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM games WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        tx.commit().context("Failed to commit game deletion")?;

        tracing::debug!("Deleted {} game(s)", removed);
        Ok(())
    }

    /// Targeted single-column update of a game's executable path.
    pub fn update_game_executable(&self, steam_id: i64, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE games SET executable_path = ?1 WHERE id = ?2",
            params![path, steam_id],
        )?;
        Ok(())
    }

    /// Targeted update of one achievement's unlock state.
    ///
    /// The unlocked flag and timestamp move together: callers must pass
    /// a date when unlocking and none when locking. A `None` description
    /// leaves the stored description untouched.
    pub fn update_achievement(
        &self,
        game_id: i64,
        achievement_id: &str,
        unlocked: bool,
        unlock_date: Option<DateTime<Utc>>,
        description: Option<&str>,
    ) -> Result<()> {
        if unlocked != unlock_date.is_some() {
            bail!("unlock date must be present exactly when unlocked is true");
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE achievements
             SET is_unlocked = ?1,
                 unlock_date = ?2,
                 description = COALESCE(?3, description)
             WHERE game_id = ?4 AND id = ?5",
            params![unlocked as i32, unlock_date, description, game_id, achievement_id],
        )?;
        Ok(())
    }

    /// Load the whole library: all games with their achievements
    /// associated in memory. An achievement whose game id matches no
    /// loaded game is dropped, not promoted to an error.
    pub fn load_games(&self) -> Result<Vec<Game>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, name, executable_path, icon_url, is_local FROM games ORDER BY name",
        )?;
        let mut games = stmt
            .query_map([], Game::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        if games.is_empty() {
            return Ok(games);
        }

        let index: HashMap<i64, usize> = games
            .iter()
            .enumerate()
            .map(|(i, g)| (g.steam_id, i))
            .collect();

        let mut stmt = conn.prepare(
            "SELECT game_id, id, name, description, icon, gray_icon,
                    global_percentage, is_hidden, is_unlocked, unlock_date
             FROM achievements",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, Achievement::from_row(row)?))
        })?;
        for row in rows {
            let (game_id, achievement) = row?;
            match index.get(&game_id) {
                Some(&i) => games[i].achievements.push(achievement),
                None => {
                    tracing::warn!(
                        "Dropping orphan achievement {} for unknown game {}",
                        achievement.id,
                        game_id
                    );
                }
            }
        }

        Ok(games)
    }

    /// Load one game with its achievements.
    pub fn get_game(&self, steam_id: i64) -> Result<Option<Game>> {
        let conn = self.conn.lock().unwrap();
        let game = conn
            .query_row(
                "SELECT id, name, executable_path, icon_url, is_local FROM games WHERE id = ?1",
                params![steam_id],
                Game::from_row,
            )
            .optional()
            .context("Failed to query game")?;

        let Some(mut game) = game else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT game_id, id, name, description, icon, gray_icon,
                    global_percentage, is_hidden, is_unlocked, unlock_date
             FROM achievements WHERE game_id = ?1",
        )?;
        game.achievements = stmt
            .query_map(params![steam_id], Achievement::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(game))
    }

    // ========== User & Settings ==========

    /// Store the signed-in account id.
    pub fn save_user(&self, steam_id: &str) -> Result<()> {
        self.set_setting(KEY_ACCOUNT, steam_id)
    }

    /// Currently signed-in account id, if any.
    pub fn load_user(&self) -> Result<Option<String>> {
        self.get_setting(KEY_ACCOUNT)
    }

    /// Sign out, but only when the stored account still matches the
    /// given id. A concurrent login under a different account is left
    /// alone.
    pub fn delete_user(&self, steam_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM settings WHERE key = ?1 AND value = ?2",
            params![KEY_ACCOUNT, steam_id],
        )?;
        Ok(())
    }

    pub fn save_language(&self, locale: &str) -> Result<()> {
        self.set_setting(KEY_LOCALE, locale)
    }

    pub fn load_language(&self) -> Result<Option<String>> {
        self.get_setting(KEY_LOCALE)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read setting")
    }
}
