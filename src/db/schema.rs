//! Library record types

use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Shown for achievements whose description is hidden until unlocked.
pub const HIDDEN_DESCRIPTION: &str = "Hidden achievement description";

/// A game tracked in the local library.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    /// Steam app id. Stable, assigned remotely; local-only entries get a
    /// locally chosen id instead.
    pub steam_id: i64,
    pub name: String,
    pub executable_path: Option<String>,
    pub icon_url: Option<String>,
    /// True for entries added manually with no remote counterpart.
    pub is_local: bool,
    pub achievements: Vec<Achievement>,
}

impl Game {
    pub fn new(steam_id: i64, name: impl Into<String>) -> Self {
        Self {
            steam_id,
            name: name.into(),
            executable_path: None,
            icon_url: None,
            is_local: false,
            achievements: Vec::new(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            steam_id: row.get(0)?,
            name: row.get(1)?,
            executable_path: row.get(2)?,
            icon_url: row.get(3)?,
            is_local: row.get::<_, i32>(4)? != 0,
            achievements: Vec::new(),
        })
    }

    pub fn add_achievement(&mut self, achievement: Achievement) {
        self.achievements.push(achievement);
    }

    pub fn achievement_by_id(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }

    pub fn unlocked_count(&self) -> usize {
        self.achievements.iter().filter(|a| a.is_unlocked).count()
    }
}

/// A single achievement belonging to one game.
///
/// Invariant: `unlock_date` is `Some` iff `is_unlocked` is true. The
/// `unlock` and `lock` mutators change the pair together and are the
/// only supported way to do so.
#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    /// API name, stable per game. Unique within the owning game only.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub gray_icon: Option<String>,
    pub global_percentage: Option<f64>,
    pub is_hidden: bool,
    pub is_unlocked: bool,
    pub unlock_date: Option<DateTime<Utc>>,
}

impl Achievement {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            icon: None,
            gray_icon: None,
            global_percentage: None,
            is_hidden: false,
            is_unlocked: false,
            unlock_date: None,
        }
    }

    /// Columns: game_id, id, name, description, icon, gray_icon,
    /// global_percentage, is_hidden, is_unlocked, unlock_date.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            icon: row.get(4)?,
            gray_icon: row.get(5)?,
            global_percentage: row.get(6)?,
            is_hidden: row.get::<_, i32>(7)? != 0,
            is_unlocked: row.get::<_, i32>(8)? != 0,
            unlock_date: row.get(9)?,
        })
    }

    /// Mark unlocked now. No-op when already unlocked, so an existing
    /// unlock timestamp is never overwritten.
    pub fn unlock(&mut self) {
        if !self.is_unlocked {
            self.is_unlocked = true;
            self.unlock_date = Some(Utc::now());
        }
    }

    /// Relock (manual override). Clears the timestamp with the flag.
    pub fn lock(&mut self) {
        self.is_unlocked = false;
        self.unlock_date = None;
    }

    /// Description with the hidden-achievement fallback applied.
    pub fn display_description(&self) -> &str {
        self.description.as_deref().unwrap_or(HIDDEN_DESCRIPTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_sets_timestamp_once() {
        let mut a = Achievement::new("ACH_WIN", "Winner");
        a.unlock();
        assert!(a.is_unlocked);
        let first = a.unlock_date.expect("unlock date set");

        a.unlock();
        assert_eq!(a.unlock_date, Some(first));
    }

    #[test]
    fn test_lock_clears_timestamp() {
        let mut a = Achievement::new("ACH_WIN", "Winner");
        a.unlock();
        a.lock();
        assert!(!a.is_unlocked);
        assert!(a.unlock_date.is_none());
    }

    #[test]
    fn test_hidden_description_fallback() {
        let mut a = Achievement::new("ACH_SECRET", "???");
        a.is_hidden = true;
        assert_eq!(a.display_description(), HIDDEN_DESCRIPTION);

        a.description = Some("Find the hidden room".to_string());
        assert_eq!(a.display_description(), "Find the hidden room");
    }
}
