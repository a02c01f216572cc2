//! Reconciliation of a remote library snapshot into the local store
//!
//! The merge is additive only. Remote games are upserted when they are
//! new locally or when their achievement set differs from the local
//! copy in any observable field; local games absent from the snapshot,
//! including every local-only entry, are never touched. Removing a
//! remote-owned game is a separate explicit user action that deletes
//! by id.

use anyhow::Result;
use std::collections::HashMap;

use crate::db::{Achievement, Database, Game};

/// Select the remote games that need to be written locally.
pub fn plan<'a>(remote: &'a [Game], local: &[Game]) -> Vec<&'a Game> {
    let by_id: HashMap<i64, &Game> = local.iter().map(|g| (g.steam_id, g)).collect();

    remote
        .iter()
        .filter(|r| match by_id.get(&r.steam_id) {
            None => true,
            Some(l) => !achievements_match(&r.achievements, &l.achievements),
        })
        .collect()
}

/// Merge the remote snapshot into the store. Returns the number of
/// games upserted; all writes go through one batch call.
pub fn sync(db: &Database, remote: &[Game], local: &[Game]) -> Result<usize> {
    let upserts: Vec<Game> = plan(remote, local).into_iter().cloned().collect();
    if upserts.is_empty() {
        tracing::debug!("Library already in sync, nothing to write");
        return Ok(0);
    }

    tracing::info!("Upserting {} game(s) from remote snapshot", upserts.len());
    db.save_games(&upserts)?;
    Ok(upserts.len())
}

/// Whole-record achievement-set comparison, order-insensitive and
/// symmetric. Every observable field participates so that late
/// arrivals (descriptions, percentages, unlock timestamps) still
/// propagate.
fn achievements_match(a: &[Achievement], b: &[Achievement]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_id: HashMap<&str, &Achievement> = b.iter().map(|x| (x.id.as_str(), x)).collect();
    a.iter().all(|x| by_id.get(x.id.as_str()) == Some(&x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn game_with(id: i64, achievements: Vec<Achievement>) -> Game {
        let mut game = Game::new(id, format!("Game {id}"));
        game.achievements = achievements;
        game
    }

    fn achievement(id: &str, unlocked: bool) -> Achievement {
        let mut a = Achievement::new(id, id.to_uppercase());
        if unlocked {
            a.unlock();
        }
        a
    }

    fn open_test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("library.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_new_remote_game_is_planned() {
        let remote = vec![game_with(1, vec![achievement("a", false)])];
        let planned = plan(&remote, &[]);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].steam_id, 1);
    }

    /// Scenario D: an exactly matching remote game produces no writes.
    #[test]
    fn test_identical_snapshot_plans_nothing() {
        let achievements: Vec<Achievement> = (0..10)
            .map(|n| achievement(&format!("a{n}"), n < 3))
            .collect();
        let remote = vec![game_with(1, achievements.clone())];
        let local = vec![game_with(1, achievements)];
        assert!(plan(&remote, &local).is_empty());
    }

    /// Scenario E / P4: local-only games absent from the snapshot are
    /// never touched or removed.
    #[test]
    fn test_local_only_games_left_untouched() {
        let (_dir, db) = open_test_db();
        let mut local_only = game_with(99, vec![achievement("solo", true)]);
        local_only.is_local = true;
        db.save_game(&local_only).unwrap();

        let remote = vec![game_with(1, vec![achievement("a", false)])];
        let local = db.load_games().unwrap();
        sync(&db, &remote, &local).unwrap();

        let after = db.load_games().unwrap();
        let kept = after.iter().find(|g| g.steam_id == 99).expect("still present");
        assert_eq!(kept, &local_only);
        assert!(after.iter().any(|g| g.steam_id == 1));
    }

    /// P5: syncing the result of a sync writes nothing further.
    #[test]
    fn test_sync_is_idempotent() {
        let (_dir, db) = open_test_db();
        let remote = vec![
            game_with(1, vec![achievement("a", true), achievement("b", false)]),
            game_with(2, vec![achievement("c", false)]),
        ];

        let first = sync(&db, &remote, &db.load_games().unwrap()).unwrap();
        assert_eq!(first, 2);

        let second = sync(&db, &remote, &db.load_games().unwrap()).unwrap();
        assert_eq!(second, 0);
    }

    /// A late-arriving unlock timestamp alone must trigger an upsert;
    /// comparisons that only look at the unlocked flag miss it.
    #[test]
    fn test_timestamp_only_difference_detected() {
        let mut unlocked_then = achievement("a", false);
        unlocked_then.is_unlocked = true;
        unlocked_then.unlock_date = Some(Utc::now() - chrono::Duration::days(7));

        let mut unlocked_now = unlocked_then.clone();
        unlocked_now.unlock_date = Some(Utc::now());

        let remote = vec![game_with(1, vec![unlocked_now])];
        let local = vec![game_with(1, vec![unlocked_then])];
        assert_eq!(plan(&remote, &local).len(), 1);
    }

    /// Metadata-only differences (description refresh on language
    /// change) also count as observable.
    #[test]
    fn test_description_difference_detected() {
        let mut translated = achievement("a", false);
        translated.description = Some("Gagnez une partie".to_string());
        let original = achievement("a", false);

        let remote = vec![game_with(1, vec![translated])];
        let local = vec![game_with(1, vec![original])];
        assert_eq!(plan(&remote, &local).len(), 1);
    }

    #[test]
    fn test_comparison_is_symmetric_on_extra_achievements() {
        let remote = vec![game_with(1, vec![achievement("a", false)])];
        let local = vec![game_with(
            1,
            vec![achievement("a", false), achievement("b", false)],
        )];
        // Remote lost an achievement: sets differ in both directions.
        assert_eq!(plan(&remote, &local).len(), 1);

        let remote = vec![game_with(
            1,
            vec![achievement("a", false), achievement("b", false)],
        )];
        let local = vec![game_with(1, vec![achievement("a", false)])];
        assert_eq!(plan(&remote, &local).len(), 1);
    }
}
