//! Versioned schema migrations
//!
//! The runner keeps a bookkeeping table of applied versions. A fresh
//! database gets the latest schema built directly and every known
//! version recorded as applied; an existing database gets the pending
//! versions applied in ascending order, all inside one transaction.
//! Each step also checks whether its mutation is already present, so
//! bookkeeping and actual schema state cannot diverge silently.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashSet;

const MIGRATION_TABLE: &str = "migrations_applied";

/// A single versioned schema change.
pub trait Migration {
    /// Strictly unique, monotonically applied version number.
    fn version(&self) -> i64;
    fn description(&self) -> &'static str;
    fn up(&self, tx: &Transaction<'_>) -> rusqlite::Result<()>;
}

/// All known migrations, in registration order.
pub fn registry() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateLibraryTables),
        Box::new(SettingsKeyValue),
        Box::new(AddIsLocal),
        Box::new(AchievementCompositeKey),
    ]
}

/// Run all pending migrations. Idempotent; must complete before the
/// database handle is handed to anything else.
pub fn initialize(conn: &mut Connection) -> Result<()> {
    run(conn, registry())
}

fn run(conn: &mut Connection, mut migrations: Vec<Box<dyn Migration>>) -> Result<()> {
    ensure_migration_table(conn)?;

    migrations.sort_by_key(|m| m.version());
    validate_versions(&migrations)?;

    if is_fresh(conn)? {
        // Build the latest schema directly; never replay migrations
        // against a database that starts at the current version.
        let tx = conn.transaction()?;
        create_latest_snapshot(&tx)?;
        for m in &migrations {
            record_applied(&tx, m.as_ref())?;
        }
        tx.commit().context("Failed to commit fresh schema")?;
        tracing::info!("Created fresh schema at version {}", latest_version());
        return Ok(());
    }

    let applied = applied_versions(conn)?;
    let pending: Vec<_> = migrations
        .iter()
        .filter(|m| !applied.contains(&m.version()))
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    // One transaction spans the whole batch: either every pending
    // migration lands or none does, and the same set is retried on
    // the next startup.
    let tx = conn.transaction()?;
    for m in &pending {
        m.up(&tx)
            .with_context(|| format!("Migration {} failed: {}", m.version(), m.description()))?;
        record_applied(&tx, m.as_ref())?;
        tracing::info!("Applied migration {}: {}", m.version(), m.description());
    }
    tx.commit().context("Failed to commit migration batch")?;
    Ok(())
}

/// Highest registered migration version.
pub fn latest_version() -> i64 {
    registry().iter().map(|m| m.version()).max().unwrap_or(0)
}

/// Duplicate version numbers among registered migrations are a
/// configuration error.
fn validate_versions(migrations: &[Box<dyn Migration>]) -> Result<()> {
    let mut versions = HashSet::new();
    for m in migrations {
        if !versions.insert(m.version()) {
            bail!("duplicate migration version {} registered", m.version());
        }
    }
    Ok(())
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version INTEGER PRIMARY KEY,
                applied_on TEXT NOT NULL,
                description TEXT
            )"
        ),
        [],
    )
    .context("Failed to create migration bookkeeping table")?;
    Ok(())
}

/// A database is fresh when none of the core tables exist yet.
fn is_fresh(conn: &Connection) -> Result<bool> {
    Ok(!table_exists(conn, "games")?
        && !table_exists(conn, "achievements")?
        && !table_exists(conn, "settings")?)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(tx: &Transaction<'_>, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn applied_versions(conn: &Connection) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare(&format!("SELECT version FROM {MIGRATION_TABLE}"))?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<i64>, _>>()?;
    Ok(versions)
}

fn record_applied(tx: &Transaction<'_>, m: &dyn Migration) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT OR IGNORE INTO {MIGRATION_TABLE} (version, applied_on, description)
             VALUES (?1, datetime('now'), ?2)"
        ),
        params![m.version(), m.description()],
    )?;
    Ok(())
}

/// Current-version schema, created directly for fresh databases.
fn create_latest_snapshot(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            executable_path TEXT,
            icon_url TEXT,
            is_local INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS achievements (
            game_id INTEGER NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            icon TEXT,
            gray_icon TEXT,
            global_percentage REAL,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            is_unlocked INTEGER NOT NULL DEFAULT 0,
            unlock_date TEXT,
            PRIMARY KEY (game_id, id),
            FOREIGN KEY (game_id) REFERENCES games(id)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_achievements_game ON achievements(game_id);
        "#,
    )
    .context("Failed to create schema snapshot")?;
    Ok(())
}

// ========== Migrations ==========

/// v1: the original games and achievements tables. Achievements were
/// keyed by api name alone at this point.
struct CreateLibraryTables;

impl Migration for CreateLibraryTables {
    fn version(&self) -> i64 {
        1
    }

    fn description(&self) -> &'static str {
        "create games and achievements tables"
    }

    fn up(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                executable_path TEXT,
                icon_url TEXT
            );

            CREATE TABLE IF NOT EXISTS achievements (
                game_id INTEGER NOT NULL,
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                icon TEXT,
                gray_icon TEXT,
                global_percentage REAL,
                is_hidden INTEGER NOT NULL DEFAULT 0,
                is_unlocked INTEGER NOT NULL DEFAULT 0,
                unlock_date TEXT,
                FOREIGN KEY (game_id) REFERENCES games(id)
            );
            "#,
        )
    }
}

/// v2: replace the fixed-key singleton user row with a key-value
/// settings table. Carries over account id and locale when a legacy
/// `user` table is present.
struct SettingsKeyValue;

impl Migration for SettingsKeyValue {
    fn version(&self) -> i64 {
        2
    }

    fn description(&self) -> &'static str {
        "replace singleton user row with key-value settings"
    }

    fn up(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )?;

        let has_user: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'user'",
            [],
            |row| row.get(0),
        )?;
        if has_user > 0 {
            tx.execute_batch(
                r#"
                INSERT OR IGNORE INTO settings (key, value)
                    SELECT 'steam_account_id', steam_id FROM user
                    WHERE id = 1 AND steam_id IS NOT NULL;
                INSERT OR IGNORE INTO settings (key, value)
                    SELECT 'locale', culture_code FROM user
                    WHERE id = 1 AND culture_code IS NOT NULL;
                DROP TABLE user;
                "#,
            )?;
        }
        Ok(())
    }
}

/// v3: flag for manually added games with no remote counterpart.
struct AddIsLocal;

impl Migration for AddIsLocal {
    fn version(&self) -> i64 {
        3
    }

    fn description(&self) -> &'static str {
        "add is_local flag to games"
    }

    fn up(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        if !column_exists(tx, "games", "is_local")? {
            tx.execute(
                "ALTER TABLE games ADD COLUMN is_local INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        Ok(())
    }
}

/// v4: achievement api names are only unique per game, so the primary
/// key becomes (game_id, id). SQLite cannot alter a primary key in
/// place; the table is rebuilt and the rows copied across.
struct AchievementCompositeKey;

impl Migration for AchievementCompositeKey {
    fn version(&self) -> i64 {
        4
    }

    fn description(&self) -> &'static str {
        "rebuild achievements with composite primary key"
    }

    fn up(&self, tx: &Transaction<'_>) -> rusqlite::Result<()> {
        // Already composite when game_id participates in the key.
        let game_id_in_pk: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('achievements')
             WHERE name = 'game_id' AND pk > 0",
            [],
            |row| row.get(0),
        )?;
        if game_id_in_pk > 0 {
            return Ok(());
        }

        tx.execute_batch(
            r#"
            CREATE TABLE achievements_new (
                game_id INTEGER NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                icon TEXT,
                gray_icon TEXT,
                global_percentage REAL,
                is_hidden INTEGER NOT NULL DEFAULT 0,
                is_unlocked INTEGER NOT NULL DEFAULT 0,
                unlock_date TEXT,
                PRIMARY KEY (game_id, id),
                FOREIGN KEY (game_id) REFERENCES games(id)
            );

            INSERT INTO achievements_new
                SELECT game_id, id, name, description, icon, gray_icon,
                       global_percentage, is_hidden, is_unlocked, unlock_date
                FROM achievements;

            DROP TABLE achievements;
            ALTER TABLE achievements_new RENAME TO achievements;

            CREATE INDEX IF NOT EXISTS idx_achievements_game ON achievements(game_id);
            "#,
        )
    }
}
