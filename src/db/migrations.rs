// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Catalog-level settings (embedding dimensions, creation time)
    CREATE TABLE catalog_info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- One row per distinct file content
    CREATE TABLE videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_hash TEXT NOT NULL UNIQUE,
        file_path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        source_device TEXT NOT NULL DEFAULT 'unknown',
        lrf_path TEXT,

        -- Technical metadata
        duration_seconds REAL,
        resolution TEXT,
        width INTEGER,
        height INTEGER,
        fps REAL,
        codec TEXT,
        creation_date TEXT,

        -- GPS
        gps_latitude REAL,
        gps_longitude REAL,
        gps_place_name TEXT,

        -- Vision analysis
        scene_description TEXT,
        tags TEXT,
        mood TEXT,
        camera_movement TEXT,
        time_of_day TEXT,

        -- Little-endian f32 vector
        embedding BLOB,

        processing_status TEXT NOT NULL DEFAULT 'scanned'
            CHECK (processing_status IN ('scanned', 'analyzed', 'failed')),
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,

        CHECK ((processing_status = 'analyzed') = (embedding IS NOT NULL)),
        CHECK ((processing_status = 'failed') = (last_error IS NOT NULL))
    );

    CREATE INDEX idx_videos_file_path ON videos(file_path);
    CREATE INDEX idx_videos_status ON videos(processing_status);
    CREATE INDEX idx_videos_file_name ON videos(file_name, file_hash);

    -- Keyword index over the descriptive columns
    CREATE VIRTUAL TABLE videos_fts USING fts5(
        file_name,
        scene_description,
        tags,
        mood,
        camera_movement,
        time_of_day,
        gps_place_name,
        content='videos',
        content_rowid='id'
    );

    CREATE TRIGGER videos_ai AFTER INSERT ON videos BEGIN
        INSERT INTO videos_fts(rowid, file_name, scene_description, tags,
                               mood, camera_movement, time_of_day, gps_place_name)
        VALUES (new.id, new.file_name, new.scene_description, new.tags,
                new.mood, new.camera_movement, new.time_of_day, new.gps_place_name);
    END;

    CREATE TRIGGER videos_ad AFTER DELETE ON videos BEGIN
        INSERT INTO videos_fts(videos_fts, rowid, file_name, scene_description, tags,
                               mood, camera_movement, time_of_day, gps_place_name)
        VALUES ('delete', old.id, old.file_name, old.scene_description, old.tags,
                old.mood, old.camera_movement, old.time_of_day, old.gps_place_name);
    END;

    CREATE TRIGGER videos_au AFTER UPDATE ON videos BEGIN
        INSERT INTO videos_fts(videos_fts, rowid, file_name, scene_description, tags,
                               mood, camera_movement, time_of_day, gps_place_name)
        VALUES ('delete', old.id, old.file_name, old.scene_description, old.tags,
                old.mood, old.camera_movement, old.time_of_day, old.gps_place_name);
        INSERT INTO videos_fts(rowid, file_name, scene_description, tags,
                               mood, camera_movement, time_of_day, gps_place_name)
        VALUES (new.id, new.file_name, new.scene_description, new.tags,
                new.mood, new.camera_movement, new.time_of_day, new.gps_place_name);
    END;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a catalog created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Catalog schema version {} is newer than this build supports (max {}). Please upgrade broll.",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    // Apply pending migrations one-by-one
    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}

/// Get current schema version
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}
