// Database module

pub mod migrations;
pub mod models;
pub mod schema;
pub mod vector;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use rusqlite::Connection;

use crate::constants::{APP_FOLDER, DB_FILENAME, PATH_DB_SEPARATOR};
use crate::error::{BrollError, Result};
use models::{now_rfc3339, Video};
use schema::{BrowsePage, CatalogStats, Ranked};

const INFO_EMBEDDING_DIMENSIONS: &str = "embedding_dimensions";
const INFO_CREATED_AT: &str = "created_at";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Get the database path for a drive root
pub fn get_db_path(drive_root: &Path) -> PathBuf {
    drive_root.join(APP_FOLDER).join(DB_FILENAME)
}

/// Get the .broll folder path for a drive root
pub fn get_app_path(drive_root: &Path) -> PathBuf {
    drive_root.join(APP_FOLDER)
}

/// Open a connection with the catalog PRAGMAs applied. sqlite-vec is
/// registered before the first open so every connection gets it.
pub fn open_connection(db_path: &Path) -> Result<Connection> {
    vector::register_extension();

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    // WAL so readers see committed snapshots while the writer works
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;

    Ok(conn)
}

/// Fail fast on a damaged catalog file
fn integrity_check(conn: &Connection) -> Result<()> {
    let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(BrollError::Store(format!("Catalog integrity check failed: {}", result)));
    }
    Ok(())
}

/// Remove a half-created catalog so a later init can start over
fn discard_on_error<T>(db_path: &Path, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log::warn!("Catalog init failed, removing {}: {}", db_path.display(), e);
        for suffix in ["", "-wal", "-shm"] {
            let mut path = db_path.as_os_str().to_owned();
            path.push(suffix);
            let path = PathBuf::from(path);
            if path.is_file() {
                if let Err(err) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove {}: {}", path.display(), err);
                }
            }
        }
    }
    result
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| BrollError::Store("Catalog connection lock poisoned".to_string()))
}

/// Normalize a browse path into "" or "a/b/"
fn folder_prefix(path: &str) -> String {
    let cleaned = path.trim().replace('\\', "/");
    let cleaned = cleaned.trim_matches(PATH_DB_SEPARATOR);
    if cleaned.is_empty() || cleaned == "." {
        String::new()
    } else {
        format!("{}{}", cleaned, PATH_DB_SEPARATOR)
    }
}

/// The catalog for one drive: a single writer connection plus a reader.
pub struct Catalog {
    drive_root: PathBuf,
    db_path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    embedding_dimensions: usize,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("drive_root", &self.drive_root)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .finish()
    }
}

impl Catalog {
    /// Create `<drive>/.broll/` and a fresh catalog database
    pub fn init(drive_root: &Path, embedding_dimensions: usize) -> Result<Self> {
        if !drive_root.is_dir() {
            return Err(BrollError::Store(format!(
                "Drive root is not a directory: {}",
                drive_root.display()
            )));
        }
        if embedding_dimensions == 0 {
            return Err(BrollError::Store("Embedding dimensions must be positive".to_string()));
        }

        let db_path = get_db_path(drive_root);
        if db_path.exists() {
            return Err(BrollError::CatalogExists(drive_root.display().to_string()));
        }

        std::fs::create_dir_all(get_app_path(drive_root))?;

        let created = Self::create(drive_root, &db_path, embedding_dimensions);
        discard_on_error(&db_path, created)
    }

    fn create(drive_root: &Path, db_path: &Path, embedding_dimensions: usize) -> Result<Self> {
        let writer = open_connection(db_path)?;
        migrations::run_migrations(&writer)?;
        vector::ensure_available(&writer)?;
        schema::set_info(&writer, INFO_EMBEDDING_DIMENSIONS, &embedding_dimensions.to_string())?;
        schema::set_info(&writer, INFO_CREATED_AT, &now_rfc3339())?;

        log::info!("Initialized catalog at {}", db_path.display());

        Self::assemble(drive_root, db_path.to_path_buf(), writer, embedding_dimensions)
    }

    /// Open an existing catalog
    pub fn open(drive_root: &Path) -> Result<Self> {
        let db_path = get_db_path(drive_root);
        if !db_path.is_file() {
            return Err(BrollError::CatalogNotFound(drive_root.display().to_string()));
        }

        let writer = open_connection(&db_path).map_err(|e| {
            BrollError::Store(format!("Cannot open catalog {}: {}", db_path.display(), e))
        })?;
        integrity_check(&writer)?;
        migrations::run_migrations(&writer)?;
        vector::ensure_available(&writer)?;

        let embedding_dimensions = match schema::get_info(&writer, INFO_EMBEDDING_DIMENSIONS)? {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                BrollError::Store(format!("Invalid embedding dimensions in catalog: {:?}", raw))
            })?,
            None => {
                return Err(BrollError::Store(
                    "Catalog is missing its embedding dimensions".to_string(),
                ))
            }
        };

        log::debug!("Opened catalog at {} ({} dims)", db_path.display(), embedding_dimensions);

        Self::assemble(drive_root, db_path, writer, embedding_dimensions)
    }

    fn assemble(drive_root: &Path, db_path: PathBuf, writer: Connection, embedding_dimensions: usize) -> Result<Self> {
        let reader = open_connection(&db_path)?;
        reader.execute_batch("PRAGMA query_only = ON;")?;

        Ok(Catalog {
            drive_root: drive_root.to_path_buf(),
            db_path,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            embedding_dimensions,
        })
    }

    /// Close both connections, surfacing any error SQLite reports
    pub fn close(self) -> Result<()> {
        for conn in [self.reader, self.writer] {
            let conn = conn
                .into_inner()
                .map_err(|_| BrollError::Store("Catalog connection lock poisoned".to_string()))?;
            conn.close().map_err(|(_, e)| BrollError::Database(e))?;
        }
        Ok(())
    }

    pub fn drive_root(&self) -> &Path {
        &self.drive_root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    /// Insert or replace a video in one transaction
    pub fn upsert(&self, video: &Video) -> Result<()> {
        video.validate(self.embedding_dimensions)?;

        let mut conn = lock(&self.writer)?;
        let tx = conn.transaction()?;
        schema::upsert_video(&tx, video)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_by_hash(&self, file_hash: &str) -> Result<Option<Video>> {
        let conn = lock(&self.reader)?;
        schema::get_video(&conn, file_hash)
    }

    /// One page of a folder listing. `page` is zero-based.
    pub fn list_by_path_prefix(&self, path: &str, page: usize, limit: usize) -> Result<BrowsePage> {
        if limit == 0 {
            return Err(BrollError::Query("Page size must be at least 1".to_string()));
        }
        let offset = page
            .checked_mul(limit)
            .ok_or_else(|| BrollError::Query(format!("Page {} is out of range", page)))?;

        let prefix = folder_prefix(path);
        let conn = lock(&self.reader)?;
        let folders = schema::list_folders(&conn, &prefix)?;

        // One extra row tells us whether another page exists
        let mut videos = schema::list_videos_in_folder(&conn, &prefix, limit + 1, offset)?;
        let has_more = videos.len() > limit;
        videos.truncate(limit);

        Ok(BrowsePage {
            path: prefix.trim_end_matches(PATH_DB_SEPARATOR).to_string(),
            folders,
            videos,
            page,
            has_more,
        })
    }

    /// FTS5 relevance search. Text without searchable terms matches nothing.
    pub fn keyword_search(&self, text: &str, limit: usize) -> Result<Vec<Ranked>> {
        let query = match schema::build_fts_query(text) {
            Some(q) if limit > 0 => q,
            _ => return Ok(Vec::new()),
        };
        let conn = lock(&self.reader)?;
        schema::keyword_search(&conn, &query, limit)
    }

    /// Nearest analyzed videos by cosine distance
    pub fn vector_search(&self, embedding: &[f32], k: usize) -> Result<Vec<Ranked>> {
        if embedding.len() != self.embedding_dimensions {
            return Err(BrollError::Query(format!(
                "Query embedding has {} dimensions, catalog expects {}",
                embedding.len(),
                self.embedding_dimensions
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = lock(&self.reader)?;
        schema::vector_search(&conn, embedding, k)
    }

    /// Rows the pipeline should analyze
    pub fn pending(&self, force: bool) -> Result<Vec<Video>> {
        let conn = lock(&self.reader)?;
        schema::pending_videos(&conn, force)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = lock(&self.reader)?;
        schema::get_stats(&conn)
    }

    pub fn hash_index(&self) -> Result<HashMap<String, String>> {
        let conn = lock(&self.reader)?;
        schema::hash_index(&conn)
    }

    pub fn count_analyzed(&self) -> Result<i64> {
        let conn = lock(&self.reader)?;
        schema::count_analyzed(&conn)
    }
}
