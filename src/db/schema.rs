// Database query helpers for the videos table

use std::collections::{BTreeMap, HashMap};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use crate::db::models::{Processing, ProcessingStatus, SceneAnalysis, TagSet, Video};
use crate::db::vector::{decode_embedding, encode_embedding};
use crate::error::Result;
use crate::metadata::GpsLocation;

/// Column list shared by every video query. Queries alias the table as `v`;
/// any extra score column follows at index 26.
pub const VIDEO_COLUMNS: &str = "v.file_hash, v.file_path, v.file_name, v.file_size, v.source_device,
    v.lrf_path, v.duration_seconds, v.resolution, v.width, v.height, v.fps, v.codec,
    v.creation_date, v.gps_latitude, v.gps_longitude, v.gps_place_name,
    v.scene_description, v.tags, v.mood, v.camera_movement, v.time_of_day,
    v.embedding, v.processing_status, v.last_error, v.created_at, v.updated_at";

const SCORE_COLUMN: usize = 26;

/// A video paired with a leg score (bm25 relevance or cosine similarity)
#[derive(Debug, Clone)]
pub struct Ranked {
    pub video: Video,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowsePage {
    pub path: String,
    pub folders: Vec<String>,
    pub videos: Vec<Video>,
    pub page: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogStats {
    pub total: i64,
    pub scanned: i64,
    pub analyzed: i64,
    pub failed: i64,
    pub total_size_bytes: i64,
    pub total_duration_seconds: f64,
    pub devices: BTreeMap<String, i64>,
    pub geotagged: i64,
    pub embedded: i64,
}

fn conversion_error(idx: usize, err: crate::error::BrollError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Map a row selected with VIDEO_COLUMNS
pub fn map_video(row: &Row) -> rusqlite::Result<Video> {
    let status: String = row.get(22)?;
    let status: ProcessingStatus = status.parse().map_err(|e| conversion_error(22, e))?;

    let processing = match status {
        ProcessingStatus::Scanned => Processing::Scanned,
        ProcessingStatus::Failed => Processing::Failed {
            error: row.get::<_, Option<String>>(23)?.unwrap_or_default(),
        },
        ProcessingStatus::Analyzed => {
            let blob: Vec<u8> = row.get(21)?;
            let embedding = decode_embedding(&blob).map_err(|e| conversion_error(21, e))?;
            let tags: Option<String> = row.get(17)?;
            Processing::Analyzed {
                analysis: SceneAnalysis {
                    scene_description: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
                    tags: tags.map(|t| TagSet::from_json(&t)).unwrap_or_default(),
                    mood: row.get(18)?,
                    camera_movement: row.get(19)?,
                    time_of_day: row.get(20)?,
                },
                embedding,
            }
        }
    };

    let lat: Option<f64> = row.get(13)?;
    let lon: Option<f64> = row.get(14)?;
    let gps = match (lat, lon) {
        (Some(latitude), Some(longitude)) => Some(GpsLocation {
            latitude,
            longitude,
            place_name: row.get(15)?,
        }),
        _ => None,
    };

    Ok(Video {
        file_hash: row.get(0)?,
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        source_device: row.get(4)?,
        lrf_path: row.get(5)?,
        duration_seconds: row.get(6)?,
        resolution: row.get(7)?,
        width: row.get(8)?,
        height: row.get(9)?,
        fps: row.get(10)?,
        codec: row.get(11)?,
        creation_date: row.get(12)?,
        gps,
        processing,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

fn map_ranked(row: &Row) -> rusqlite::Result<Ranked> {
    Ok(Ranked {
        video: map_video(row)?,
        score: row.get(SCORE_COLUMN)?,
    })
}

// ----- Writes -----

/// Insert or fully replace the row keyed by file_hash. created_at is kept
/// from the first insert.
pub fn upsert_video(conn: &Connection, video: &Video) -> Result<()> {
    let analysis = video.analysis();
    let embedding = video.embedding().map(encode_embedding);
    let tags = analysis.map(|a| a.tags.to_json());

    conn.execute(
        "INSERT INTO videos (
            file_hash, file_path, file_name, file_size, source_device, lrf_path,
            duration_seconds, resolution, width, height, fps, codec, creation_date,
            gps_latitude, gps_longitude, gps_place_name,
            scene_description, tags, mood, camera_movement, time_of_day,
            embedding, processing_status, last_error, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
        ON CONFLICT(file_hash) DO UPDATE SET
            file_path = excluded.file_path,
            file_name = excluded.file_name,
            file_size = excluded.file_size,
            source_device = excluded.source_device,
            lrf_path = excluded.lrf_path,
            duration_seconds = excluded.duration_seconds,
            resolution = excluded.resolution,
            width = excluded.width,
            height = excluded.height,
            fps = excluded.fps,
            codec = excluded.codec,
            creation_date = excluded.creation_date,
            gps_latitude = excluded.gps_latitude,
            gps_longitude = excluded.gps_longitude,
            gps_place_name = excluded.gps_place_name,
            scene_description = excluded.scene_description,
            tags = excluded.tags,
            mood = excluded.mood,
            camera_movement = excluded.camera_movement,
            time_of_day = excluded.time_of_day,
            embedding = excluded.embedding,
            processing_status = excluded.processing_status,
            last_error = excluded.last_error,
            updated_at = excluded.updated_at",
        params![
            video.file_hash,
            video.file_path,
            video.file_name,
            video.file_size,
            video.source_device,
            video.lrf_path,
            video.duration_seconds,
            video.resolution,
            video.width,
            video.height,
            video.fps,
            video.codec,
            video.creation_date,
            video.gps.as_ref().map(|g| g.latitude),
            video.gps.as_ref().map(|g| g.longitude),
            video.place_name(),
            analysis.map(|a| a.scene_description.as_str()),
            tags,
            analysis.and_then(|a| a.mood.as_deref()),
            analysis.and_then(|a| a.camera_movement.as_deref()),
            analysis.and_then(|a| a.time_of_day.as_deref()),
            embedding,
            video.status().as_str(),
            video.last_error(),
            video.created_at,
            video.updated_at,
        ],
    )?;
    Ok(())
}

pub fn set_info(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO catalog_info (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_info(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM catalog_info WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

// ----- Reads -----

pub fn get_video(conn: &Connection, file_hash: &str) -> Result<Option<Video>> {
    let sql = format!("SELECT {} FROM videos v WHERE v.file_hash = ?1", VIDEO_COLUMNS);
    let video = conn.query_row(&sql, params![file_hash], map_video).optional()?;
    Ok(video)
}

/// Immediate child folder names under `prefix` ("" or "a/b/")
pub fn list_folders(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT substr(rest, 1, instr(rest, '/') - 1) AS folder FROM (
             SELECT substr(file_path, length(?1) + 1) AS rest FROM videos
             WHERE substr(file_path, 1, length(?1)) = ?1
         )
         WHERE instr(rest, '/') > 1
         ORDER BY folder",
    )?;
    let folders = stmt
        .query_map(params![prefix], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(folders)
}

/// Videos directly inside `prefix`, ordered by file_name then file_hash
pub fn list_videos_in_folder(conn: &Connection, prefix: &str, limit: usize, offset: usize) -> Result<Vec<Video>> {
    let sql = format!(
        "SELECT {} FROM videos v
         WHERE substr(v.file_path, 1, length(?1)) = ?1
           AND instr(substr(v.file_path, length(?1) + 1), '/') = 0
         ORDER BY v.file_name ASC, v.file_hash ASC
         LIMIT ?2 OFFSET ?3",
        VIDEO_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let videos = stmt
        .query_map(params![prefix, limit as i64, offset as i64], map_video)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(videos)
}

/// Split user text into tokens the way FTS5's unicode61 tokenizer does,
/// then quote each one so no FTS operator syntax survives.
pub fn build_fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Keyword search over the FTS index. Score is the negated bm25 value, so
/// higher means more relevant.
pub fn keyword_search(conn: &Connection, fts_query: &str, limit: usize) -> Result<Vec<Ranked>> {
    let sql = format!(
        "SELECT {}, -bm25(videos_fts) AS score
         FROM videos_fts JOIN videos v ON v.id = videos_fts.rowid
         WHERE videos_fts MATCH ?1
         ORDER BY bm25(videos_fts) ASC, v.updated_at DESC, v.file_hash ASC
         LIMIT ?2",
        VIDEO_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params![fts_query, limit as i64], map_ranked)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hits)
}

/// Nearest analyzed rows by cosine distance. Score is 1 - distance.
pub fn vector_search(conn: &Connection, query: &[f32], k: usize) -> Result<Vec<Ranked>> {
    let sql = format!(
        "SELECT {}, 1.0 - COALESCE(vec_distance_cosine(v.embedding, ?1), 2.0) AS score
         FROM videos v
         WHERE v.processing_status = 'analyzed' AND v.embedding IS NOT NULL
         ORDER BY score DESC, v.file_hash ASC
         LIMIT ?2",
        VIDEO_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params![encode_embedding(query), k as i64], map_ranked)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hits)
}

/// Rows needing analysis, ordered by path
pub fn pending_videos(conn: &Connection, force: bool) -> Result<Vec<Video>> {
    let filter = if force {
        ""
    } else {
        "WHERE v.processing_status IN ('scanned', 'failed')"
    };
    let sql = format!(
        "SELECT {} FROM videos v {} ORDER BY v.file_path ASC, v.file_hash ASC",
        VIDEO_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let videos = stmt
        .query_map([], map_video)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(videos)
}

/// file_hash -> file_path for every known video
pub fn hash_index(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT file_hash, file_path FROM videos")?;
    let index = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<String, String>>>()?;
    Ok(index)
}

pub fn count_analyzed(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM videos WHERE processing_status = 'analyzed'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn get_stats(conn: &Connection) -> Result<CatalogStats> {
    let mut stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(processing_status = 'scanned'), 0),
            COALESCE(SUM(processing_status = 'analyzed'), 0),
            COALESCE(SUM(processing_status = 'failed'), 0),
            COALESCE(SUM(file_size), 0),
            COALESCE(SUM(duration_seconds), 0.0),
            COALESCE(SUM(gps_latitude IS NOT NULL AND gps_longitude IS NOT NULL), 0),
            COALESCE(SUM(embedding IS NOT NULL), 0)
         FROM videos",
        [],
        |row| {
            Ok(CatalogStats {
                total: row.get(0)?,
                scanned: row.get(1)?,
                analyzed: row.get(2)?,
                failed: row.get(3)?,
                total_size_bytes: row.get(4)?,
                total_duration_seconds: row.get(5)?,
                geotagged: row.get(6)?,
                embedded: row.get(7)?,
                devices: BTreeMap::new(),
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT source_device, COUNT(*) FROM videos GROUP BY source_device ORDER BY source_device",
    )?;
    stats.devices = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::metadata::MediaMetadata;

    fn setup() -> Connection {
        crate::db::vector::register_extension();
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn video(hash: &str, path: &str) -> Video {
        Video::scanned(hash, path, 10, "unknown", None, MediaMetadata::default())
    }

    fn analyzed(hash: &str, path: &str, description: &str, embedding: Vec<f32>) -> Video {
        video(hash, path)
            .into_analyzed(
                SceneAnalysis {
                    scene_description: description.to_string(),
                    tags: TagSet::new(["outdoor"]),
                    ..Default::default()
                },
                embedding,
            )
            .unwrap()
    }

    #[test]
    fn test_upsert_roundtrip_and_replace() {
        let conn = setup();
        let v = video("h1", "a/clip.mp4");
        upsert_video(&conn, &v).unwrap();
        let stored = get_video(&conn, "h1").unwrap().unwrap();
        assert_eq!(stored, v);

        let done = v.into_analyzed(SceneAnalysis::default(), vec![1.0, 0.0]).unwrap();
        upsert_video(&conn, &done).unwrap();
        let stored = get_video(&conn, "h1").unwrap().unwrap();
        assert_eq!(stored.status(), ProcessingStatus::Analyzed);
        assert_eq!(stored.embedding(), Some(&[1.0f32, 0.0][..]));
        assert_eq!(stored.created_at, done.created_at);

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM videos", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_folders_and_direct_videos() {
        let conn = setup();
        for (hash, path) in [
            ("h1", "root.mp4"),
            ("h2", "trips/a.mp4"),
            ("h3", "trips/kyoto/b.mp4"),
            ("h4", "trips/osaka/c.mp4"),
            ("h5", "work/d.mp4"),
        ] {
            upsert_video(&conn, &video(hash, path)).unwrap();
        }

        assert_eq!(list_folders(&conn, "").unwrap(), vec!["trips", "work"]);
        assert_eq!(list_folders(&conn, "trips/").unwrap(), vec!["kyoto", "osaka"]);

        let root = list_videos_in_folder(&conn, "", 10, 0).unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].file_path, "root.mp4");

        let trips = list_videos_in_folder(&conn, "trips/", 10, 0).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].file_path, "trips/a.mp4");
    }

    #[test]
    fn test_build_fts_query() {
        assert_eq!(build_fts_query("DJI_0042.MP4").as_deref(), Some("\"DJI\" OR \"0042\" OR \"MP4\""));
        assert_eq!(build_fts_query("sunset AND \"beach"), Some("\"sunset\" OR \"AND\" OR \"beach\"".to_string()));
        assert_eq!(build_fts_query("  *** "), None);
    }

    #[test]
    fn test_keyword_search_ranks_matches() {
        let conn = setup();
        upsert_video(&conn, &analyzed("h1", "beach.mp4", "Waves on a sandy beach", vec![1.0, 0.0])).unwrap();
        upsert_video(&conn, &analyzed("h2", "city.mp4", "Traffic at night downtown", vec![0.0, 1.0])).unwrap();

        let hits = keyword_search(&conn, &build_fts_query("beach waves").unwrap(), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video.file_hash, "h1");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_vector_search_skips_unanalyzed() {
        let conn = setup();
        upsert_video(&conn, &analyzed("h1", "a.mp4", "a", vec![1.0, 0.0])).unwrap();
        upsert_video(&conn, &analyzed("h2", "b.mp4", "b", vec![0.0, 1.0])).unwrap();
        upsert_video(&conn, &video("h3", "c.mp4")).unwrap();

        let hits = vector_search(&conn, &[0.9, 0.1], 10).unwrap();
        let order: Vec<_> = hits.iter().map(|h| h.video.file_hash.as_str()).collect();
        assert_eq!(order, vec!["h1", "h2"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_keyword_ties_prefer_newer_rows() {
        let conn = setup();
        let mut older = analyzed("h2", "a.mp4", "Pine forest in fog", vec![1.0, 0.0]);
        older.updated_at = "2024-01-01T00:00:00+00:00".to_string();
        let mut newer = analyzed("h3", "b.mp4", "Pine forest in fog", vec![1.0, 0.0]);
        newer.updated_at = "2024-06-01T00:00:00+00:00".to_string();
        let mut same_time = analyzed("h1", "c.mp4", "Pine forest in fog", vec![1.0, 0.0]);
        same_time.updated_at = "2024-01-01T00:00:00+00:00".to_string();
        for v in [&older, &newer, &same_time] {
            upsert_video(&conn, v).unwrap();
        }

        let hits = keyword_search(&conn, &build_fts_query("forest").unwrap(), 10).unwrap();
        assert!(hits.windows(2).all(|w| w[0].score == w[1].score));
        let order: Vec<_> = hits.iter().map(|h| h.video.file_hash.as_str()).collect();
        assert_eq!(order, vec!["h3", "h1", "h2"]);
    }

    #[test]
    fn test_vector_ties_break_by_hash() {
        let conn = setup();
        for hash in ["h3", "h1", "h2"] {
            upsert_video(&conn, &analyzed(hash, &format!("{}.mp4", hash), "same", vec![0.6, 0.8])).unwrap();
        }

        let hits = vector_search(&conn, &[0.6, 0.8], 10).unwrap();
        assert!(hits.windows(2).all(|w| w[0].score == w[1].score));
        let order: Vec<_> = hits.iter().map(|h| h.video.file_hash.as_str()).collect();
        assert_eq!(order, vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn test_pending_and_stats() {
        let conn = setup();
        upsert_video(&conn, &analyzed("h1", "a.mp4", "a", vec![1.0, 0.0])).unwrap();
        upsert_video(&conn, &video("h2", "b.mp4")).unwrap();
        upsert_video(&conn, &video("h3", "c.mp4").into_failed("[probe] c.mp4: bad").unwrap()).unwrap();

        let pending: Vec<_> = pending_videos(&conn, false).unwrap().into_iter().map(|v| v.file_hash).collect();
        assert_eq!(pending, vec!["h2", "h3"]);
        assert_eq!(pending_videos(&conn, true).unwrap().len(), 3);

        let stats = get_stats(&conn).unwrap();
        assert_eq!((stats.total, stats.scanned, stats.analyzed, stats.failed), (3, 1, 1, 1));
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.total_size_bytes, 30);
        assert_eq!(stats.devices.get("unknown"), Some(&3));

        assert_eq!(hash_index(&conn).unwrap().len(), 3);
        assert_eq!(count_analyzed(&conn).unwrap(), 1);
    }
}
