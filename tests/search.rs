// Search behaviour over a small analyzed catalog

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use broll_lib::ingest::IngestOptions;
use broll_lib::search::{SearchEngine, SearchMode};
use broll_lib::BrollError;
use common::Drive;

fn library() -> Drive {
    let drive = Drive::new(&[
        ("nature/falls.mp4", "A tall waterfall pours into a river at sunset"),
        ("work/standup.mp4", "Coworkers in an office meeting around a desk"),
        ("work/laptops.mp4", "Close up of laptop keyboards on a conference table"),
        ("city/DJI_0042.MP4", "Aerial view of downtown traffic at night"),
        ("city/IMG_0107.MOV", "Neon lights reflected on a wet street"),
        ("coast/beach.mp4", "Waves rolling onto a sand beach at dusk"),
    ]);
    let result = drive.process(&IngestOptions::default());
    assert_eq!(result.analyzed, 6);
    drive
}

fn paths(hits: &[broll_lib::search::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.video.file_path.as_str()).collect()
}

#[test]
fn test_semantic_ranks_waterfall_above_office() {
    let drive = library();
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    let results = engine.search("waterfall sunset", SearchMode::Semantic, 6).unwrap();
    let order = paths(&results.hits);
    let falls = order.iter().position(|p| *p == "nature/falls.mp4").unwrap();
    let office = order.iter().position(|p| *p == "work/standup.mp4").unwrap();
    assert_eq!(falls, 0);
    assert!(falls < office);
    assert!(results.hits.iter().all(|h| h.matched_semantic && !h.matched_keyword));
}

#[test]
fn test_exact_file_name_ranks_first_in_hybrid() {
    let drive = Drive::new(&[
        ("city/DJI_0042.MP4", "Aerial view of downtown traffic at night"),
        ("city/IMG_0107.MOV", "Neon lights reflected on a wet street"),
        ("nature/falls.mov", "A tall waterfall pours into a river at sunset"),
        ("coast/beach.mov", "Waves rolling onto a sand beach at dusk"),
    ]);
    drive.process(&IngestOptions::default());
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    let results = engine.search("DJI_0042.MP4", SearchMode::Hybrid, 5).unwrap();
    assert_eq!(results.hits[0].video.file_name, "DJI_0042.MP4");
    assert!(results.hits[0].matched_keyword);
    assert!(!results.degraded);
}

#[test]
fn test_keyword_matches_description_and_tags() {
    let drive = library();
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    let results = engine.search("meeting", SearchMode::Keyword, 10).unwrap();
    assert_eq!(paths(&results.hits), vec!["work/standup.mp4"]);

    // Punctuation and FTS syntax in user text is harmless
    let results = engine.search("\"office\" AND (desk*", SearchMode::Keyword, 10).unwrap();
    assert_eq!(results.hits[0].video.file_path, "work/standup.mp4");

    let results = engine.search("!!! ---", SearchMode::Keyword, 10).unwrap();
    assert!(results.hits.is_empty());
}

#[test]
fn test_hybrid_covers_both_legs() {
    let drive = library();
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);
    let query = "sunset over water";

    let keyword = engine.search(query, SearchMode::Keyword, 3).unwrap();
    let semantic = engine.search(query, SearchMode::Semantic, 3).unwrap();
    let hybrid = engine.search(query, SearchMode::Hybrid, 6).unwrap();

    let fused: HashSet<&str> = paths(&hybrid.hits).into_iter().collect();
    for hit in keyword.hits.iter().chain(semantic.hits.iter()) {
        assert!(fused.contains(hit.video.file_path.as_str()), "missing {}", hit.video.file_path);
    }

    // Found by both legs, so it outranks anything found by one
    assert_eq!(hybrid.hits[0].video.file_path, "nature/falls.mp4");
    assert!(hybrid.hits[0].matched_keyword && hybrid.hits[0].matched_semantic);

    let scores: Vec<f64> = hybrid.hits.iter().map(|h| h.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_identical_queries_give_identical_results() {
    let drive = library();
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    for mode in [SearchMode::Hybrid, SearchMode::Keyword, SearchMode::Semantic] {
        let a = engine.search("city at night", mode, 4).unwrap();
        let b = engine.search("city at night", mode, 4).unwrap();
        assert_eq!(paths(&a.hits), paths(&b.hits), "{}", mode);
    }
}

#[test]
fn test_hybrid_degrades_when_embedder_fails() {
    let drive = library();
    drive.embedder.fail.store(true, Ordering::SeqCst);
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    let hybrid = engine.search("waterfall", SearchMode::Hybrid, 5).unwrap();
    assert!(hybrid.degraded);
    assert_eq!(paths(&hybrid.hits), vec!["nature/falls.mp4"]);

    let semantic = engine.search("waterfall", SearchMode::Semantic, 5);
    assert!(matches!(semantic, Err(BrollError::Model { .. })));
}

#[test]
fn test_semantic_skips_unanalyzed_rows() {
    let drive = library();
    common::write_file(drive.root(), "new/waterfall_raw.mp4", "Another waterfall at sunset");
    drive.scan_only();

    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);
    let results = engine.search("waterfall sunset", SearchMode::Semantic, 10).unwrap();
    assert_eq!(results.hits.len(), 6);
    assert!(results.hits.iter().all(|h| h.video.embedding().is_some()));
}

#[test]
fn test_empty_catalog_returns_nothing() {
    let drive = Drive::new(&[]);
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    for mode in [SearchMode::Hybrid, SearchMode::Keyword, SearchMode::Semantic] {
        let results = engine.search("waterfall", mode, 10).unwrap();
        assert!(results.hits.is_empty(), "{}", mode);
    }
    // No analyzed rows means no reason to embed the query
    assert_eq!(drive.embedder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_bad_parameters_are_query_errors() {
    let drive = library();
    let engine = SearchEngine::new(&drive.catalog, &drive.embedder);

    assert!(matches!(engine.search_str("beach", "fuzzy", 5), Err(BrollError::Query(_))));
    assert!(matches!(engine.search("beach", SearchMode::Hybrid, 0), Err(BrollError::Query(_))));
    assert!(engine.search("   ", SearchMode::Hybrid, 5).unwrap().hits.is_empty());
}

#[test]
fn test_pagination_yields_each_video_once() {
    let mut files: Vec<(String, String)> = (0..7)
        .map(|i| (format!("trip/clip_{:02}.mp4", i), format!("Clip number {} of the trip", i)))
        .collect();
    files.push(("trip/day2/later.mp4".to_string(), "Later that day".to_string()));
    files.push(("top.mp4".to_string(), "At the root".to_string()));
    let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();

    let drive = Drive::new(&refs);
    drive.scan_only();

    let mut seen = Vec::new();
    let mut page = 0;
    loop {
        let listing = drive.catalog.list_by_path_prefix("trip", page, 3).unwrap();
        assert_eq!(listing.folders, vec!["day2".to_string()]);
        seen.extend(listing.videos.iter().map(|v| v.file_name.clone()));
        if !listing.has_more {
            break;
        }
        page += 1;
    }

    assert_eq!(page, 2);
    let expected: Vec<String> = (0..7).map(|i| format!("clip_{:02}.mp4", i)).collect();
    assert_eq!(seen, expected);

    let root = drive.catalog.list_by_path_prefix("", 0, 50).unwrap();
    assert_eq!(root.folders, vec!["trip".to_string()]);
    assert_eq!(root.videos.len(), 1);
    assert!(!root.has_more);
}
