// Hybrid search: FTS5 keyword leg, vector leg, and reciprocal-rank fusion

pub mod fusion;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::constants::{HYBRID_POOL_FACTOR, RRF_K};
use crate::db::models::Video;
use crate::db::schema::Ranked;
use crate::db::Catalog;
use crate::error::{BrollError, Result};
use crate::inference::{validate_embedding, Embedder};
use fusion::reciprocal_rank_fusion;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Semantic,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = BrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Ok(SearchMode::Hybrid),
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            other => Err(BrollError::Query(format!(
                "Unknown search mode {:?} (expected hybrid, keyword or semantic)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub video: Video,
    /// Fused RRF score in hybrid mode, otherwise the leg's own score
    pub score: f64,
    pub matched_keyword: bool,
    pub matched_semantic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub mode: SearchMode,
    pub hits: Vec<SearchHit>,
    /// The semantic leg failed and only keyword results are included
    pub degraded: bool,
}

impl SearchResults {
    fn empty(mode: SearchMode) -> Self {
        Self { mode, hits: Vec::new(), degraded: false }
    }
}

/// Read-only search over one catalog
pub struct SearchEngine<'a> {
    catalog: &'a Catalog,
    embedder: &'a dyn Embedder,
}

impl<'a> SearchEngine<'a> {
    pub fn new(catalog: &'a Catalog, embedder: &'a dyn Embedder) -> Self {
        Self { catalog, embedder }
    }

    /// Search with a mode given as text ("hybrid", "keyword", "semantic")
    pub fn search_str(&self, query: &str, mode: &str, limit: usize) -> Result<SearchResults> {
        self.search(query, mode.parse()?, limit)
    }

    pub fn search(&self, query: &str, mode: SearchMode, limit: usize) -> Result<SearchResults> {
        if limit == 0 {
            return Err(BrollError::Query("Result limit must be at least 1".to_string()));
        }
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::empty(mode));
        }

        log::debug!("Search {:?} mode={} limit={}", query, mode, limit);

        match mode {
            SearchMode::Keyword => Ok(SearchResults {
                mode,
                hits: self
                    .catalog
                    .keyword_search(query, limit)?
                    .into_iter()
                    .map(|r| leg_hit(r, true))
                    .collect(),
                degraded: false,
            }),
            SearchMode::Semantic => Ok(SearchResults {
                mode,
                hits: self
                    .semantic_leg(query, limit)?
                    .into_iter()
                    .map(|r| leg_hit(r, false))
                    .collect(),
                degraded: false,
            }),
            SearchMode::Hybrid => self.hybrid(query, limit),
        }
    }

    /// Nearest analyzed videos to the embedded query
    fn semantic_leg(&self, query: &str, k: usize) -> Result<Vec<Ranked>> {
        // Nothing to compare against; skip the model call
        if self.catalog.count_analyzed()? == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query)?;
        let embedding = validate_embedding(embedding, self.catalog.embedding_dimensions(), "embed")?;
        self.catalog.vector_search(&embedding, k)
    }

    fn hybrid(&self, query: &str, limit: usize) -> Result<SearchResults> {
        let pool = limit.saturating_mul(HYBRID_POOL_FACTOR);

        let keyword = self.catalog.keyword_search(query, pool)?;
        let (semantic, degraded) = match self.semantic_leg(query, pool) {
            Ok(hits) => (hits, false),
            Err(e) if e.is_model() => {
                log::warn!("Semantic search unavailable, using keyword results only: {}", e);
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        };

        let keyword_hashes: Vec<&str> = keyword.iter().map(|r| r.video.file_hash.as_str()).collect();
        let semantic_hashes: Vec<&str> = semantic.iter().map(|r| r.video.file_hash.as_str()).collect();
        let fused = reciprocal_rank_fusion(&keyword_hashes, &semantic_hashes, RRF_K);

        let mut videos: HashMap<String, Video> = HashMap::new();
        for ranked in keyword.into_iter().chain(semantic) {
            videos.entry(ranked.video.file_hash.clone()).or_insert(ranked.video);
        }

        let hits = fused
            .into_iter()
            .take(limit)
            .filter_map(|f| {
                videos.remove(&f.file_hash).map(|video| SearchHit {
                    video,
                    score: f.score,
                    matched_keyword: f.keyword_rank.is_some(),
                    matched_semantic: f.semantic_rank.is_some(),
                })
            })
            .collect();

        Ok(SearchResults {
            mode: SearchMode::Hybrid,
            hits,
            degraded,
        })
    }
}

fn leg_hit(ranked: Ranked, keyword: bool) -> SearchHit {
    SearchHit {
        video: ranked.video,
        score: ranked.score,
        matched_keyword: keyword,
        matched_semantic: !keyword,
    }
}
