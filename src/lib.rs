// B-Roll library entry point

pub mod constants;
pub mod error;
pub mod config;
pub mod tools;
pub mod db;
pub mod hash;
pub mod metadata;
pub mod inference;
pub mod ingest;
pub mod search;
pub mod chat;

pub use chat::{ChatOutcome, ChatResponse, ChatSynthesizer};
pub use config::Config;
pub use db::Catalog;
pub use error::{BrollError, Result};
pub use inference::{ChatMessage, Embedder, Generator, InferenceGate, OllamaClient, VisionAnalyzer};
pub use ingest::{IngestOptions, IngestResult, Pipeline};
pub use metadata::{MediaProbe, ToolProbe};
pub use search::{SearchEngine, SearchMode, SearchResults};
