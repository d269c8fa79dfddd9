// Question answering grounded in catalog search results

use serde::{Deserialize, Serialize};

use crate::constants::{CHAT_CONTEXT_LIMIT, CHAT_DESCRIPTION_PREVIEW_CHARS, CHAT_HISTORY_MAX, NO_MATCHES_ANSWER};
use crate::db::models::Video;
use crate::db::Catalog;
use crate::error::{BrollError, Result};
use crate::hash::short_hash;
use crate::inference::{ChatMessage, Embedder, Generator, Role};
use crate::search::{SearchEngine, SearchMode};

const SYSTEM_PROMPT: &str = "You help a video editor find footage in their b-roll catalog. \
Each question comes with the catalog clips that matched it. Refer to clips by file name so the \
editor can locate them. Only describe clips from the list you are given; if none of them fit, \
say so plainly. Keep answers short and practical.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatOutcome {
    Answered,
    /// Retrieval found nothing, so the model was not called
    NoMatches,
    /// Retrieval worked but the model call failed
    Failed,
}

/// A retrieved clip as shown alongside an answer
#[derive(Debug, Clone, Serialize)]
pub struct ChatClip {
    pub file_hash: String,
    pub file_name: String,
    pub file_path: String,
    pub scene_description: String,
    pub duration_seconds: Option<f64>,
    pub place_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub outcome: ChatOutcome,
    pub answer: String,
    /// file_hash values, always a subset of `clips`
    pub cited_ids: Vec<String>,
    pub clips: Vec<ChatClip>,
    pub error: Option<String>,
}

pub struct ChatSynthesizer<'a> {
    engine: SearchEngine<'a>,
    generator: &'a dyn Generator,
}

impl<'a> ChatSynthesizer<'a> {
    pub fn new(catalog: &'a Catalog, embedder: &'a dyn Embedder, generator: &'a dyn Generator) -> Self {
        Self {
            engine: SearchEngine::new(catalog, embedder),
            generator,
        }
    }

    /// Answer a question using up to CHAT_CONTEXT_LIMIT retrieved clips.
    /// Only the last CHAT_HISTORY_MAX turns of `history` are sent.
    pub fn ask(&self, question: &str, history: &[ChatMessage]) -> Result<ChatResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(BrollError::Query("Question is empty".to_string()));
        }

        let results = self.engine.search(question, SearchMode::Hybrid, CHAT_CONTEXT_LIMIT)?;
        let grounded: Vec<&Video> = results
            .hits
            .iter()
            .map(|h| &h.video)
            .filter(|v| description(v).is_some())
            .collect();

        if grounded.is_empty() {
            log::info!("No catalog matches for question, skipping model call");
            return Ok(ChatResponse {
                outcome: ChatOutcome::NoMatches,
                answer: NO_MATCHES_ANSWER.to_string(),
                cited_ids: Vec::new(),
                clips: Vec::new(),
                error: None,
            });
        }

        let clips: Vec<ChatClip> = grounded.iter().map(|v| to_clip(v)).collect();
        let messages = build_messages(question, history, &build_context(&grounded));

        match self.generator.generate(&messages) {
            Ok(answer) => Ok(ChatResponse {
                outcome: ChatOutcome::Answered,
                cited_ids: cite(&answer, &grounded),
                answer,
                clips,
                error: None,
            }),
            Err(e) if e.is_model() => {
                log::error!("Chat model failed: {}", e);
                Ok(ChatResponse {
                    outcome: ChatOutcome::Failed,
                    answer: String::new(),
                    cited_ids: Vec::new(),
                    clips,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn description(video: &Video) -> Option<&str> {
    video
        .analysis()
        .map(|a| a.scene_description.trim())
        .filter(|d| !d.is_empty())
}

fn to_clip(video: &Video) -> ChatClip {
    ChatClip {
        file_hash: video.file_hash.clone(),
        file_name: video.file_name.clone(),
        file_path: video.file_path.clone(),
        scene_description: description(video)
            .unwrap_or_default()
            .chars()
            .take(CHAT_DESCRIPTION_PREVIEW_CHARS)
            .collect(),
        duration_seconds: video.duration_seconds,
        place_name: video.place_name().map(str::to_string),
    }
}

/// One line per clip: name, duration, description, tags, place, mood
pub fn build_context(videos: &[&Video]) -> String {
    let mut lines = Vec::new();
    for video in videos {
        let Some(desc) = description(video) else { continue };
        let mut line = format!("- {}", video.file_name);

        if let Some(duration) = video.duration_seconds.filter(|d| *d > 0.0) {
            let total = duration as u64;
            line.push_str(&format!(" ({}:{:02})", total / 60, total % 60));
        }
        line.push_str(&format!(": {}", desc));

        if let Some(analysis) = video.analysis() {
            if !analysis.tags.is_empty() {
                line.push_str(&format!(" [Tags: {}]", analysis.tags.join(", ")));
            }
            if let Some(place) = video.place_name() {
                line.push_str(&format!(" [Location: {}]", place));
            }
            if let Some(mood) = &analysis.mood {
                line.push_str(&format!(" [Mood: {}]", mood));
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn build_messages(question: &str, history: &[ChatMessage], context: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

    // Prior turns only; callers cannot inject another system prompt
    let turns: Vec<&ChatMessage> = history.iter().filter(|m| m.role != Role::System).collect();
    let start = turns.len().saturating_sub(CHAT_HISTORY_MAX);
    messages.extend(turns[start..].iter().map(|m| (*m).clone()));

    messages.push(ChatMessage::user(format!(
        "Clips from the catalog that match:\n\n{}\n\nQuestion: {}",
        context, question
    )));
    messages
}

/// Clips the answer mentions by file name, stem or short hash. An answer that
/// names none of them is grounded in all of them.
fn cite(answer: &str, videos: &[&Video]) -> Vec<String> {
    let answer = answer.to_lowercase();
    let mentioned: Vec<String> = videos
        .iter()
        .filter(|v| {
            let name = v.file_name.to_lowercase();
            let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&name);
            answer.contains(&name)
                || (stem.len() >= 3 && answer.contains(stem))
                || answer.contains(short_hash(&v.file_hash))
        })
        .map(|v| v.file_hash.clone())
        .collect();

    if mentioned.is_empty() {
        videos.iter().map(|v| v.file_hash.clone()).collect()
    } else {
        mentioned
    }
}
