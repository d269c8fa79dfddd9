// Ollama HTTP backend

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use crate::config::Config;
use crate::constants::{CHAT_MAX_TOKENS, CHAT_TEMPERATURE, VISION_MAX_TOKENS, VISION_TEMPERATURE};
use crate::db::models::SceneAnalysis;
use crate::error::{BrollError, Result};
use crate::inference::{parse, ChatMessage, Embedder, Generator, Role, VisionAnalyzer};

const ANALYSIS_PROMPT: &str = "These are keyframes from one b-roll clip. An editor will search a catalog \
using your answer, so be concrete about what is on screen.\n\n\
Reply with a single JSON object and nothing else:\n\
{\n\
  \"scene_description\": \"two or three sentences on the subject, action and setting\",\n\
  \"tags\": [\"8 to 12 short tags\"],\n\
  \"mood\": \"one word or short phrase\",\n\
  \"camera_movement\": \"static|pan|tilt|tracking|handheld|aerial|gimbal|dolly|zoom|unknown\",\n\
  \"time_of_day\": \"dawn|morning|midday|afternoon|golden_hour|sunset|blue_hour|night|overcast|indoor|unknown\"\n\
}\n\n\
Good tags name subjects (people, ocean), actions (walking, waves crashing), settings (beach, market), \
visual qualities (bokeh, silhouette), weather (foggy, sunny) and colors (warm tones, neon).";

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: Options,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a local Ollama server. Implements all three capabilities.
pub struct OllamaClient {
    base_url: String,
    vision_model: String,
    embedding_model: String,
    chat_model: String,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.inference_timeout())
            .build()
            .map_err(|e| BrollError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            vision_model: config.vision_model.clone(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            client,
        })
    }

    fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(&self, stage: &str, path: &str, body: &Req) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| transport_error(stage, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BrollError::model(
                stage,
                format!("{} returned {}: {}", url, status, error_text.trim()),
            ));
        }

        // The body can stall after the headers arrive
        response.json().map_err(|e| {
            if e.is_timeout() {
                transport_error(stage, e)
            } else {
                BrollError::model(stage, format!("Failed to parse response: {}", e))
            }
        })
    }
}

fn transport_error(stage: &str, err: reqwest::Error) -> BrollError {
    if err.is_timeout() {
        BrollError::ModelTimeout { stage: stage.to_string() }
    } else {
        BrollError::model(stage, format!("request failed: {}", err))
    }
}

impl VisionAnalyzer for OllamaClient {
    fn analyze(&self, keyframes: &[Vec<u8>]) -> Result<SceneAnalysis> {
        if keyframes.is_empty() {
            return Err(BrollError::model("vision", "no keyframes to analyze"));
        }

        let request = ChatRequest {
            model: &self.vision_model,
            messages: vec![WireMessage {
                role: Role::User,
                content: ANALYSIS_PROMPT,
                images: keyframes.iter().map(|f| STANDARD.encode(f)).collect(),
            }],
            stream: false,
            format: Some("json"),
            options: Options {
                temperature: VISION_TEMPERATURE,
                num_predict: VISION_MAX_TOKENS,
            },
        };

        let reply: ChatReply = self.post("vision", "/api/chat", &request)?;
        parse::parse_analysis(&reply.message.content)
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BrollError::model("embed", "cannot embed empty text"));
        }

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };

        let reply: EmbedReply = self.post("embed", "/api/embed", &request)?;
        reply
            .embeddings
            .into_iter()
            .next()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                BrollError::model("embed", format!("{} returned no embedding", self.embedding_model))
            })
    }
}

impl Generator for OllamaClient {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                    images: Vec::new(),
                })
                .collect(),
            stream: false,
            format: None,
            options: Options {
                temperature: CHAT_TEMPERATURE,
                num_predict: CHAT_MAX_TOKENS,
            },
        };

        let reply: ChatReply = self.post("chat", "/api/chat", &request)?;
        let answer = reply.message.content.trim().to_string();
        if answer.is_empty() {
            return Err(BrollError::model("chat", "model returned an empty reply"));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "minicpm-v",
            messages: vec![WireMessage {
                role: Role::User,
                content: "hi",
                images: vec![STANDARD.encode([0xFFu8, 0xD8])],
            }],
            stream: false,
            format: Some("json"),
            options: Options { temperature: 0.3, num_predict: 10 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["images"][0], "/9g=");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 10);
    }

    #[test]
    fn test_text_message_omits_images() {
        let msg = WireMessage { role: Role::System, content: "be brief", images: Vec::new() };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("images").is_none());
    }

    #[test]
    fn test_unreachable_server_is_model_error() {
        let config = Config {
            ollama_url: "http://127.0.0.1:9".to_string(),
            inference_timeout_secs: 2,
            ..Config::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        let err = client.embed("waterfall").unwrap_err();
        assert!(err.is_model());
    }

    #[test]
    fn test_stalled_body_is_timeout() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"embeddings\": [[",
            );
            let _ = stream.flush();
            std::thread::sleep(std::time::Duration::from_secs(4));
        });

        let config = Config {
            ollama_url: format!("http://{}", addr),
            inference_timeout_secs: 1,
            ..Config::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        let err = client.embed("waterfall").unwrap_err();
        assert!(matches!(err, BrollError::ModelTimeout { ref stage } if stage == "embed"), "{}", err);
    }
}
