// B-Roll Constants
// Changing hashing constants changes every file identity in existing catalogs.

// Hashing
pub const HASH_ALGORITHM: &str = "blake3";
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB
pub const HASH_FAST_SCHEME: &str = "first_last_size_v1";

// Paths
pub const PATH_DB_SEPARATOR: char = '/';
pub const APP_FOLDER: &str = ".broll";
pub const DB_FILENAME: &str = "broll_catalog.db";
pub const LOCK_FILENAME: &str = "process.lock";

// Directories never descended into during a scan (hidden dirs are skipped too)
pub const SKIP_DIRS: [&str; 7] = [
    ".broll",
    ".Spotlight-V100",
    ".fseventsd",
    ".Trashes",
    ".DocumentRevisions-V100",
    "__pycache__",
    ".git",
];

// Video extensions (lowercase)
pub const VIDEO_EXTENSIONS: [&str; 9] = [
    "mp4", "mov", "m4v", "mts", "m2ts", "mkv", "avi", "webm", "3gp",
];

// DJI low-resolution preview extension
pub const LRF_EXTENSION: &str = "lrf";

// Inference defaults (Ollama)
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_VISION_MODEL: &str = "minicpm-v";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "gemma3:4b";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_INFERENCE_RETRIES: u32 = 1;

pub const VISION_TEMPERATURE: f64 = 0.3;
pub const VISION_MAX_TOKENS: u32 = 1024;
pub const CHAT_TEMPERATURE: f64 = 0.7;
pub const CHAT_MAX_TOKENS: u32 = 2048;

// Keyframe extraction
pub const DEFAULT_NUM_KEYFRAMES: usize = 4;
pub const KEYFRAME_WIDTH: u32 = 720;
pub const KEYFRAME_JPEG_QUALITY: u32 = 3; // ffmpeg -q:v, 2-5 is good
pub const MIN_USABLE_DURATION_SECS: f64 = 0.5;
pub const FALLBACK_KEYFRAME_TIMESTAMPS: [f64; 5] = [0.5, 3.0, 8.0, 15.0, 30.0];

// External tool timeouts
pub const FFPROBE_TIMEOUT_SECS: u64 = 30;
pub const FFMPEG_FRAME_TIMEOUT_SECS: u64 = 30;
pub const EXIFTOOL_TIMEOUT_SECS: u64 = 15;

// Analysis validation
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const RAW_DESCRIPTION_CHARS: usize = 500;

pub const CAMERA_MOVEMENTS: [&str; 9] = [
    "static", "pan", "tilt", "tracking", "handheld", "aerial", "gimbal", "dolly", "zoom",
];

pub const TIMES_OF_DAY: [&str; 10] = [
    "dawn", "morning", "midday", "afternoon", "golden_hour", "sunset", "blue_hour", "night",
    "overcast", "indoor",
];

// Search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const RRF_K: f64 = 60.0;
pub const HYBRID_POOL_FACTOR: usize = 3;

// Browsing
pub const DEFAULT_BROWSE_LIMIT: usize = 50;

// Chat
pub const CHAT_CONTEXT_LIMIT: usize = 5;
pub const CHAT_HISTORY_MAX: usize = 20;
pub const CHAT_DESCRIPTION_PREVIEW_CHARS: usize = 200;
pub const NO_MATCHES_ANSWER: &str = "No matching clips were found in the catalog for that question.";

// Source devices
pub const DEVICE_DJI_POCKET3: &str = "dji_pocket3";
pub const DEVICE_IPHONE: &str = "iphone";
pub const DEVICE_UNKNOWN: &str = "unknown";
