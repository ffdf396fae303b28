//! Runtime configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! `SOLO_LIVE__*` environment variables. A `.env` file is honoured, and
//! `GEMINI_API_KEY` / `API_KEY` fill in the credential when nothing else does.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};
use crate::kernel::event::{FacingMode, LiveMode};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const CAMERA_INSTRUCTION: &str = "You are Solo AI, a helpful AI assistant. Your task is to observe the user's surroundings through their camera and describe what you see. Respond to their questions and comments about the objects and environment in the video feed. Keep your descriptions concise and engaging.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Default,
    Formal,
    Friendly,
    Witty,
}

impl Personality {
    pub fn name(&self) -> &'static str {
        match self {
            Personality::Default => "Solo AI",
            Personality::Formal => "Formal",
            Personality::Friendly => "Friendly",
            Personality::Witty => "Witty",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Personality::Default => "You are Solo AI, a futuristic and helpful AI assistant. You are concise, knowledgeable, and slightly futuristic in your tone.",
            Personality::Formal => "You are a professional assistant. Your responses should be structured, polite, and use formal language. Avoid slang and colloquialisms.",
            Personality::Friendly => "You are a friendly and approachable companion. Your tone should be warm, encouraging, and conversational. Feel free to use emojis.",
            Personality::Witty => "You are a witty AI with a dry sense of humor. Your responses should be clever, sarcastic, and entertaining, while still being helpful.",
        }
    }
}

impl std::str::FromStr for Personality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Personality::Default),
            "formal" => Ok(Personality::Formal),
            "friendly" => Ok(Personality::Friendly),
            "witty" => Ok(Personality::Witty),
            other => Err(format!("unknown personality '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    pub personality: Personality,

    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    /// Samples per outbound audio frame.
    pub frame_size: usize,

    pub video_fps: u32,
    /// 1..=100
    pub jpeg_quality: u8,
    /// Longest edge of outbound stills; `None` keeps the camera resolution.
    pub max_frame_dimension: Option<u32>,

    pub connect_timeout_secs: u64,
    pub outbound_capacity: usize,

    pub camera_user_index: u32,
    pub camera_environment_index: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            personality: Personality::Default,
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            output_channels: 1,
            frame_size: 4096,
            video_fps: 2,
            jpeg_quality: 70,
            max_frame_dimension: None,
            connect_timeout_secs: 15,
            outbound_capacity: 64,
            camera_user_index: 0,
            camera_environment_index: 1,
        }
    }
}

impl LiveConfig {
    /// Loads defaults, then `path` (if it exists), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("SOLO_LIVE")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: LiveConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LiveError::Config(e.to_string()))?;

        if cfg.api_key.is_empty() {
            cfg.api_key = std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .unwrap_or_default();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(LiveError::Config("sample rates must be non-zero".into()));
        }
        if self.output_channels == 0 {
            return Err(LiveError::Config("output_channels must be non-zero".into()));
        }
        if self.frame_size == 0 {
            return Err(LiveError::Config("frame_size must be non-zero".into()));
        }
        if self.video_fps == 0 {
            return Err(LiveError::Config("video_fps must be non-zero".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(LiveError::Config(format!(
                "jpeg_quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.outbound_capacity == 0 {
            return Err(LiveError::Config("outbound_capacity must be non-zero".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.video_fps.max(1) as u64)
    }

    pub fn camera_index(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::User => self.camera_user_index,
            FacingMode::Environment => self.camera_environment_index,
        }
    }

    pub fn system_instruction(&self, mode: LiveMode) -> &'static str {
        match mode {
            LiveMode::Voice => self.personality.instruction(),
            LiveMode::Camera(_) => CAMERA_INSTRUCTION,
        }
    }

    /// Only the camera view shows a transcription.
    pub fn wants_transcription(&self, mode: LiveMode) -> bool {
        matches!(mode, LiveMode::Camera(_))
    }
}
