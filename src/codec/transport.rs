use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};

/// One encoded media frame on the wire: base64 payload plus mime descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBlob {
    pub data: String,
    pub mime_type: String,
}

impl EncodedBlob {
    pub fn new(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: encode_base64(bytes),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        decode_base64(&self.data)
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| LiveError::Protocol(format!("invalid base64 payload: {}", e)))
}

/// Extracts `rate` from descriptors like `audio/pcm;rate=24000`.
pub fn pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';');
    let kind = parts.next()?.trim();
    if !kind.eq_ignore_ascii_case("audio/pcm") {
        return None;
    }
    parts
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}
