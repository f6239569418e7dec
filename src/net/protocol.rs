use serde::{Deserialize, Serialize};

use crate::audio::codec::{self, InboundAudioChunk};
use crate::error::{ParleyError, Result};

/// Base64 audio carried inline in a JSON message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAudio {
    pub data: String,
    pub mime_type: String,
}

/// One message from the remote model. Every field is optional.
///
/// ```text
/// { "inputTranscriptFragment": "...", "outputTranscriptFragment": "...",
///   "turnComplete": true, "interrupted": false,
///   "audio": { "data": "<base64>", "mimeType": "audio/pcm;rate=24000" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub input_transcript_fragment: Option<String>,

    #[serde(default)]
    pub output_transcript_fragment: Option<String>,

    #[serde(default)]
    pub turn_complete: Option<bool>,

    #[serde(default)]
    pub interrupted: Option<bool>,

    #[serde(default)]
    pub audio: Option<InlineAudio>,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ParleyError::Codec(format!("malformed server message: {e}")))
    }

    #[must_use]
    pub fn turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }

    /// Decode the inline audio payload, if the message carries one.
    pub fn audio_chunk(&self, default_rate: u32) -> Result<Option<InboundAudioChunk>> {
        self.audio
            .as_ref()
            .map(|audio| codec::decode(&audio.data, &audio.mime_type, default_rate))
            .transpose()
    }
}

/// Outbound message carrying one captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientMessage {
    pub audio: InlineAudio,
}

impl ClientMessage {
    #[must_use]
    pub fn audio(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            audio: InlineAudio {
                data: codec::encode(samples),
                mime_type: codec::pcm_mime(sample_rate),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ParleyError::Codec(format!("failed to serialize client message: {e}")))
    }
}
