use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::audio::codec::{self, InboundAudioChunk};
use crate::audio::scheduler::{Clock, PlaybackScheduler};
use crate::audio::{AudioHost, CpalHost};
use crate::config::{AudioConfig, Config, SpeechConfig};
use crate::error::{ParleyError, Result};
use crate::guard::ResourceGuard;
use crate::net::protocol::InlineAudio;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Extra time allowed past the scheduled end before giving up on the
/// output reporting completion.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

#[derive(Deserialize)]
struct SpeechResponse {
    audio: InlineAudio,
}

/// Client for a text-to-speech endpoint that answers with inline audio.
pub struct SpeechClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    voice: Option<String>,
    default_rate: u32,
}

impl SpeechClient {
    /// `default_rate` applies to replies whose MIME type carries no rate.
    pub fn new(config: &SpeechConfig, default_rate: u32) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            ParleyError::Speech("speech.endpoint must be set to use `say`".to_string())
        })?;

        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            default_rate,
        })
    }

    pub async fn synthesize(&self, text: &str) -> Result<InboundAudioChunk> {
        if text.trim().is_empty() {
            return Err(ParleyError::Speech("nothing to say".to_string()));
        }

        let body = SpeechRequest {
            text,
            voice: self.voice.as_deref(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ParleyError::Speech(format!("speech request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ParleyError::Speech(format!(
                "speech endpoint returned {status}: {body}"
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ParleyError::Speech(format!("failed to read speech response: {e}")))?;

        decode_response(&text, self.default_rate)
    }
}

fn decode_response(body: &str, default_rate: u32) -> Result<InboundAudioChunk> {
    let response: SpeechResponse = serde_json::from_str(body)
        .map_err(|e| ParleyError::Speech(format!("failed to parse speech response: {e}")))?;
    codec::decode(&response.audio.data, &response.audio.mime_type, default_rate)
}

/// Synthesize `text` and play it on the output device, returning once it
/// has been heard.
pub async fn speak(config: &Config, text: &str) -> Result<()> {
    let client = SpeechClient::new(&config.speech, config.audio.output_sample_rate)?;
    let chunk = client.synthesize(text).await?;
    tracing::info!(
        "synthesized {:.2}s of audio at {}Hz",
        chunk.duration().as_secs_f64(),
        chunk.sample_rate
    );
    play_to_end(&mut CpalHost, &config.audio, &chunk).await
}

/// Play one chunk through a fresh output context and wait for it to end.
pub async fn play_to_end<H: AudioHost>(
    host: &mut H,
    audio: &AudioConfig,
    chunk: &InboundAudioChunk,
) -> Result<()> {
    let mut guard = ResourceGuard::new();
    let output = host.open_output(audio)?;
    guard.guard("playback", output.release);

    let mut scheduler = PlaybackScheduler::new(output.clock, output.sink);
    let scheduled = scheduler.schedule(chunk)?;
    let deadline = scheduled.end_at() + DRAIN_GRACE;

    let mut ticker = tokio::time::interval(DRAIN_POLL);
    while !scheduler.is_idle() {
        ticker.tick().await;
        scheduler.reap();
        if scheduler.clock().now() > deadline {
            tracing::warn!("output never reported {} finished, stopping it", scheduled.id);
            break;
        }
    }

    scheduler.shutdown();
    guard.release_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scheduler::PlaybackId;
    use crate::testing::FakeHost;

    #[test]
    fn endpoint_is_required() {
        let err = SpeechClient::new(&SpeechConfig::default(), 24000)
            .err()
            .unwrap_or_else(|| panic!("expected an error"));
        assert!(matches!(err, ParleyError::Speech(_)));
    }

    #[test]
    fn request_omits_missing_voice() {
        let json = serde_json::to_string(&SpeechRequest {
            text: "hello",
            voice: None,
        })
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(json, r#"{"text":"hello"}"#);
    }

    #[test]
    fn response_decodes_inline_audio() {
        let chunk = decode_response(
            r#"{"audio": {"data": "AAD/fw==", "mimeType": "audio/pcm"}}"#,
            22050,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(chunk.sample_rate, 22050);
        assert_eq!(chunk.samples.len(), 2);
    }

    #[test]
    fn response_without_audio_is_an_error() {
        assert!(matches!(
            decode_response(r#"{"error": "busy"}"#, 24000),
            Err(ParleyError::Speech(_))
        ));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let config = SpeechConfig {
            endpoint: Some("http://127.0.0.1:9/tts".to_string()),
            ..SpeechConfig::default()
        };
        let client = SpeechClient::new(&config, 24000).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            client.synthesize("   ").await,
            Err(ParleyError::Speech(_))
        ));
    }

    #[tokio::test]
    async fn play_to_end_waits_for_completion_then_releases() {
        let mut host = FakeHost::new();
        let sink = host.sink.clone();
        let chunk = InboundAudioChunk::mono(vec![0.1; 2400], 24000);

        let finisher = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            sink.finish(PlaybackId(0));
        };
        let config = AudioConfig::default();
        let (played, ()) = tokio::join!(
            play_to_end(&mut host, &config, &chunk),
            finisher
        );

        played.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host.sink.started().len(), 1);
        assert!(host.sink.stopped().is_empty());
        assert_eq!(host.outputs_released(), 1);
    }

    #[tokio::test]
    async fn play_to_end_gives_up_when_the_clock_passes_the_end() {
        let mut host = FakeHost::new();
        let clock = host.clock.clone();
        let chunk = InboundAudioChunk::mono(vec![0.1; 2400], 24000);

        let advance = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            clock.set(Duration::from_secs(5));
        };
        let config = AudioConfig::default();
        let (played, ()) = tokio::join!(
            play_to_end(&mut host, &config, &chunk),
            advance
        );

        played.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host.sink.stopped(), vec![PlaybackId(0)]);
        assert_eq!(host.outputs_released(), 1);
    }

    #[tokio::test]
    async fn play_to_end_reports_missing_output() {
        let mut host = FakeHost::new();
        host.fail_output("no output device");
        let chunk = InboundAudioChunk::mono(vec![0.1; 10], 24000);
        let err = play_to_end(&mut host, &AudioConfig::default(), &chunk)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Acquisition(_)));
    }
}
