use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ParleyError, Result};

const fn default_capture_sample_rate() -> u32 {
    16000
}

const fn default_output_sample_rate() -> u32 {
    24000
}

const fn default_block_size() -> usize {
    4096
}

const fn default_capture_queue() -> usize {
    64
}

fn default_url() -> String {
    "ws://127.0.0.1:8765/live".to_string()
}

const fn default_send_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub input_device: Option<String>,

    pub output_device: Option<String>,

    /// Rate of the frames sent upstream.
    #[serde(default = "default_capture_sample_rate")]
    pub capture_sample_rate: u32,

    /// Rate assumed for inbound audio whose MIME type carries no `rate=`.
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,

    /// Samples per captured frame.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Raw device buffers held between the audio callback and the capture worker.
    #[serde(default = "default_capture_queue")]
    pub capture_queue: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            capture_sample_rate: default_capture_sample_rate(),
            output_sample_rate: default_output_sample_rate(),
            block_size: default_block_size(),
            capture_queue: default_capture_queue(),
        }
    }
}

impl AudioConfig {
    #[must_use]
    pub fn frame_duration_secs(&self) -> f32 {
        self.block_size as f32 / self.capture_sample_rate as f32
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_url")]
    pub url: String,

    pub api_key: Option<String>,

    /// Sent verbatim as the first message once the channel is up.
    pub setup: Option<serde_json::Value>,

    /// Capacity of the outbound command and inbound event queues.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            setup: None,
            send_buffer: default_send_buffer(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechConfig {
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    pub voice: Option<String>,
}

/// Which side of the audio path a device setting applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

impl DeviceDirection {
    const fn key(self) -> &'static str {
        match self {
            Self::Input => "input_device",
            Self::Output => "output_device",
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ParleyError::Config(format!(
                "config file not found: {} (create it or use --config to specify a path)",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            ParleyError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.capture_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(ParleyError::Config(
                "audio sample rates must be greater than zero".to_string(),
            ));
        }
        if self.audio.block_size == 0 {
            return Err(ParleyError::Config(
                "audio.block_size must be greater than zero".to_string(),
            ));
        }
        if self.session.send_buffer == 0 || self.audio.capture_queue == 0 {
            return Err(ParleyError::Config(
                "queue sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("parley/config.yaml")
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    /// Write a device name into the `audio` section of the config file,
    /// creating the file if it does not exist yet. Other keys are preserved.
    pub fn set_audio_device(path: &Path, direction: DeviceDirection, name: &str) -> Result<()> {
        use serde_yaml_ng::{Mapping, Value};

        let mut root = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                ParleyError::Config(format!(
                    "failed to read config file {}: {e}",
                    path.display()
                ))
            })?;
            match serde_yaml_ng::from_str::<Value>(&contents) {
                Ok(Value::Mapping(m)) => m,
                Ok(Value::Null) => Mapping::new(),
                Ok(_) => {
                    return Err(ParleyError::Config(format!(
                        "config file {} is not a mapping",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(ParleyError::Config(format!(
                        "failed to parse config file {}: {e}",
                        path.display()
                    )));
                }
            }
        } else {
            Mapping::new()
        };

        let audio = root
            .entry(Value::String("audio".to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()))
            .as_mapping_mut()
            .ok_or_else(|| ParleyError::Config("audio section is not a mapping".to_string()))?;
        audio.insert(
            Value::String(direction.key().to_string()),
            Value::String(name.to_string()),
        );

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ParleyError::Config(format!(
                    "failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let yaml = serde_yaml_ng::to_string(&Value::Mapping(root))
            .map_err(|e| ParleyError::Config(format!("failed to serialize config: {e}")))?;

        std::fs::write(path, yaml).map_err(|e| {
            ParleyError::Config(format!(
                "failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}
