//! Configuration file support for AVT CLI tools

use avt_protocol::{DigestTag, IntegrityTag, Rational, ZeroTag};
use avt_session::{CodecId, OutputOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Integrity tag function applied to every header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    /// All-zero tags, nothing verified
    #[default]
    Zero,
    /// Truncated SHA-256
    Digest,
}

impl TagMode {
    pub fn tag(self) -> Arc<dyn IntegrityTag> {
        match self {
            TagMode::Zero => Arc::new(ZeroTag),
            TagMode::Digest => Arc::new(DigestTag),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination address (`file:<path>`, `udp://<ip:port>`, `null:`)
    pub address: String,
    /// Extra UDP destinations
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default = "default_producer_name")]
    pub producer_name: String,
    /// Cap on payload bytes per packet
    pub max_payload: Option<usize>,
    #[serde(default)]
    pub tag: TagMode,
}

fn default_producer_name() -> String {
    "avt-send".to_string()
}

/// Stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_id")]
    pub id: u16,
    /// Codec name, e.g. "opus" or "h264"
    pub codec: String,
    /// Timebase as `[num, den]`
    #[serde(default = "default_timebase")]
    pub timebase: [i32; 2],
    /// Bits per second, 0 if unknown
    #[serde(default)]
    pub bitrate: u64,
    /// Input bytes per media packet
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Duration of one media packet in timebase units
    #[serde(default = "default_frame_duration")]
    pub frame_duration: i64,
}

fn default_stream_id() -> u16 {
    1
}

fn default_timebase() -> [i32; 2] {
    [1, 1_000_000_000]
}

fn default_chunk_size() -> usize {
    4096
}

fn default_frame_duration() -> i64 {
    20_000_000
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub stream: StreamConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example sender configuration writing to a file
    pub fn example() -> Self {
        Config {
            output: OutputConfig {
                address: "file:out.avt".to_string(),
                destinations: Vec::new(),
                producer_name: default_producer_name(),
                max_payload: Some(1316),
                tag: TagMode::Digest,
            },
            stream: StreamConfig {
                id: 1,
                codec: "opus".to_string(),
                timebase: [1, 48_000],
                bitrate: 128_000,
                chunk_size: 960,
                frame_duration: 960,
            },
        }
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.codec_id()?;
        if self.stream.timebase[1] == 0 {
            return Err(ConfigError::Invalid("timebase denominator is zero".into()));
        }
        if self.stream.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.output.max_payload == Some(0) {
            return Err(ConfigError::Invalid("max_payload must be positive".into()));
        }
        Ok(())
    }
}

impl OutputConfig {
    pub fn options(&self) -> OutputOptions {
        OutputOptions {
            producer_name: self.producer_name.clone(),
            max_payload: self.max_payload,
            tag: self.tag.tag(),
            ..OutputOptions::default()
        }
    }
}

impl StreamConfig {
    pub fn codec_id(&self) -> Result<CodecId, ConfigError> {
        CodecId::from_name(&self.codec)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown codec {:?}", self.codec)))
    }

    pub fn timebase(&self) -> Rational {
        Rational::new(self.timebase[0], self.timebase[1])
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
