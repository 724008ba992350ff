//! Core configuration structures and loading logic
//!
//! Both roles read a small JSON config file: the coordinator file carries
//! the transcode policy plus input/output paths, the worker file just the
//! coordinator address. The policy types (`HandbrakeConfig`, `RipConfig`,
//! `Fix`) double as the wire representation inside job descriptors.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A fix name outside the recognized set
    #[error("Unknown fix '{0}'")]
    UnknownFix(String),

    /// A fix value that does not match the fix's expected shape
    #[error("Invalid value for fix '{0}'")]
    InvalidFixValue(String),

    /// x264 preset outside the allowed set
    #[error("Invalid x264 preset '{0}'")]
    InvalidPreset(String),

    /// x264 profile outside the allowed set
    #[error("Invalid x264 profile '{0}'")]
    InvalidProfile(String),

    /// H.264 level outside the allowed set
    #[error("Invalid h264 level '{0}'")]
    InvalidLevel(String),
}

/// x264 speed presets accepted by the transcoder.
pub const H264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// x264 profiles accepted by the transcoder.
pub const H264_PROFILES: &[&str] = &["baseline", "main", "high", "high10", "high422", "high444"];

/// H.264 level strings accepted by the transcoder.
pub const H264_LEVELS: &[&str] = &[
    "3.0", "3.1", "3.2", "4.0", "4.1", "4.2", "5.0", "5.1", "5.2",
];

/// Transcoder quality and codec settings shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandbrakeConfig {
    /// Built-in transcoder preset name, passed through verbatim when set.
    #[serde(default)]
    pub preset: Option<String>,
    /// Constant-quality index for the video encoder.
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// x264 speed preset.
    #[serde(default = "default_h264_preset")]
    pub h264_preset: String,
    /// x264 profile.
    #[serde(default = "default_h264_profile")]
    pub h264_profile: String,
    /// H.264 level string.
    #[serde(default = "default_h264_level")]
    pub h264_level: String,
}

fn default_quality() -> u32 {
    20
}

fn default_h264_preset() -> String {
    "medium".to_string()
}

fn default_h264_profile() -> String {
    "high".to_string()
}

fn default_h264_level() -> String {
    "4.1".to_string()
}

impl Default for HandbrakeConfig {
    fn default() -> Self {
        Self {
            preset: None,
            quality: default_quality(),
            h264_preset: default_h264_preset(),
            h264_profile: default_h264_profile(),
            h264_level: default_h264_level(),
        }
    }
}

impl HandbrakeConfig {
    /// Check preset, profile and level against the allowed sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !H264_PRESETS.contains(&self.h264_preset.as_str()) {
            return Err(ConfigError::InvalidPreset(self.h264_preset.clone()));
        }
        if !H264_PROFILES.contains(&self.h264_profile.as_str()) {
            return Err(ConfigError::InvalidProfile(self.h264_profile.clone()));
        }
        if !H264_LEVELS.contains(&self.h264_level.as_str()) {
            return Err(ConfigError::InvalidLevel(self.h264_level.clone()));
        }
        Ok(())
    }
}

/// Language filter and title duration policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RipConfig {
    /// Audio languages to keep (ISO 639-2 codes, either form).
    pub a_lang: Vec<String>,
    /// Subtitle languages to keep (ISO 639-2 codes, either form).
    pub s_lang: Vec<String>,
    /// Title duration bounds in minutes; both ends are exclusive.
    pub len_range: (u32, u32),
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            a_lang: vec!["eng".to_string(), "deu".to_string()],
            s_lang: vec!["eng".to_string(), "deu".to_string()],
            len_range: (15, 50),
        }
    }
}

/// Chapter split layout for [`Fix::SplitEveryChapters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitSpec {
    /// Fixed-size chunks of this many chapters each.
    Every(u32),
    /// Contiguous chunks of the given chapter counts.
    Chunks(Vec<u32>),
}

/// A named tuning flag that switches on an alternative pipeline behavior.
///
/// The wire form is `{"name": ..., "value": ...}`; presence-only fixes carry
/// `true` as their value. Unknown names are rejected at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Fix {
    /// Drop a title whose content equals the immediately preceding title.
    RemoveDuplicateTracks,
    /// Re-encode audio to MP3 instead of copying the source track.
    ReencodeAudio,
    /// Split every title into chapter ranges.
    SplitEveryChapters(SplitSpec),
    /// Select the libdvdread backend instead of libdvdnav.
    UseLibdvdread,
}

impl Fix {
    /// Wire name of this fix.
    pub fn name(&self) -> &'static str {
        match self {
            Fix::RemoveDuplicateTracks => "remove_duplicate_tracks",
            Fix::ReencodeAudio => "reencode_audio",
            Fix::SplitEveryChapters(_) => "split_every_chapters",
            Fix::UseLibdvdread => "use_libdvdread",
        }
    }

    /// Build a fix from its wire name and value.
    ///
    /// Rejects unknown names, and split values that are neither a positive
    /// integer nor a non-empty list of positive integers.
    pub fn from_name_value(name: &str, value: serde_json::Value) -> Result<Fix, ConfigError> {
        match name {
            "remove_duplicate_tracks" => Ok(Fix::RemoveDuplicateTracks),
            "reencode_audio" => Ok(Fix::ReencodeAudio),
            "use_libdvdread" => Ok(Fix::UseLibdvdread),
            "split_every_chapters" => {
                let spec: SplitSpec = serde_json::from_value(value)
                    .map_err(|_| ConfigError::InvalidFixValue(name.to_string()))?;
                match &spec {
                    SplitSpec::Every(0) => Err(ConfigError::InvalidFixValue(name.to_string())),
                    SplitSpec::Chunks(chunks) if chunks.is_empty() || chunks.contains(&0) => {
                        Err(ConfigError::InvalidFixValue(name.to_string()))
                    }
                    _ => Ok(Fix::SplitEveryChapters(spec)),
                }
            }
            other => Err(ConfigError::UnknownFix(other.to_string())),
        }
    }
}

impl std::fmt::Display for Fix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Fix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Fix", 2)?;
        s.serialize_field("name", self.name())?;
        match self {
            Fix::SplitEveryChapters(spec) => s.serialize_field("value", spec)?,
            _ => s.serialize_field("value", &true)?,
        }
        s.end()
    }
}

#[derive(Deserialize)]
struct FixWire {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl<'de> Deserialize<'de> for Fix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = FixWire::deserialize(deserializer)?;
        Fix::from_name_value(&wire.name, wire.value).map_err(D::Error::custom)
    }
}

/// Raw JSON shape of the coordinator config file.
mod file_json {
    use serde::Deserialize;
    use std::path::PathBuf;

    #[derive(Debug, Deserialize)]
    pub struct CoordinatorFile {
        pub hb_config: HbSection,
        pub rip_config: RipSection,
        #[serde(default)]
        pub fixes: serde_json::Map<String, serde_json::Value>,
        pub in_path: PathBuf,
        pub out_path: PathBuf,
        #[serde(default = "default_ip")]
        pub ip: String,
        #[serde(default = "default_port")]
        pub port: u16,
    }

    #[derive(Debug, Deserialize)]
    pub struct HbSection {
        #[serde(default)]
        pub preset: Option<String>,
        pub quality: u32,
        pub h264_preset: String,
        pub h264_profile: String,
        pub h264_level: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct RipSection {
        pub a_tracks: Vec<String>,
        pub s_tracks: Vec<String>,
        pub min_dur: u32,
        pub max_dur: u32,
    }

    pub fn default_ip() -> String {
        "0.0.0.0".to_string()
    }

    pub fn default_port() -> u16 {
        5001
    }
}

/// Coordinator-side configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Transcoder settings applied to every job.
    pub hb_config: HandbrakeConfig,
    /// Title selection policy applied to every job.
    pub rip_config: RipConfig,
    /// Active fixes, in file order.
    pub fixes: Vec<Fix>,
    /// Directory holding the source image files (flat, no subdirectories).
    pub in_path: PathBuf,
    /// Directory receiving produced artifacts and the consumed images.
    pub out_path: PathBuf,
    /// Address to bind the dispatch server on.
    pub ip: String,
    /// Port to bind the dispatch server on.
    pub port: u16,
}

impl CoordinatorConfig {
    /// Load and validate a coordinator config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    /// Parse and validate a coordinator config from a JSON string.
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let raw: file_json::CoordinatorFile = serde_json::from_str(content)?;

        let hb_config = HandbrakeConfig {
            preset: raw.hb_config.preset,
            quality: raw.hb_config.quality,
            h264_preset: raw.hb_config.h264_preset,
            h264_profile: raw.hb_config.h264_profile,
            h264_level: raw.hb_config.h264_level,
        };
        hb_config.validate()?;

        let rip_config = RipConfig {
            a_lang: raw.rip_config.a_tracks,
            s_lang: raw.rip_config.s_tracks,
            len_range: (raw.rip_config.min_dur, raw.rip_config.max_dur),
        };

        let mut fixes = Vec::with_capacity(raw.fixes.len());
        for (name, value) in raw.fixes {
            fixes.push(Fix::from_name_value(&name, value)?);
        }

        Ok(Self {
            hb_config,
            rip_config,
            fixes,
            in_path: raw.in_path,
            out_path: raw.out_path,
            ip: raw.ip,
            port: raw.port,
        })
    }
}

/// Worker-side configuration: where to find the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Coordinator host.
    pub ip: String,
    /// Coordinator port.
    pub port: u16,
}

impl WorkerConfig {
    /// Load a worker config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    /// Parse a worker config from a JSON string.
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}
