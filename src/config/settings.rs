//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// Open-time configuration for the remote conversational agent.
///
/// Everything here is carried into the setup handshake; none of it can be
/// changed mid-session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent model identifier sent in the setup message.
    pub model: String,
    /// Prebuilt voice profile id for synthesized replies.
    pub voice: String,
    /// Optional system instruction text shaping the agent's behaviour.
    pub system_instruction: Option<String>,
    /// Request caller-side (microphone) transcription events.
    pub transcribe_input: bool,
    /// Request agent-side (synthesized speech) transcription events.
    pub transcribe_output: bool,
    /// Sample rate the microphone stream is encoded at, in Hz.
    pub capture_rate: u32,
    /// Sample rate the agent synthesizes replies at, in Hz.
    pub playback_rate: u32,
    /// Channel count of inbound audio (the agent sends mono).
    pub channels: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "models/gemini-2.0-flash-live-001".into(),
            voice: "Aoede".into(),
            system_instruction: None,
            transcribe_input: true,
            transcribe_output: true,
            capture_rate: 16_000,
            playback_rate: 24_000,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Connection settings for the agent endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// WebSocket URL of the live agent endpoint.
    pub endpoint: String,
    /// API key appended to the session URL — `None` for endpoints that
    /// authenticate some other way (e.g. a local relay).
    pub api_key: Option<String>,
    /// Maximum seconds to wait for the connection plus setup handshake.
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint:
                "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
                    .into(),
            api_key: None,
            connect_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Local audio device settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio input device name — `None` means the system default.
    pub input_device: Option<String>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voicebridge::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent session settings.
    pub agent: AgentConfig,
    /// Endpoint connection settings.
    pub transport: TransportConfig,
    /// Local audio device settings.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
