//! Configuration — TOML-persisted settings and platform paths.
//!
//! [`AppConfig`] is loaded once at startup and handed to the session
//! controller; everything the setup handshake needs (model, voice, rates,
//! transcription toggles) lives under [`AgentConfig`].

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AgentConfig, AppConfig, AudioConfig, TransportConfig};
