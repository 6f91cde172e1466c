//! Configuration and environment validation for Evolution.

pub mod env;
pub mod error;
pub mod loader;
pub mod model;

pub use env::{DatabaseLocation, EnvSettings, REQUIRED_ENV_VARS};
pub use error::ConfigError;
pub use loader::{
    ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions, default_data_dir,
};
pub use model::{
    AgentConfig, BackgroundConfig, EvolutionConfig, ExtractorKind, MemoryCaptureConfig,
    MemoryConfig, MemoryProviderKind, OpenAiConfig, SessionsConfig, SubAgentConfig, ToolsConfig,
};
