//! Configuration management.

mod provider;
mod settings;
mod xdg;

pub use provider::{ProviderConfig, ProviderKind};
pub use settings::{
    resolve_env_var, AssistantConfig, ConfigError, GeminiSettings, HostedProviderSettings,
    OllamaSettings,
};
pub use xdg::XdgDirs;
