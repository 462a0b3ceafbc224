//! GitHub Models integration (OpenAI-compatible chat completions).
mod adapter;
mod config;

pub use adapter::GithubModelsProvider;
pub use config::{GITHUB_TOKEN_ENV, GithubModelsConfig};

/// Provider id used for registration and request overrides.
pub const GITHUB_PROVIDER: &str = "github";
