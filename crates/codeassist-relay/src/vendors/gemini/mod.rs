//! Google Gemini integration (`streamGenerateContent` over SSE).
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::GeminiProvider;
pub use config::{GEMINI_API_KEY_ENV, GeminiConfig};

/// Provider id used for registration and request overrides.
pub const GEMINI_PROVIDER: &str = "gemini";
