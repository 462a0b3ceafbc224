//! Streaming relay between AI code commands and LLM providers.
//!
//! A [`Relay`] takes a [`CommandRequest`] from an authenticated caller, builds
//! the prompt, calls a provider and yields [`StreamEvent`]s: one `start`, any
//! number of `data`, one `end`. Rate-limited attempts are retried with
//! exponential backoff before any output is produced.
//!
//! Vendor-specific APIs are namespaced under `vendors::*`.
//!
//! ```no_run
//! use codeassist_relay::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RelayError> {
//! let relay = RelayConfig::from_env()?.build_relay()?;
//! let session = Session::new("octocat", "gho_token", chrono::Utc::now() + chrono::Duration::hours(1));
//!
//! let mut stream = relay.start(
//!     Some(&session),
//!     CommandRequest::new(CommandKind::Explain, "What does this iterator chain do?"),
//! )?;
//! while let Some(event) = stream.next_event().await {
//!     print!("{}", event.to_sse_frame());
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod command;
/// Startup configuration read from the environment.
pub mod config;
/// Public error types.
pub mod errors;
/// Provider identifiers, sampling parameters and relay options.
pub mod model;
pub mod observability;
pub mod policy;
/// Common imports for typical usage.
pub mod prelude;
pub mod prompt;
/// Provider contract implemented by vendor integrations.
pub mod provider;
pub mod quota;
pub mod registry;
/// Relay entry point, streaming handle and cancellation handle.
pub mod relay;
pub mod session;
mod sse;
/// Events sent to the browser.
pub mod stream;
/// Vendor-specific integrations.
pub mod vendors;

pub use chunking::ChunkingStrategy;
pub use command::{CommandKind, CommandRequest, FileContext};
pub use config::RelayConfig;
pub use errors::{ProviderError, RelayError};
pub use model::{GenerationParams, ProviderId, RelayOptions};
pub use observability::init_observability;
pub use policy::RetryPolicy;
pub use prompt::{Prompt, TemplateRegistry};
pub use provider::{FragmentStream, LlmProvider, ProviderReply, ProviderRequest};
pub use quota::{FixedWindowLimiter, QuotaConfig, QuotaDecision, RateLimiter, Unlimited};
pub use registry::{ProviderInfo, ProviderRegistry, ProviderRegistryBuilder, RegistryDescription};
pub use relay::{AbortHandle, PreparedRelay, Relay, RelayStream};
pub use session::{MemorySessionStore, Session, SessionValidator};
pub use stream::StreamEvent;
