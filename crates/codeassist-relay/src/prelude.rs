//! Common imports for relay usage.
pub use crate::{
    AbortHandle, CommandKind, CommandRequest, FileContext, LlmProvider, ProviderId, Relay,
    RelayConfig, RelayError, RelayStream, Session, SessionValidator, StreamEvent,
};
