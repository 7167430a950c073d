//! A client-side driver for calls to the IC.
//!
//! Submitting an update call is fire-and-forget; learning its outcome means
//! polling the certified `request_status` subtree until the request reaches
//! a terminal state. This crate owns that loop: it drives an injected
//! [`Transport`], verifies every returned certificate, classifies the
//! status, and defers retry pacing to a pluggable [`PollStrategy`].

mod error;
mod poll;
mod transport;

pub use error::{AgentError, TransportError};
pub use poll::{
    get_backoff_policy, poll_for_response, ExponentialPolling, PollResult, PollStrategy,
    RequestStatus,
};
pub use transport::{ReadStateResponse, SignedReadStateRequest, Transport};
