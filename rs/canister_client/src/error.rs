use ic_certification::CertificateVerificationError;
use thiserror::Error;

/// Errors surfaced by the transport. The poller treats them as opaque and
/// propagates them verbatim.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of a poll for a certified request status.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The certificate returned by the replica failed verification.
    #[error(transparent)]
    Certification(#[from] CertificateVerificationError),

    /// The transport failed to create or submit a request.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The call was rejected by the canister or the system.
    #[error("call rejected with code {code}: {message}")]
    CallRejected { code: u64, message: String },

    /// The call completed, but its reply was pruned from the state tree
    /// before we observed it.
    #[error("the call has completed but its reply has been pruned")]
    CallDoneWithoutReply,

    /// The replica reported a status string this client does not know.
    #[error("unexpected request status {0:?}")]
    UnexpectedStatus(String),

    /// A `request_status` entry is present but cannot be decoded.
    #[error("malformed request status entry {label:?}: {reason}")]
    MalformedStatusEntry { label: &'static str, reason: String },

    /// The polling strategy gave up before the request reached a terminal
    /// state.
    #[error("request was not completed within {attempts} status checks")]
    TimedOutWaitingForResponse { attempts: u32 },
}
