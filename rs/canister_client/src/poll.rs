//! Polling for the certified status of an in-flight call.
//!
//! After submitting an update call, a client repeatedly reads the certified
//! `request_status` subtree of the request until it reaches a terminal
//! state. Every response is a full certificate and is verified before any
//! of its content is trusted.

use crate::error::AgentError;
use crate::transport::{SignedReadStateRequest, Transport};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use candid::Principal;
use ic_certification::{VerificationOptions, VerifiedCertificate};
use ic_crypto_tree_hash::{Label, LookupResult, Path};
use ic_request_id::RequestId;
use std::fmt;
use std::time::{Duration, SystemTime};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
const POLL_INTERVAL_MULTIPLIER: f64 = 1.2;

/// How many status checks the default strategy performs before giving up.
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

/// The back-off schedule of the default polling strategy.
pub fn get_backoff_policy() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoff {
        initial_interval: MIN_POLL_INTERVAL,
        current_interval: MIN_POLL_INTERVAL,
        randomization_factor: 0.1,
        multiplier: POLL_INTERVAL_MULTIPLIER,
        start_time: std::time::Instant::now(),
        max_interval: MAX_POLL_INTERVAL,
        max_elapsed_time: None,
        clock: backoff::SystemClock::default(),
    }
}

/// The status of an in-flight request, as certified by the subnet.
///
/// `Replied`, `Rejected`, and `Done` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Received,
    Processing,
    Replied,
    Rejected,
    Done,
    /// The state tree carries no status for the request (yet).
    Unknown,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            RequestStatus::Received => "received",
            RequestStatus::Processing => "processing",
            RequestStatus::Replied => "replied",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Done => "done",
            RequestStatus::Unknown => "unknown",
        };
        f.write_str(status)
    }
}

/// Decides how long to wait between status checks.
///
/// The strategy may suspend for arbitrary time; returning an error
/// terminates the poll with that error, which is how callers compose
/// timeouts and cancellation.
#[async_trait]
pub trait PollStrategy: Send {
    async fn wait(
        &mut self,
        effective_canister_id: Principal,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> Result<(), AgentError>;
}

/// The default strategy: exponential back-off with a ceiling and a bounded
/// number of attempts.
pub struct ExponentialPolling {
    backoff: backoff::ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
}

impl ExponentialPolling {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            backoff: get_backoff_policy(),
            attempts: 0,
            max_attempts,
        }
    }
}

impl Default for ExponentialPolling {
    fn default() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_POLL_ATTEMPTS)
    }
}

#[async_trait]
impl PollStrategy for ExponentialPolling {
    async fn wait(
        &mut self,
        _effective_canister_id: Principal,
        _request_id: &RequestId,
        _status: RequestStatus,
    ) -> Result<(), AgentError> {
        if self.attempts >= self.max_attempts {
            return Err(AgentError::TimedOutWaitingForResponse {
                attempts: self.attempts,
            });
        }
        self.attempts += 1;
        let interval = self
            .backoff
            .next_backoff()
            .unwrap_or(MAX_POLL_INTERVAL);
        tokio::time::sleep(interval).await;
        Ok(())
    }
}

/// The terminal result of a successful poll.
#[derive(Debug)]
pub struct PollResult {
    /// The verified certificate the terminal status was read from.
    pub certificate: VerifiedCertificate,
    /// The reply payload, if the replica still carried one.
    pub reply: Option<Vec<u8>>,
}

/// Polls the certified status of `request_id` until it reaches a terminal
/// state.
///
/// A pre-signed read-state request may be supplied (e.g. one signed by a
/// hardware authenticator); otherwise the transport creates one. Either
/// way, the same envelope is reused across all retries. Non-terminal
/// statuses defer to `strategy`, whose errors terminate the poll.
pub async fn poll_for_response<T, S>(
    transport: &T,
    effective_canister_id: Principal,
    request_id: &RequestId,
    strategy: &mut S,
    presigned_request: Option<SignedReadStateRequest>,
    options: &VerificationOptions,
) -> Result<PollResult, AgentError>
where
    T: Transport + ?Sized,
    S: PollStrategy + ?Sized,
{
    let path = Path::new(vec![
        Label::from("request_status"),
        Label::from(request_id.as_bytes()),
    ]);
    let request = match presigned_request {
        Some(request) => request,
        None => transport
            .create_read_state_request(std::slice::from_ref(&path))
            .await
            .map_err(AgentError::Transport)?,
    };
    let root_key = transport.root_key();

    loop {
        let response = transport
            .read_state(effective_canister_id, &request)
            .await
            .map_err(AgentError::Transport)?;
        let certificate = VerifiedCertificate::decode_and_verify(
            &response.certificate,
            &root_key,
            effective_canister_id,
            current_time_nanos(),
            options,
        )?;

        let status = read_status(&certificate, request_id)?;
        tracing::debug!(%request_id, %status, "read certified request status");
        match status {
            RequestStatus::Replied => {
                let reply = match certificate.lookup_path([
                    b"request_status" as &[u8],
                    request_id.as_bytes(),
                    b"reply",
                ]) {
                    LookupResult::Found(bytes) => Some(bytes.to_vec()),
                    _ => None,
                };
                return Ok(PollResult { certificate, reply });
            }
            RequestStatus::Received | RequestStatus::Processing | RequestStatus::Unknown => {
                strategy
                    .wait(effective_canister_id, request_id, status)
                    .await?;
            }
            RequestStatus::Rejected => {
                return Err(read_reject(&certificate, request_id));
            }
            RequestStatus::Done => return Err(AgentError::CallDoneWithoutReply),
        }
    }
}

fn read_status(
    certificate: &VerifiedCertificate,
    request_id: &RequestId,
) -> Result<RequestStatus, AgentError> {
    match certificate.lookup_path([
        b"request_status" as &[u8],
        request_id.as_bytes(),
        b"status",
    ]) {
        LookupResult::Found(bytes) => match std::str::from_utf8(bytes) {
            Ok("received") => Ok(RequestStatus::Received),
            Ok("processing") => Ok(RequestStatus::Processing),
            Ok("replied") => Ok(RequestStatus::Replied),
            Ok("rejected") => Ok(RequestStatus::Rejected),
            Ok("done") => Ok(RequestStatus::Done),
            Ok(other) => Err(AgentError::UnexpectedStatus(other.to_string())),
            Err(err) => Err(AgentError::MalformedStatusEntry {
                label: "status",
                reason: err.to_string(),
            }),
        },
        LookupResult::Absent | LookupResult::Unknown => Ok(RequestStatus::Unknown),
        LookupResult::Error => Err(AgentError::MalformedStatusEntry {
            label: "status",
            reason: "expected a leaf value".to_string(),
        }),
    }
}

fn read_reject(certificate: &VerifiedCertificate, request_id: &RequestId) -> AgentError {
    let code = match certificate.lookup_path([
        b"request_status" as &[u8],
        request_id.as_bytes(),
        b"reject_code",
    ]) {
        LookupResult::Found(mut bytes) => match leb128::read::unsigned(&mut bytes) {
            Ok(code) => code,
            Err(err) => {
                return AgentError::MalformedStatusEntry {
                    label: "reject_code",
                    reason: err.to_string(),
                }
            }
        },
        _ => {
            return AgentError::MalformedStatusEntry {
                label: "reject_code",
                reason: "not found".to_string(),
            }
        }
    };
    let message = match certificate.lookup_path([
        b"request_status" as &[u8],
        request_id.as_bytes(),
        b"reject_message",
    ]) {
        LookupResult::Found(bytes) => match std::str::from_utf8(bytes) {
            Ok(message) => message.to_string(),
            Err(err) => {
                return AgentError::MalformedStatusEntry {
                    label: "reject_message",
                    reason: err.to_string(),
                }
            }
        },
        _ => {
            return AgentError::MalformedStatusEntry {
                label: "reject_message",
                reason: "not found".to_string(),
            }
        }
    };
    AgentError::CallRejected { code, message }
}

fn current_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system time is before the UNIX epoch")
        .as_nanos() as u64
}
