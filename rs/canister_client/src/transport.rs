//! The narrow transport interface the poller drives.
//!
//! Everything wire-related lives behind this trait: request signing, HTTP,
//! endpoint selection. The poller only needs the pinned root key, a way to
//! create a signed `read_state` request, and a way to submit one.

use crate::error::TransportError;
use async_trait::async_trait;
use candid::Principal;
use ic_crypto_tree_hash::Path;

/// A signed `read_state` request envelope.
///
/// Opaque to the poller; created once and reused verbatim across retries so
/// that every poll of a request observes the same signed envelope.
#[derive(Clone, Debug)]
pub struct SignedReadStateRequest(pub Vec<u8>);

impl From<Vec<u8>> for SignedReadStateRequest {
    fn from(envelope: Vec<u8>) -> Self {
        Self(envelope)
    }
}

/// The certified response of a `read_state` call.
#[derive(Clone, Debug)]
pub struct ReadStateResponse {
    pub certificate: Vec<u8>,
}

/// A connection to a replica, with the root of trust pinned at
/// construction.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The DER-wrapped public key certificates are verified against.
    fn root_key(&self) -> Vec<u8>;

    /// Creates and signs a `read_state` request for the given paths.
    async fn create_read_state_request(
        &self,
        paths: &[Path],
    ) -> Result<SignedReadStateRequest, TransportError>;

    /// Submits a pre-signed `read_state` request for the effective
    /// canister and returns the raw certificate bytes.
    async fn read_state(
        &self,
        effective_canister_id: Principal,
        request: &SignedReadStateRequest,
    ) -> Result<ReadStateResponse, TransportError>;
}
