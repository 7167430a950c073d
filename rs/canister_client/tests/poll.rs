use assert_matches::assert_matches;
use async_trait::async_trait;
use candid::Principal;
use ic_canister_client::{
    poll_for_response, AgentError, PollStrategy, ReadStateResponse, RequestStatus,
    SignedReadStateRequest, Transport, TransportError,
};
use ic_certification::VerificationOptions;
use ic_certification_test_utils::{CertificateBuilder, CertificateData, KeyPair};
use ic_crypto_tree_hash::{fork, labeled, leaf, HashTree, Path};
use ic_request_id::RequestId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn canister_id() -> Principal {
    Principal::try_from_slice(&[0, 0, 0, 0, 0, 0, 0, 7, 1, 1]).unwrap()
}

fn request_id() -> RequestId {
    RequestId::from([0xEE; 32])
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// The `request_status` subtree of the polled request, from `(label, leaf
/// contents)` entries given in label order.
fn request_status_tree(entries: &[(&str, &[u8])]) -> HashTree {
    let mut nodes: Vec<HashTree> = entries
        .iter()
        .map(|(label, contents)| labeled(*label, leaf(contents.to_vec())))
        .collect();
    let mut tree = nodes.pop().expect("at least one entry");
    while let Some(node) = nodes.pop() {
        tree = fork(node, tree);
    }
    labeled("request_status", labeled(request_id().as_bytes(), tree))
}

/// Certifies each tree with the same subnet key; returns the shared root
/// key and the certificate bytes in order.
fn certify_all(trees: Vec<HashTree>) -> (Vec<u8>, Vec<Vec<u8>>) {
    let key_pair = KeyPair::generate();
    let root_key = key_pair.der_public_key();
    let certificates = trees
        .into_iter()
        .map(|tree| {
            let (_, _, cbor) = CertificateBuilder::new(CertificateData::CustomTree(tree))
                .with_time(now_nanos())
                .with_key_pair(key_pair.clone())
                .build();
            cbor
        })
        .collect();
    (root_key, certificates)
}

struct MockTransport {
    root_key: Vec<u8>,
    responses: Mutex<VecDeque<Vec<u8>>>,
    read_state_calls: AtomicU32,
    create_request_calls: AtomicU32,
}

impl MockTransport {
    fn new(root_key: Vec<u8>, responses: Vec<Vec<u8>>) -> Self {
        Self {
            root_key,
            responses: Mutex::new(responses.into()),
            read_state_calls: AtomicU32::new(0),
            create_request_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn root_key(&self) -> Vec<u8> {
        self.root_key.clone()
    }

    async fn create_read_state_request(
        &self,
        paths: &[Path],
    ) -> Result<SignedReadStateRequest, TransportError> {
        assert_eq!(paths.len(), 1);
        self.create_request_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignedReadStateRequest(b"signed envelope".to_vec()))
    }

    async fn read_state(
        &self,
        _effective_canister_id: Principal,
        request: &SignedReadStateRequest,
    ) -> Result<ReadStateResponse, TransportError> {
        assert_eq!(request.0, b"signed envelope");
        self.read_state_calls.fetch_add(1, Ordering::SeqCst);
        let certificate = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport polled more often than scripted");
        Ok(ReadStateResponse { certificate })
    }
}

/// Counts waits and never sleeps.
#[derive(Default)]
struct CountingStrategy {
    waits: u32,
    observed: Vec<RequestStatus>,
}

#[async_trait]
impl PollStrategy for CountingStrategy {
    async fn wait(
        &mut self,
        _effective_canister_id: Principal,
        _request_id: &RequestId,
        status: RequestStatus,
    ) -> Result<(), AgentError> {
        self.waits += 1;
        self.observed.push(status);
        Ok(())
    }
}

/// Gives up immediately.
struct AbortingStrategy;

#[async_trait]
impl PollStrategy for AbortingStrategy {
    async fn wait(
        &mut self,
        _effective_canister_id: Principal,
        _request_id: &RequestId,
        _status: RequestStatus,
    ) -> Result<(), AgentError> {
        Err(AgentError::TimedOutWaitingForResponse { attempts: 0 })
    }
}

#[tokio::test]
async fn poll_returns_reply_after_processing() {
    let (root_key, certificates) = certify_all(vec![
        request_status_tree(&[("status", b"processing")]),
        request_status_tree(&[("status", b"processing")]),
        request_status_tree(&[("reply", &[0xAA, 0xBB]), ("status", b"replied")]),
    ]);
    let transport = MockTransport::new(root_key, certificates);

    let mut strategy = CountingStrategy::default();
    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut strategy,
        None,
        &VerificationOptions::default(),
    )
    .await
    .expect("poll failed");

    assert_eq!(result.reply, Some(vec![0xAA, 0xBB]));
    assert_eq!(strategy.waits, 2);
    assert_eq!(
        strategy.observed,
        vec![RequestStatus::Processing, RequestStatus::Processing]
    );
    assert_eq!(transport.read_state_calls.load(Ordering::SeqCst), 3);
    assert_eq!(transport.create_request_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn poll_fails_on_rejection() {
    let (root_key, certificates) = certify_all(vec![request_status_tree(&[
        ("reject_code", &[4]),
        ("reject_message", b"canister not found"),
        ("status", b"rejected"),
    ])]);
    let transport = MockTransport::new(root_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut CountingStrategy::default(),
        None,
        &VerificationOptions::default(),
    )
    .await;

    assert_matches!(
        result,
        Err(AgentError::CallRejected { code: 4, message }) if message == "canister not found"
    );
}

#[tokio::test]
async fn poll_fails_when_the_reply_was_pruned() {
    let (root_key, certificates) =
        certify_all(vec![request_status_tree(&[("status", b"done")])]);
    let transport = MockTransport::new(root_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut CountingStrategy::default(),
        None,
        &VerificationOptions::default(),
    )
    .await;

    assert_matches!(result, Err(AgentError::CallDoneWithoutReply));
}

#[tokio::test]
async fn missing_status_counts_as_unknown_and_is_retried() {
    let (root_key, certificates) = certify_all(vec![
        request_status_tree(&[("other", b"entry")]),
        request_status_tree(&[("reply", &[0x01]), ("status", b"replied")]),
    ]);
    let transport = MockTransport::new(root_key, certificates);

    let mut strategy = CountingStrategy::default();
    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut strategy,
        None,
        &VerificationOptions::default(),
    )
    .await
    .expect("poll failed");

    assert_eq!(result.reply, Some(vec![0x01]));
    assert_eq!(strategy.observed, vec![RequestStatus::Unknown]);
}

#[tokio::test]
async fn unexpected_status_string_fails_the_poll() {
    let (root_key, certificates) =
        certify_all(vec![request_status_tree(&[("status", b"borked")])]);
    let transport = MockTransport::new(root_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut CountingStrategy::default(),
        None,
        &VerificationOptions::default(),
    )
    .await;

    assert_matches!(result, Err(AgentError::UnexpectedStatus(status)) if status == "borked");
}

#[tokio::test]
async fn strategy_errors_terminate_the_poll() {
    let (root_key, certificates) =
        certify_all(vec![request_status_tree(&[("status", b"processing")])]);
    let transport = MockTransport::new(root_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut AbortingStrategy,
        None,
        &VerificationOptions::default(),
    )
    .await;

    assert_matches!(
        result,
        Err(AgentError::TimedOutWaitingForResponse { attempts: 0 })
    );
    assert_eq!(transport.read_state_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn presigned_requests_are_reused_verbatim() {
    let (root_key, certificates) = certify_all(vec![request_status_tree(&[
        ("reply", &[0x02]),
        ("status", b"replied"),
    ])]);
    let transport = MockTransport::new(root_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut CountingStrategy::default(),
        Some(SignedReadStateRequest(b"signed envelope".to_vec())),
        &VerificationOptions::default(),
    )
    .await
    .expect("poll failed");

    assert_eq!(result.reply, Some(vec![0x02]));
    assert_eq!(transport.create_request_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unverifiable_certificates_fail_the_poll() {
    let (_, certificates) =
        certify_all(vec![request_status_tree(&[("status", b"processing")])]);
    let other_key = KeyPair::generate().der_public_key();
    let transport = MockTransport::new(other_key, certificates);

    let result = poll_for_response(
        &transport,
        canister_id(),
        &request_id(),
        &mut CountingStrategy::default(),
        None,
        &VerificationOptions::default(),
    )
    .await;

    assert_matches!(result, Err(AgentError::Certification(_)));
}
