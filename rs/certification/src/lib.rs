//! Verification of certificates produced by the IC.
//!
//! A certificate is a signed, partially pruned state tree. Verifying one
//! establishes that a subnet authorized to speak for a canister signed the
//! tree's root hash recently. The pipeline, in order:
//!
//! 1. recompute the root hash of the tree;
//! 2. resolve the signing key: the pinned root key, or, when the
//!    certificate carries a delegation, the subnet key attested by a
//!    nested certificate that is itself verified against the root key and
//!    checked to cover the canister's id range;
//! 3. strip the DER envelope off the key;
//! 4. check the certificate's freshness window;
//! 5. verify the BLS threshold signature over the domain-separated root.
//!
//! Only certificates that pass all checks are exposed to callers, as
//! [`VerifiedCertificate`]; there is no way to obtain a partially verified
//! one.

use candid::Principal;
use ic_crypto_tree_hash::{find_label, HashTree, LookupResult, SearchResult, SubtreeLookupResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod bls;
mod der;
mod error;

pub use bls::{verify_bls_signature, BlsVerifier, BLS_SIGNATURE_DST};
pub use der::{extract_der, wrap_der, DER_PREFIX};
pub use error::CertificateVerificationError;

/// Length-prefixed domain separator of state-root signatures.
const DOMAIN_IC_STATE_ROOT: &[u8; 14] = b"\x0Dic-state-root";

/// How old a certificate may be before it is rejected, unless the caller
/// overrides the window.
pub const DEFAULT_MAX_CERTIFICATE_AGE: Duration = Duration::from_secs(5 * 60);

/// How far into the future a certificate's time may lie, to absorb clock
/// skew between the subnet and the client.
pub const ALLOWED_CLOCK_DRIFT: Duration = Duration::from_secs(5 * 60);

/// A certificate as it appears on the wire: a state tree, a threshold
/// signature over its root hash, and optionally a delegation from the root
/// key to the signing subnet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    pub tree: HashTree,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<Delegation>,
}

/// A signed attestation that a subnet's public key may certify state for a
/// range of canisters. The inner certificate is decoded and verified in its
/// own right during verification and consumed only to extract the subnet
/// key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(with = "serde_bytes")]
    pub subnet_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub certificate: Vec<u8>,
}

/// Knobs for certificate verification. The defaults match production use;
/// tests inject their own clock bounds and signature verifier.
#[derive(Clone)]
pub struct VerificationOptions {
    /// Maximum accepted certificate age. `None` disables the staleness
    /// bound (used for delegation certificates, which outlive freshness
    /// windows).
    pub max_age: Option<Duration>,
    pub allowed_clock_drift: Duration,
    pub disable_time_verification: bool,
    pub bls_verifier: BlsVerifier,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            max_age: Some(DEFAULT_MAX_CERTIFICATE_AGE),
            allowed_clock_drift: ALLOWED_CLOCK_DRIFT,
            disable_time_verification: false,
            bls_verifier: verify_bls_signature,
        }
    }
}

/// A certificate that has passed verification.
///
/// The only constructor is [`VerifiedCertificate::decode_and_verify`]; a
/// value of this type is proof that every check in the pipeline succeeded.
/// It is immutable and supports only lookups into its state tree.
#[derive(Debug)]
pub struct VerifiedCertificate {
    tree: HashTree,
}

impl VerifiedCertificate {
    /// Decodes `certificate_bytes` and runs the full verification pipeline
    /// against the pinned `root_key` on behalf of `canister_id`.
    pub fn decode_and_verify(
        certificate_bytes: &[u8],
        root_key: &[u8],
        canister_id: Principal,
        current_time_nanos: u64,
        options: &VerificationOptions,
    ) -> Result<Self, CertificateVerificationError> {
        let certificate: Certificate = serde_cbor::from_slice(certificate_bytes)
            .map_err(|err| CertificateVerificationError::DeserializationFailed(err.to_string()))?;
        verify_certificate(
            &certificate,
            root_key,
            canister_id,
            current_time_nanos,
            options,
        )?;
        Ok(Self {
            tree: certificate.tree,
        })
    }

    pub fn tree(&self) -> &HashTree {
        &self.tree
    }

    pub fn lookup_path<'p, P, S>(&self, path: P) -> LookupResult<'_>
    where
        P: IntoIterator<Item = &'p S>,
        S: AsRef<[u8]> + ?Sized + 'p,
    {
        self.tree.lookup_path(path)
    }

    pub fn lookup_subtree<'p, P, S>(&self, path: P) -> SubtreeLookupResult<'_>
    where
        P: IntoIterator<Item = &'p S>,
        S: AsRef<[u8]> + ?Sized + 'p,
    {
        self.tree.lookup_subtree(path)
    }

    /// Searches the top level of the state tree for a label.
    pub fn lookup_label(&self, label: &[u8]) -> SearchResult<'_> {
        find_label(label, &self.tree)
    }
}

/// Verifies a certificate and checks that the certified data it records for
/// `canister_id` equals `expected_digest`.
pub fn verify_certified_data(
    certificate_bytes: &[u8],
    canister_id: Principal,
    root_key: &[u8],
    expected_digest: &[u8],
    current_time_nanos: u64,
    options: &VerificationOptions,
) -> Result<VerifiedCertificate, CertificateVerificationError> {
    let certificate = VerifiedCertificate::decode_and_verify(
        certificate_bytes,
        root_key,
        canister_id,
        current_time_nanos,
        options,
    )?;
    match certificate.lookup_path([b"canister" as &[u8], canister_id.as_slice(), b"certified_data"])
    {
        LookupResult::Found(digest) if digest == expected_digest => Ok(certificate),
        _ => Err(CertificateVerificationError::CertifiedDataMismatch { canister_id }),
    }
}

fn verify_certificate(
    certificate: &Certificate,
    root_key: &[u8],
    canister_id: Principal,
    current_time_nanos: u64,
    options: &VerificationOptions,
) -> Result<(), CertificateVerificationError> {
    let root_hash = certificate.tree.digest();

    let der_key = match &certificate.delegation {
        None => root_key.to_vec(),
        Some(delegation) => check_delegation(
            delegation,
            root_key,
            canister_id,
            current_time_nanos,
            options,
        )?,
    };
    let public_key = der::extract_der(&der_key)?;

    if !options.disable_time_verification {
        check_time(&certificate.tree, current_time_nanos, options)?;
    }

    let mut message = Vec::with_capacity(DOMAIN_IC_STATE_ROOT.len() + root_hash.as_bytes().len());
    message.extend_from_slice(DOMAIN_IC_STATE_ROOT);
    message.extend_from_slice(root_hash.as_bytes());

    if !(options.bls_verifier)(&certificate.signature, &message, public_key) {
        return Err(CertificateVerificationError::SignatureVerificationFailed);
    }
    Ok(())
}

/// Resolves the delegated subnet key the outer certificate is signed with.
fn check_delegation(
    delegation: &Delegation,
    root_key: &[u8],
    canister_id: Principal,
    current_time_nanos: u64,
    options: &VerificationOptions,
) -> Result<Vec<u8>, CertificateVerificationError> {
    let subnet_id = Principal::try_from_slice(&delegation.subnet_id).map_err(|err| {
        CertificateVerificationError::DeserializationFailed(format!(
            "invalid subnet id 0x{}: {err}",
            hex::encode(&delegation.subnet_id)
        ))
    })?;
    let inner: Certificate = serde_cbor::from_slice(&delegation.certificate)
        .map_err(|err| CertificateVerificationError::DeserializationFailed(err.to_string()))?;
    if inner.delegation.is_some() {
        return Err(CertificateVerificationError::NestedDelegation);
    }

    tracing::debug!(%subnet_id, "verifying subnet delegation");
    // Delegation certificates are re-certified rarely and legitimately
    // outlive the freshness window of the certificates they vouch for.
    let delegation_options = VerificationOptions {
        max_age: None,
        ..options.clone()
    };
    verify_certificate(
        &inner,
        root_key,
        canister_id,
        current_time_nanos,
        &delegation_options,
    )?;

    // The management canister is served by every subnet; no range check
    // applies to it.
    if canister_id != Principal::management_canister() {
        check_canister_ranges(&inner.tree, subnet_id, canister_id)?;
    }

    match inner
        .tree
        .lookup_path([b"subnet" as &[u8], delegation.subnet_id.as_slice(), b"public_key"])
    {
        LookupResult::Found(public_key) => Ok(public_key.to_vec()),
        _ => Err(CertificateVerificationError::SubnetKeyNotFound { subnet_id }),
    }
}

/// Checks that `canister_id` lies within one of the closed canister-id
/// ranges the delegation certificate grants `subnet_id`.
pub fn check_canister_ranges(
    tree: &HashTree,
    subnet_id: Principal,
    canister_id: Principal,
) -> Result<(), CertificateVerificationError> {
    let ranges_bytes =
        match tree.lookup_path([b"subnet" as &[u8], subnet_id.as_slice(), b"canister_ranges"]) {
            LookupResult::Found(bytes) => bytes,
            _ => return Err(CertificateVerificationError::CanisterRangesNotFound { subnet_id }),
        };
    let ranges: Vec<(serde_bytes::ByteBuf, serde_bytes::ByteBuf)> =
        serde_cbor::from_slice(ranges_bytes).map_err(|err| {
            CertificateVerificationError::MalformedCanisterRanges {
                subnet_id,
                reason: err.to_string(),
            }
        })?;

    // Ranges are closed intervals over canonical principal bytes, compared
    // as unsigned byte strings with shorter-is-smaller tie-breaking.
    let canister_id_bytes = canister_id.as_slice();
    let in_range = ranges
        .iter()
        .any(|(low, high)| &low[..] <= canister_id_bytes && canister_id_bytes <= &high[..]);
    if !in_range {
        return Err(CertificateVerificationError::CanisterNotInRange {
            canister_id,
            subnet_id,
        });
    }
    Ok(())
}

fn check_time(
    tree: &HashTree,
    current_time_nanos: u64,
    options: &VerificationOptions,
) -> Result<(), CertificateVerificationError> {
    let LookupResult::Found(time_bytes) = tree.lookup_path(["time"]) else {
        return Err(CertificateVerificationError::MissingTime);
    };
    let certificate_time = decode_time(time_bytes)?;

    if let Some(max_age) = options.max_age {
        let earliest_accepted = current_time_nanos.saturating_sub(nanos_saturating(max_age));
        if certificate_time < earliest_accepted {
            return Err(CertificateVerificationError::CertificateTooOld {
                certificate_time,
                earliest_accepted,
            });
        }
    }

    let latest_accepted =
        current_time_nanos.saturating_add(nanos_saturating(options.allowed_clock_drift));
    if certificate_time > latest_accepted {
        return Err(CertificateVerificationError::CertificateTooNew {
            certificate_time,
            latest_accepted,
        });
    }
    Ok(())
}

/// Decodes a `time` leaf: a minimal unsigned LEB128 nanosecond timestamp.
fn decode_time(bytes: &[u8]) -> Result<u64, CertificateVerificationError> {
    let mut reader = bytes;
    let time = leb128::read::unsigned(&mut reader)
        .map_err(|err| CertificateVerificationError::MalformedTime(err.to_string()))?;
    if !reader.is_empty() {
        return Err(CertificateVerificationError::MalformedTime(format!(
            "{} trailing bytes after the timestamp",
            reader.len()
        )));
    }
    Ok(time)
}

fn nanos_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
