use candid::Principal;
use thiserror::Error;

/// Reasons a certificate can fail verification.
///
/// Each variant carries the context needed to reconstruct the offending
/// input. No variant is recoverable; a certificate that fails any check is
/// rejected outright.
#[derive(Debug, Error)]
pub enum CertificateVerificationError {
    /// The certificate (or a delegation certificate nested in it) is not
    /// valid CBOR of the expected shape.
    #[error("failed to deserialize certificate: {0}")]
    DeserializationFailed(String),

    /// The DER envelope of a public key has the wrong length or does not
    /// carry the BLS12-381 G2 algorithm identifier prefix.
    #[error("malformed DER public key ({reason}): 0x{}", hex::encode(.key))]
    MalformedDer { reason: String, key: Vec<u8> },

    /// A delegation certificate must be signed directly by the root key;
    /// further delegation is forbidden.
    #[error("a delegation certificate must not itself contain a delegation")]
    NestedDelegation,

    /// The delegation does not authorize the subnet to certify state for
    /// this canister.
    #[error("canister {canister_id} is not within the canister ranges of subnet {subnet_id}")]
    CanisterNotInRange {
        canister_id: Principal,
        subnet_id: Principal,
    },

    /// The delegation certificate carries no canister ranges for the
    /// subnet.
    #[error("no canister ranges for subnet {subnet_id} in the delegation certificate")]
    CanisterRangesNotFound { subnet_id: Principal },

    /// The canister ranges of the subnet could not be decoded.
    #[error("cannot decode the canister ranges of subnet {subnet_id}: {reason}")]
    MalformedCanisterRanges {
        subnet_id: Principal,
        reason: String,
    },

    /// The certificate carries no `time` entry.
    #[error("certificate does not contain a time")]
    MissingTime,

    /// The `time` entry is not a valid unsigned LEB128 timestamp.
    #[error("cannot decode the certificate time: {0}")]
    MalformedTime(String),

    /// The certificate is older than the freshness window allows.
    #[error(
        "certificate time {certificate_time} ns is older than the earliest accepted {earliest_accepted} ns"
    )]
    CertificateTooOld {
        certificate_time: u64,
        earliest_accepted: u64,
    },

    /// The certificate claims a time further in the future than the
    /// allowed clock drift.
    #[error(
        "certificate time {certificate_time} ns is newer than the latest accepted {latest_accepted} ns"
    )]
    CertificateTooNew {
        certificate_time: u64,
        latest_accepted: u64,
    },

    /// The threshold signature over the state root does not verify.
    #[error("invalid threshold signature over the state root")]
    SignatureVerificationFailed,

    /// The delegation certificate carries no public key for the subnet.
    #[error("no public key for subnet {subnet_id} in the delegation certificate")]
    SubnetKeyNotFound { subnet_id: Principal },

    /// The certified data of the canister does not match the expected
    /// digest.
    #[error("certified data of canister {canister_id} does not match the expected digest")]
    CertifiedDataMismatch { canister_id: Principal },
}
