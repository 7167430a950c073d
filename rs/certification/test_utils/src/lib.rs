//! Builders for signed certificates.
//!
//! Tests need certificates that pass real BLS verification: a fresh
//! threshold key, a state tree with a `time` entry, a signature over the
//! domain-separated root hash, and optionally a subnet delegation. The
//! [`CertificateBuilder`] assembles all of that and emits the CBOR bytes a
//! replica would return.

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{G1Projective, G2Affine, Scalar};
use candid::Principal;
use ic_certification::{wrap_der, Certificate, Delegation, BLS_SIGNATURE_DST};
use ic_crypto_tree_hash::{fork, labeled, leaf, Digest, HashTree};
use pairing::group::{ff::Field, Curve};
use rand::rngs::OsRng;

/// Length-prefixed domain separator of state-root signatures; kept in sync
/// with the verifier.
const DOMAIN_IC_STATE_ROOT: &[u8; 14] = b"\x0Dic-state-root";

/// A BLS12-381 threshold keypair: secret scalar, public key in G2.
#[derive(Clone)]
pub struct KeyPair {
    secret: Scalar,
    public: G2Affine,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = Scalar::random(OsRng);
        let public = (G2Affine::generator() * secret).to_affine();
        Self { secret, public }
    }

    /// The compressed 96-byte public key.
    pub fn public_key(&self) -> [u8; 96] {
        self.public.to_compressed()
    }

    /// The DER-wrapped public key as it appears in certificates.
    pub fn der_public_key(&self) -> Vec<u8> {
        wrap_der(&self.public_key())
    }

    /// Signs `message` with the G1 signature scheme certificates use.
    pub fn sign(&self, message: &[u8]) -> [u8; 48] {
        let point = <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
            message,
            BLS_SIGNATURE_DST,
        );
        (point * self.secret).to_affine().to_compressed()
    }
}

/// What the certified state tree attests to.
#[derive(Clone, Debug)]
pub enum CertificateData {
    /// A canister's certified data, under
    /// `['canister', canister_id, 'certified_data']`.
    CanisterData {
        canister_id: Principal,
        certified_data: Digest,
    },
    /// A subnet's public key and canister ranges, under
    /// `['subnet', subnet_id, ...]`. Used for delegation certificates; the
    /// public key entry is filled in with the delegated key at build time.
    SubnetData {
        subnet_id: Principal,
        canister_id_ranges: Vec<(Principal, Principal)>,
    },
    /// An arbitrary state tree, e.g. `request_status` entries. Its top
    /// labels must sort before `"time"`.
    CustomTree(HashTree),
}

pub struct CertificateBuilder {
    data: CertificateData,
    key_pair: KeyPair,
    time_nanos: Option<u64>,
    delegatee_public_key: Option<Vec<u8>>,
    delegation: Option<Box<CertificateBuilder>>,
    invalid_signature: bool,
}

impl CertificateBuilder {
    pub fn new(data: CertificateData) -> Self {
        Self {
            data,
            key_pair: KeyPair::generate(),
            time_nanos: None,
            delegatee_public_key: None,
            delegation: None,
            invalid_signature: false,
        }
    }

    /// Sets the `time` entry of the certificate. Without it the tree
    /// carries no time at all.
    pub fn with_time(mut self, time_nanos: u64) -> Self {
        self.time_nanos = Some(time_nanos);
        self
    }

    /// Signs with the given key instead of a fresh one. Lets several
    /// certificates share a root of trust.
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = key_pair;
        self
    }

    /// Makes `delegation_builder`'s certificate attest this certificate's
    /// signing key: the built certificate is signed by this builder's key,
    /// and carries a delegation whose inner certificate (signed by the
    /// delegation builder's key, the root of trust) embeds this key as the
    /// subnet public key.
    pub fn with_delegation(mut self, delegation_builder: CertificateBuilder) -> Self {
        self.delegation = Some(Box::new(delegation_builder));
        self
    }

    /// Replaces the signature with one over a different message, so it is a
    /// well-formed G1 point that fails verification.
    pub fn with_invalid_signature(mut self) -> Self {
        self.invalid_signature = true;
        self
    }

    /// Builds the certificate. Returns the certificate, the DER-wrapped
    /// key to verify it against (the root of trust), and its CBOR bytes.
    pub fn build(self) -> (Certificate, Vec<u8>, Vec<u8>) {
        let tree = self.build_tree();
        let root_hash = tree.digest();

        let mut message = Vec::with_capacity(DOMAIN_IC_STATE_ROOT.len() + 32);
        message.extend_from_slice(DOMAIN_IC_STATE_ROOT);
        message.extend_from_slice(root_hash.as_bytes());
        let signature = if self.invalid_signature {
            self.key_pair.sign(b"some other message")
        } else {
            self.key_pair.sign(&message)
        };

        let (delegation, root_key) = match self.delegation {
            None => (None, self.key_pair.der_public_key()),
            Some(delegation_builder) => {
                let subnet_id = match &delegation_builder.data {
                    CertificateData::SubnetData { subnet_id, .. } => *subnet_id,
                    other => panic!("a delegation certificate needs SubnetData, got {other:?}"),
                };
                let delegatee_key = self.key_pair.der_public_key();
                let (_, root_key, inner_cbor) = delegation_builder
                    .with_delegatee_public_key(delegatee_key)
                    .build();
                (
                    Some(Delegation {
                        subnet_id: subnet_id.as_slice().to_vec(),
                        certificate: inner_cbor,
                    }),
                    root_key,
                )
            }
        };

        let certificate = Certificate {
            tree,
            signature: signature.to_vec(),
            delegation,
        };
        let cbor = serde_cbor::to_vec(&certificate).expect("failed to encode certificate");
        (certificate, root_key, cbor)
    }

    fn with_delegatee_public_key(mut self, der_public_key: Vec<u8>) -> Self {
        self.delegatee_public_key = Some(der_public_key);
        self
    }

    fn build_tree(&self) -> HashTree {
        let data_tree = match &self.data {
            CertificateData::CanisterData {
                canister_id,
                certified_data,
            } => labeled(
                "canister",
                labeled(
                    canister_id.as_slice(),
                    labeled("certified_data", leaf(certified_data.as_bytes())),
                ),
            ),
            CertificateData::SubnetData {
                subnet_id,
                canister_id_ranges,
            } => {
                let ranges: Vec<(serde_bytes::ByteBuf, serde_bytes::ByteBuf)> = canister_id_ranges
                    .iter()
                    .map(|(low, high)| {
                        (
                            serde_bytes::ByteBuf::from(low.as_slice()),
                            serde_bytes::ByteBuf::from(high.as_slice()),
                        )
                    })
                    .collect();
                let ranges_cbor =
                    serde_cbor::to_vec(&ranges).expect("failed to encode canister ranges");
                let public_key = self
                    .delegatee_public_key
                    .clone()
                    .expect("SubnetData is only built as a delegation certificate");
                labeled(
                    "subnet",
                    labeled(
                        subnet_id.as_slice(),
                        fork(
                            labeled("canister_ranges", leaf(ranges_cbor)),
                            labeled("public_key", leaf(public_key)),
                        ),
                    ),
                )
            }
            CertificateData::CustomTree(tree) => tree.clone(),
        };
        match self.time_nanos {
            None => data_tree,
            Some(time_nanos) => {
                let mut encoded = Vec::new();
                leb128::write::unsigned(&mut encoded, time_nanos)
                    .expect("writing LEB128 to a Vec cannot fail");
                fork(data_tree, labeled("time", leaf(encoded)))
            }
        }
    }
}
