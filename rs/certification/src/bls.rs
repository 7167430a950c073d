//! BLS12-381 threshold-signature verification.
//!
//! Certified state roots are signed with signatures in G1 (48 bytes) and
//! public keys in G2 (96 bytes), both in compressed form. Message hashing
//! follows draft-irtf-cfrg-hash-to-curve-16 with the
//! `BLS12381G1_XMD:SHA-256_SSWU_RO_` suite.

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{multi_miller_loop, G1Affine, G1Projective, G2Affine, G2Prepared};
use pairing::group::Group;

/// Domain separator for signatures over certified state roots.
pub const BLS_SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// The shape of an injectable signature verifier.
///
/// Returns `true` iff `signature` is a valid signature on `message` under
/// `public_key`. Any malformed input simply fails verification.
pub type BlsVerifier = fn(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool;

lazy_static::lazy_static! {
    static ref G2PREPARED_NEG_G: G2Prepared = (-G2Affine::generator()).into();
}

/// Verifies a BLS signature over `message`.
///
/// The naive check `e(sig, g2) == e(H(msg), pk)` is folded into a single
/// two-term multi-pairing against the negated G2 generator.
pub fn verify_bls_signature(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
    let Some(signature) = deserialize_g1(signature) else {
        return false;
    };
    let Some(public_key) = deserialize_g2(public_key) else {
        return false;
    };
    let message = G1Affine::from(
        <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
            message,
            BLS_SIGNATURE_DST,
        ),
    );

    let public_key_prepared = G2Prepared::from(public_key);
    multi_miller_loop(&[
        (&signature, &G2PREPARED_NEG_G),
        (&message, &public_key_prepared),
    ])
    .final_exponentiation()
    .is_identity()
    .into()
}

fn deserialize_g1(bytes: &[u8]) -> Option<G1Affine> {
    let bytes: &[u8; 48] = bytes.try_into().ok()?;
    // from_compressed includes the prime-order subgroup check, so this is
    // safe on untrusted inputs.
    Option::from(G1Affine::from_compressed(bytes))
}

fn deserialize_g2(bytes: &[u8]) -> Option<G2Affine> {
    let bytes: &[u8; 96] = bytes.try_into().ok()?;
    Option::from(G2Affine::from_compressed(bytes))
}
