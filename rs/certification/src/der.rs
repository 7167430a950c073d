//! DER envelopes of BLS12-381 G2 public keys.
//!
//! Keys in certificates travel inside a fixed DER envelope: a 37-byte
//! algorithm-identifier prefix followed by the 96-byte compressed G2 point,
//! 133 bytes in total. The prefix never varies, so unwrapping is a prefix
//! comparison rather than an ASN.1 parse.

use crate::CertificateVerificationError;

/// The DER algorithm-identifier prefix of a BLS12-381 G2 public key.
pub const DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c,
    0x05, 0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c,
    0x05, 0x03, 0x02, 0x01, 0x03, 0x61, 0x00,
];

/// The length of a compressed G2 public key.
pub const PUBLIC_KEY_LENGTH: usize = 96;

const DER_WRAPPED_KEY_LENGTH: usize = DER_PREFIX.len() + PUBLIC_KEY_LENGTH;

/// Strips the DER envelope off a BLS12-381 G2 public key.
///
/// The input must be exactly 133 bytes and start with the fixed prefix;
/// anything else is rejected.
pub fn extract_der(der_key: &[u8]) -> Result<&[u8], CertificateVerificationError> {
    if der_key.len() != DER_WRAPPED_KEY_LENGTH {
        return Err(CertificateVerificationError::MalformedDer {
            reason: format!(
                "expected {DER_WRAPPED_KEY_LENGTH} bytes, got {}",
                der_key.len()
            ),
            key: der_key.to_vec(),
        });
    }
    let (prefix, public_key) = der_key.split_at(DER_PREFIX.len());
    if prefix != DER_PREFIX {
        return Err(CertificateVerificationError::MalformedDer {
            reason: "missing the BLS12-381 G2 algorithm identifier prefix".to_string(),
            key: der_key.to_vec(),
        });
    }
    Ok(public_key)
}

/// Wraps a raw 96-byte public key into its DER envelope.
pub fn wrap_der(public_key: &[u8]) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(DER_WRAPPED_KEY_LENGTH);
    wrapped.extend_from_slice(&DER_PREFIX);
    wrapped.extend_from_slice(public_key);
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn wrapped_key_round_trips() {
        let public_key = [0x5Au8; PUBLIC_KEY_LENGTH];
        let wrapped = wrap_der(&public_key);
        assert_eq!(wrapped.len(), 133);
        assert_eq!(extract_der(&wrapped).unwrap(), public_key);
    }

    #[test]
    fn short_and_long_keys_are_rejected() {
        for len in [0, 96, 132, 134] {
            assert_matches!(
                extract_der(&vec![0u8; len]),
                Err(CertificateVerificationError::MalformedDer { .. })
            );
        }
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let mut wrapped = wrap_der(&[0u8; PUBLIC_KEY_LENGTH]);
        wrapped[0] ^= 1;
        assert_matches!(
            extract_der(&wrapped),
            Err(CertificateVerificationError::MalformedDer { .. })
        );
    }
}
