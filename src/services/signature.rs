use ring::hmac;
use subtle::ConstantTimeEq;

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not valid hex")]
    MalformedSignature,

    #[error("Signature mismatch")]
    Mismatch,
}

/// Returns the hex encoded HMAC-SHA256 of `payload`
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

/// Constant-time check of a hex signature produced by [`sign`]
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> Result<(), SignatureError> {
    let tag = hex::decode(signature).map_err(|_| SignatureError::MalformedSignature)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);

    hmac::verify(&key, payload.as_bytes(), &tag).map_err(|_| SignatureError::Mismatch)
}

/// Compares two secrets without leaking where they differ
pub fn secrets_match(expected: &[u8], given: &[u8]) -> bool {
    expected.ct_eq(given).into()
}

/// Builds the canonical string signed for an asset path and its query parameters.
///
/// Leading slashes are ignored and parameters are sorted by name, so
/// `/images/a.jpg?w=10&h=5` and `images/a.jpg?h=5&w=10` share a signature.
/// The signature parameter `s` itself never takes part.
fn asset_payload(path: &str, params: &[(&str, &str)]) -> String {
    let mut params: Vec<_> = params.iter().filter(|(name, _)| *name != "s").collect();
    params.sort();

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", path.trim_start_matches('/'), query)
}

/// Signs an asset path (e.g. a profile photo)
pub fn sign_asset(path: &str, params: &[(&str, &str)], key: &[u8]) -> String {
    sign(&asset_payload(path, params), key)
}

pub fn verify_asset(
    path: &str,
    params: &[(&str, &str)],
    signature: &str,
    key: &[u8],
) -> Result<(), SignatureError> {
    verify(&asset_payload(path, params), signature, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"kernel-secret";

    #[test]
    fn test_sign_is_hex_sha256() {
        let signature = sign("images/photo.jpg", KEY);

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(verify("images/photo.jpg", &signature, KEY).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_payload_or_key() {
        let signature = sign("images/photo.jpg", KEY);

        assert!(matches!(
            verify("images/other.jpg", &signature, KEY),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify("images/photo.jpg", &signature, b"another-secret"),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify("images/photo.jpg", "not-hex", KEY),
            Err(SignatureError::MalformedSignature)
        ));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"c0ffee", b"c0ffee"));
        assert!(!secrets_match(b"c0ffee", b"c0ffef"));
        assert!(!secrets_match(b"c0ffee", b"c0ffee00"));
        assert!(!secrets_match(b"", b"c0ffee"));
    }

    #[test]
    fn test_asset_signature_is_order_and_slash_insensitive() {
        let a = sign_asset("/images/a.jpg", &[("w", "10"), ("h", "5")], KEY);
        let b = sign_asset("images/a.jpg", &[("h", "5"), ("w", "10")], KEY);

        assert_eq!(a, b);
        assert!(verify_asset("images/a.jpg", &[("h", "5"), ("w", "10"), ("s", &a)], &a, KEY).is_ok());
    }
}
