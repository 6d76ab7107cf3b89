// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Keyed signing helpers shared by session tokens and OAuth state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Key derivation labels; each use of `SESSION_SECRET` gets its own key.
pub const SESSION_KEY_INFO: &[u8] = b"pulse-connect session token v1";
pub const OAUTH_STATE_KEY_INFO: &[u8] = b"pulse-connect oauth state v1";

/// Derive a 32-byte subkey from the configured secret (HKDF-SHA256).
pub fn derive_key(secret: &[u8], info: &[u8]) -> anyhow::Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {}", e))?;
    Ok(okm)
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign(key: &[u8], payload: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("HMAC init failed: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature produced by [`sign`].
pub fn verify(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

/// `len` bytes from the system CSPRNG, URL-safe base64 without padding.
pub fn random_token(len: usize) -> anyhow::Result<String> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("system random source unavailable"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = derive_key(b"a_long_enough_secret_for_testing", SESSION_KEY_INFO).unwrap();
        let sig = sign(&key, b"payload").unwrap();

        assert!(verify(&key, b"payload", &sig));
        assert!(!verify(&key, b"payload2", &sig));
        assert!(!verify(&key, b"payload", "not-hex"));
        assert!(!verify(&key, b"payload", &sig[..10]));
    }

    #[test]
    fn test_derived_keys_are_distinct() {
        let secret = b"a_long_enough_secret_for_testing";
        let session = derive_key(secret, SESSION_KEY_INFO).unwrap();
        let state = derive_key(secret, OAUTH_STATE_KEY_INFO).unwrap();
        assert_ne!(session, state);
        assert_eq!(session, derive_key(secret, SESSION_KEY_INFO).unwrap());
    }

    #[test]
    fn test_random_token() {
        let a = random_token(32).unwrap();
        let b = random_token(32).unwrap();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('.'));
    }
}
