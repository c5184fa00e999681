// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Challenge/response authentication of guests.
//!
//! The host sends a random [`Nonce`] in its hello. The guest answers with a
//! client nonce and the [`Digest`]
//!
//! ```text
//! SHA-256( SHA-256(name "::" secret) ":" nonce_le_bytes ":" cnonce )
//! ```
//!
//! which the host recomputes with the secret it has configured for the guest.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use ring::digest::{Context, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;

/// Random 64-bit challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(u64);

impl Nonce {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Draw a nonce from the system random source.
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; 8];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| Error::Authentication("SystemRandom failed to generate nonce".to_string()))?;
        Ok(Self(u64::from_le_bytes(bytes)))
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 challenge response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn compute(nonce: Nonce, cnonce: &str, user_name: &str, secret: &str) -> Self {
        let mut a1 = Context::new(&SHA256);
        a1.update(user_name.as_bytes());
        a1.update(b"::");
        a1.update(secret.as_bytes());
        let a1 = a1.finish();

        let mut response = Context::new(&SHA256);
        response.update(a1.as_ref());
        response.update(b":");
        response.update(&nonce.value().to_le_bytes());
        response.update(b":");
        response.update(cnonce.as_bytes());

        let mut value = [0u8; 32];
        value.copy_from_slice(response.finish().as_ref());
        Self(value)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse the lower- or upper-case hex form.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 || !s.is_ascii() {
            return None;
        }

        let mut value = [0u8; 32];
        for (byte, chunk) in value.iter_mut().zip(s.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(chunk).ok()?;
            *byte = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(value))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Policy consulted by the host before admitting a guest.
pub trait AuthManager: Send + Sync {
    /// Challenge to send to a connecting guest, or `None` to admit it
    /// without authentication.
    fn requires_authentication(&self, remote_endpoint: &str, guest_name: &str) -> Option<Nonce>;

    /// Check the guest's answer to `nonce`.
    fn verify_authentication(
        &self,
        remote_endpoint: &str,
        guest_name: &str,
        nonce: Nonce,
        cnonce: &str,
        response: &Digest,
    ) -> bool;
}

/// Shared-secret policy: every guest must authenticate with the secret
/// configured for its name, or with the default secret.
#[derive(Debug, Clone)]
pub struct SecretAuthManager {
    config: AuthConfig,
}

impl SecretAuthManager {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

impl AuthManager for SecretAuthManager {
    fn requires_authentication(&self, remote_endpoint: &str, _guest_name: &str) -> Option<Nonce> {
        match Nonce::random() {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                log::error!("[auth] challenge for '{}' uses a fixed nonce: {}", remote_endpoint, e);
                Some(Nonce::new(0))
            }
        }
    }

    fn verify_authentication(
        &self,
        remote_endpoint: &str,
        guest_name: &str,
        nonce: Nonce,
        cnonce: &str,
        response: &Digest,
    ) -> bool {
        let Some(secret) = self.config.secret_for(guest_name) else {
            log::warn!(
                "[auth] no secret configured for guest '{}' at '{}'",
                guest_name,
                remote_endpoint
            );
            return false;
        };

        Digest::compute(nonce, cnonce, guest_name, secret) == *response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = Digest::compute(Nonce::new(42), "7", "guest", "secret");
        let b = Digest::compute(Nonce::new(42), "7", "guest", "secret");
        let c = Digest::compute(Nonce::new(43), "7", "guest", "secret");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_digest_hex() {
        let digest = Digest::compute(Nonce::new(1), "2", "user", "pw");
        let hex = digest.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(Digest::from_hex(&hex), Some(digest));
        assert_eq!(Digest::from_hex(&hex.to_uppercase()), Some(digest));
        assert_eq!(Digest::from_hex("abc"), None);
        assert_eq!(Digest::from_hex(&"zz".repeat(32)), None);
    }

    #[test]
    fn test_random_nonces_differ() {
        let a = Nonce::random().expect("nonce");
        let b = Nonce::random().expect("nonce");
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_manager() {
        let manager = SecretAuthManager::new(AuthConfig::default().secret("sensor", "s3cr3t"));
        let nonce = manager
            .requires_authentication("local:/", "sensor")
            .expect("challenge");

        let good = Digest::compute(nonce, "99", "sensor", "s3cr3t");
        let bad = Digest::compute(nonce, "99", "sensor", "wrong");
        assert!(manager.verify_authentication("local:/", "sensor", nonce, "99", &good));
        assert!(!manager.verify_authentication("local:/", "sensor", nonce, "99", &bad));

        let unknown = Digest::compute(nonce, "99", "other", "s3cr3t");
        assert!(!manager.verify_authentication("local:/", "other", nonce, "99", &unknown));
    }
}
