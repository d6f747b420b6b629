//! HMAC-signed object-storage URLs.
//!
//! Independent and stateless: a signature embeds everything needed to verify
//! it (method, object key, expiry), so an object store in front of this
//! service never needs a database round trip to accept or reject a request.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use eln_core::DomainError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Put,
    Get,
}

impl HttpMethod {
    fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Put => "PUT",
            HttpMethod::Get => "GET",
        }
    }
}

pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl UrlSigner {
    pub fn new(secret: Vec<u8>, base_url: impl Into<String>) -> Self {
        Self { secret, base_url: base_url.into() }
    }

    pub fn sign(&self, method: HttpMethod, object_key: &str, ttl: chrono::Duration) -> SignedUrl {
        let expires_at = Utc::now() + ttl;
        let signature = self.signature(method, object_key, expires_at.timestamp());
        let url = format!(
            "{}/{}?method={}&expires={}&sig={}",
            self.base_url.trim_end_matches('/'),
            object_key,
            method.as_str(),
            expires_at.timestamp(),
            signature,
        );
        SignedUrl { url, expires_at }
    }

    /// Verify a signature presented against `object_key`/`method`/`expires`.
    /// Returns `Unauthenticated` on expiry or mismatch; never touches a
    /// database.
    pub fn verify(&self, method: HttpMethod, object_key: &str, expires_unix: i64, signature_hex: &str) -> Result<(), DomainError> {
        if expires_unix < Utc::now().timestamp() {
            return Err(DomainError::Unauthenticated);
        }
        let expected = self.signature(method, object_key, expires_unix);
        if !constant_time_eq(expected.as_bytes(), signature_hex.as_bytes()) {
            return Err(DomainError::Unauthenticated);
        }
        Ok(())
    }

    fn signature(&self, method: HttpMethod, object_key: &str, expires_unix: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any length");
        mac.update(method.as_str().as_bytes());
        mac.update(b"\0");
        mac.update(object_key.as_bytes());
        mac.update(b"\0");
        mac.update(expires_unix.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(b"test-secret".to_vec(), "https://objects.example.test")
    }

    #[test]
    fn verify_accepts_its_own_signature() {
        let signer = signer();
        let signed = signer.sign(HttpMethod::Put, "exp/att-1", chrono::Duration::seconds(900));
        let query: std::collections::HashMap<_, _> = signed
            .url
            .split('?')
            .nth(1)
            .unwrap()
            .split('&')
            .map(|kv| {
                let mut parts = kv.splitn(2, '=');
                (parts.next().unwrap(), parts.next().unwrap())
            })
            .collect();
        let expires: i64 = query["expires"].parse().unwrap();
        signer.verify(HttpMethod::Put, "exp/att-1", expires, query["sig"]).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_object_key() {
        let signer = signer();
        let signed = signer.sign(HttpMethod::Get, "exp/att-1", chrono::Duration::seconds(300));
        let expires = signed.expires_at.timestamp();
        let sig = signed.url.split("sig=").nth(1).unwrap();
        assert!(signer.verify(HttpMethod::Get, "exp/att-2", expires, sig).is_err());
    }

    #[test]
    fn verify_rejects_expired_signature() {
        let signer = signer();
        let signature = signer.signature(HttpMethod::Get, "exp/att-1", 0);
        assert!(signer.verify(HttpMethod::Get, "exp/att-1", 0, &signature).is_err());
    }
}
