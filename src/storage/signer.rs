//! HMAC signer backing the local backend's presigned URLs.
//!
//! The signature covers the method, the object key and the expiry instant,
//! so a URL grants exactly one operation on one key until it expires.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies blob URLs for the local storage backend
#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn string_to_sign(method: &str, key: &str, expires: i64) -> String {
        format!("{}\n{}\n{}", method.to_lowercase(), key, expires)
    }

    /// Produce the hex signature for (method, key, expires)
    pub fn sign(&self, method: &str, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(Self::string_to_sign(method, key, expires).as_bytes());
        let code_bytes = mac.finalize().into_bytes();

        code_bytes
            .iter()
            .map(|x| format!("{:02x}", x))
            .collect::<Vec<String>>()
            .join("")
    }

    /// Check a signature and its expiry against the current time
    pub fn verify(&self, method: &str, key: &str, expires: i64, signature: &str) -> bool {
        if expires < chrono::Utc::now().timestamp() {
            return false;
        }
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(Self::string_to_sign(method, key, expires).as_bytes());
        let provided = match decode_hex(signature) {
            Some(bytes) => bytes,
            None => return false,
        };
        mac.verify_slice(&provided).is_ok()
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
