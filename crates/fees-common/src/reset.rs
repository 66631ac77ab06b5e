//! Password reset codes
//!
//! Time-bounded, single-use codes keyed by email. Entries expire on a
//! fixed TTL and are invalidated the moment they are consumed.

use moka::sync::Cache;
use rand::Rng;
use std::time::Duration;

const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Expiring store for reset codes
pub struct ResetCodeStore {
    codes: Cache<String, String>,
}

impl ResetCodeStore {
    /// Create a store whose codes live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Issue a fresh code for an email, replacing any outstanding one
    pub fn issue(&self, email: &str) -> String {
        let mut rng = rand::thread_rng();
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        self.codes.insert(email.to_lowercase(), code.clone());
        code
    }

    /// Consume a code. Returns true exactly once per issued code;
    /// wrong, expired, or replayed codes return false.
    pub fn consume(&self, email: &str, code: &str) -> bool {
        let key = email.to_lowercase();
        match self.codes.get(&key) {
            Some(stored) if stored == code => {
                self.codes.invalidate(&key);
                true
            }
            _ => false,
        }
    }
}
