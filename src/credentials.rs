//! Credential pool with a rotation cursor
//!
//! Keys are interchangeable secrets for one provider, tried in insertion
//! order starting from the cursor. The cursor only moves after a send
//! resolves successfully.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keys of this length or shorter are rejected as obviously malformed
pub const MIN_KEY_LEN: usize = 11;

/// Number of numbered environment variables read by [`CredentialPool::from_env`]
const MAX_ENV_KEYS: usize = 5;

/// Ordered set of API keys plus the index to prefer for the next send
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Build a pool, dropping blank or too-short keys
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|k| k.into().trim().to_string())
            .filter(|k| k.len() >= MIN_KEY_LEN)
            .collect();

        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Load `BASE`, `BASE_2` ... `BASE_5` from the environment (and `.env`)
    pub fn from_env(base: &str) -> Self {
        let _ = dotenvy::dotenv();

        let keys: Vec<String> = (1..=MAX_ENV_KEYS)
            .map(|n| {
                if n == 1 {
                    base.to_string()
                } else {
                    format!("{}_{}", base, n)
                }
            })
            .filter_map(|var| std::env::var(var).ok())
            .collect();

        let pool = Self::new(keys);
        tracing::debug!(env = base, keys = pool.len(), "Loaded credential pool");
        pool
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current rotation cursor
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Key index for the given attempt number, starting from `start`
    pub fn index_for(&self, start: usize, attempt: usize) -> usize {
        (start + attempt) % self.keys.len()
    }

    /// Prefer the key after `used` for the next independent send
    pub fn advance_past(&self, used: usize) {
        if self.keys.is_empty() {
            return;
        }
        self.cursor
            .store((used + 1) % self.keys.len(), Ordering::SeqCst);
    }

    /// Move the cursor to an explicit position (wrapped into range)
    pub fn set_cursor(&self, cursor: usize) {
        if self.keys.is_empty() {
            return;
        }
        self.cursor.store(cursor % self.keys.len(), Ordering::SeqCst);
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fingerprints: Vec<String> = self.keys.iter().map(|k| fingerprint(k)).collect();
        f.debug_struct("CredentialPool")
            .field("keys", &fingerprints)
            .field("cursor", &self.cursor())
            .finish()
    }
}

/// Short non-secret identifier for a key (`gsk_…a1b2`)
pub fn fingerprint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "…".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
