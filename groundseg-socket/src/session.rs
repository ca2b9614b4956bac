//! Collaborators stamped onto every outbound request: the session id read
//! from a cookie container and a fresh request id.

use uuid::Uuid;

/// Looks up the current session identifier.
pub trait SessionSource: Send + Sync {
    /// Return the value stored under `key` in `cookie`, if any.
    fn session_id(&self, cookie: &str, key: &str) -> Option<String>;
}

/// Generates request ids.
///
/// Uniqueness is the generator's concern, not the client's.
pub trait RequestIdGenerator: Send + Sync {
    fn generate(&self, len: usize) -> String;
}

/// Reads `name=value` pairs from a `Cookie` header style string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieJar;

impl SessionSource for CookieJar {
    fn session_id(&self, cookie: &str, key: &str) -> Option<String> {
        cookie
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == key)
            .map(|(_, value)| value.trim().to_string())
    }
}

/// Random hex ids drawn from v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl RequestIdGenerator for RandomIds {
    fn generate(&self, len: usize) -> String {
        let mut id = String::with_capacity(len + 32);
        while id.len() < len {
            id.push_str(&Uuid::new_v4().simple().to_string());
        }
        id.truncate(len);
        id
    }
}
