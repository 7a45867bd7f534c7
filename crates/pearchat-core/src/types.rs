//! Core types for PearChat

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod peer;

pub use peer::PeerRecord;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Render an unsigned integer in lowercase base36.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// `len` random lowercase base36 characters.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36_DIGITS[rng.random_range(0..36)] as char)
        .collect()
}

/// 32-bit rolling string hash (`h = h * 31 + unit`, wrapping), made non-negative.
fn rolling_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

fn clamp_ms(now_ms: Timestamp) -> u64 {
    now_ms.max(0) as u64
}

/// Session identity of a local participant.
///
/// Generated once per service instance and never persisted: every run gets a
/// fresh one. Format: `pk-<time36>-<random16>-<checksum8>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Generate a new pseudo-random identity stamped with `now_ms`.
    pub fn generate(now_ms: Timestamp) -> Self {
        let time36 = to_base36(clamp_ms(now_ms));
        let random = random_base36(16);
        let checksum: String = to_base36(rolling_hash(&format!("{}{}", time36, random)) as u64)
            .chars()
            .take(8)
            .collect();
        Self(format!("pk-{}-{}-{}", time36, random, checksum))
    }

    /// Wrap an existing identity string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last 8 characters, for log lines.
    pub fn short(&self) -> &str {
        short_id(&self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<String> for Identity {
    fn eq(&self, other: &String) -> bool {
        &self.0 == other
    }
}

/// Tail of an id for compact display.
pub fn short_id(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &id[start..]
}

/// Opaque room identifier scoping peer records and messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh room id: `room-<time36>-<random8>`.
    pub fn generate(now_ms: Timestamp) -> Self {
        Self(format!(
            "room-{}-{}",
            to_base36(clamp_ms(now_ms)),
            random_base36(8)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Local participant profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: Identity,
    pub display_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserProfile {
    pub fn new(identity: Identity, display_name: impl Into<String>, now_ms: Timestamp) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}
