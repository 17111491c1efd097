use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload shape a read returns: 16-bit words for holding/input
/// registers, bits for coils/discrete inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheValue {
    Registers(Vec<u16>),
    Bits(Vec<bool>),
}

impl CacheValue {
    pub fn len(&self) -> usize {
        match self {
            CacheValue::Registers(values) => values.len(),
            CacheValue::Bits(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached read result plus when it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: CacheValue, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    /// Seconds since this entry was written, clamped to zero for clock skew.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.cached_at).num_seconds().max(0)
    }

    pub fn is_expired(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        self.age_seconds(now) >= ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expires_after_ttl() {
        let entry = CacheEntry::new(CacheValue::Registers(vec![1, 2, 3]), Utc::now());
        let later = Utc::now() + Duration::seconds(31);
        assert!(entry.is_expired(30, later));
        assert!(!entry.is_expired(60, later));
    }

    #[test]
    fn value_len_matches_variant() {
        assert_eq!(CacheValue::Bits(vec![true, false, true]).len(), 3);
        assert_eq!(CacheValue::Registers(vec![]).len(), 0);
    }
}
