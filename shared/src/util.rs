//! Small shared helpers

/// Current UTC timestamp (millis)
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: per-process sequence with a random starting point
///     (4096 distinct values per ms within one process)
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicI64, Ordering};
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    static SEQ: OnceLock<AtomicI64> = OnceLock::new();
    let seq = SEQ
        .get_or_init(|| AtomicI64::new(rand::thread_rng().gen_range(0..0x1000)))
        .fetch_add(1, Ordering::Relaxed);
    let ts = (now_millis() - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    (ts << 12) | (seq & 0xFFF)
}

/// Opaque checkout token
pub fn checkout_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Human-facing order number: `PS-YYYYMMDD-XXXXXX`
///
/// The suffix uses Crockford base-32 (no I, L, O, U) so it can be read
/// over the phone.
pub fn order_number(now_millis: i64) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
    let date = chrono::DateTime::from_timestamp_millis(now_millis)
        .unwrap_or_default()
        .format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("PS-{date}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_is_positive_and_js_safe() {
        let id = snowflake_id();
        assert!(id > 0);
        assert!(id < (1_i64 << 53));
    }

    #[test]
    fn test_snowflake_unique_in_burst() {
        let ids: std::collections::HashSet<i64> = (0..1000).map(|_| snowflake_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_order_number_format() {
        // 2026-03-14 12:00:00 UTC
        let n = order_number(1_773_489_600_000);
        assert!(n.starts_with("PS-20260314-"), "{n}");
        assert_eq!(n.len(), "PS-20260314-".len() + 6);
    }

    #[test]
    fn test_checkout_tokens_are_unique() {
        assert_ne!(checkout_token(), checkout_token());
    }
}
