//! Deterministic idempotency keys.
//!
//! Both functions are pure: no I/O, no randomness, no clock.

use crate::RecordIdentity;
use sha2::{Digest, Sha256};

/// Prefix used for record keys unless the caller supplies another.
pub const DEFAULT_KEY_PREFIX: &str = "usage";

/// Hex characters of the digest kept in a record key.
const RECORD_HASH_LEN: usize = 12;

/// Delimiter between sorted record keys when hashing a batch.
const BATCH_KEY_DELIMITER: &str = "\n";

/// Build the key for one record: `{prefix}-{date}-{provider}-{model}-{hash12}`.
///
/// The readable part lets an operator scan keys by eye; the hash suffix
/// covers all five identity fields, including app and user ids.
pub fn record_key(prefix: &str, identity: &RecordIdentity) -> String {
    let digest = Sha256::digest(canonical_identity(identity).as_bytes());
    let hash = hex::encode(digest);
    format!(
        "{}-{}-{}-{}-{}",
        prefix,
        identity.usage_date,
        identity.provider,
        identity.model,
        &hash[..RECORD_HASH_LEN]
    )
}

/// Build the key for a batch from its record keys.
///
/// Keys are sorted before hashing, so reordering the records never changes
/// the result. An empty input yields an empty string.
pub fn batch_key<I, S>(record_keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<String> = record_keys
        .into_iter()
        .map(|k| k.as_ref().to_string())
        .collect();
    if keys.is_empty() {
        return String::new();
    }
    keys.sort();

    let joined = keys.join(BATCH_KEY_DELIMITER);
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// JSON array of the identity fields in fixed order.
///
/// Encoding as a JSON array keeps field boundaries unambiguous even when a
/// value contains the characters a plain delimiter would use.
fn canonical_identity(identity: &RecordIdentity) -> String {
    let fields = [
        identity.usage_date.as_str(),
        identity.provider.as_str(),
        identity.model.as_str(),
        identity.app_id.as_deref().unwrap_or(""),
        identity.user_id.as_deref().unwrap_or(""),
    ];
    // Serializing a fixed array of &str cannot fail.
    serde_json::to_string(&fields).unwrap_or_default()
}
