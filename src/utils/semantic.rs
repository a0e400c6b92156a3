use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Deterministic semantic hash for interpreter cache keys.
///
/// Uses a lower-cased, trimmed version of the input combined with the
/// context date so that whitespace and casing variations share a cache
/// entry while "tomorrow" never leaks across days.
pub fn semantic_hash(input: &str, context_date: &str) -> String {
    let mut hasher = Sha256::new();
    let normalized = input.trim().to_lowercase();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(context_date.as_bytes());

    let digest = hasher.finalize();
    STANDARD_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casing_and_whitespace_share_a_key() {
        assert_eq!(
            semantic_hash("  Create a TASK ", "2024-01-15"),
            semantic_hash("create a task", "2024-01-15"),
        );
    }

    #[test]
    fn context_date_partitions_keys() {
        assert_ne!(
            semantic_hash("schedule for tomorrow", "2024-01-15"),
            semantic_hash("schedule for tomorrow", "2024-01-16"),
        );
    }
}
