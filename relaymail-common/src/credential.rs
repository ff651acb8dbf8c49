//! Password verification for stored credentials.
//!
//! Stored secrets are either bcrypt hashes (recognised by their `$2` prefix)
//! or legacy plaintext values kept for accounts created before hashing.

/// Marker prefix shared by every bcrypt hash variant (`$2a$`, `$2b$`, `$2y$`).
const BCRYPT_MARKER: &str = "$2";

/// Cost used when producing new hashes.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Check `presented` against the stored secret.
pub fn verify_password(stored: &str, presented: &str) -> bool {
    if stored.starts_with(BCRYPT_MARKER) {
        bcrypt::verify(presented, stored).unwrap_or(false)
    } else {
        constant_time_eq(stored.as_bytes(), presented.as_bytes())
    }
}

/// Produce a bcrypt hash suitable for the account configuration.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, cost)
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0u8, |acc, (l, r)| acc | (l ^ r))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_hashes_verify() {
        let hash = hash_password("secret", 4).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password(&hash, "secret"));
        assert!(!verify_password(&hash, "Secret"));
    }

    #[test]
    fn legacy_plaintext_compares_exactly() {
        assert!(verify_password("hunter2", "hunter2"));
        assert!(!verify_password("hunter2", "hunter3"));
        assert!(!verify_password("hunter2", "hunter22"));
    }

    #[test]
    fn malformed_bcrypt_hash_never_verifies() {
        assert!(!verify_password("$2b$not-a-hash", "$2b$not-a-hash"));
    }
}
