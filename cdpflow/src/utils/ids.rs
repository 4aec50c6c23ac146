//! Execution identifiers.

use uuid::Uuid;

/// Generates a new execution id (UUID v4, hyphenated).
#[must_use]
pub fn generate_execution_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_is_v4() {
        let id = generate_execution_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }
}
