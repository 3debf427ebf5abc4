//! Small helpers shared by the services

use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Random alphanumeric string of `length` characters
pub fn random_string(length: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_is_alphanumeric() {
        let value = random_string(18);
        assert_eq!(value.len(), 18);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(value, random_string(18));
    }
}
