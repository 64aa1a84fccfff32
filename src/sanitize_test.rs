#[cfg(test)]
mod tests {
    use crate::sanitize::Sanitizer;
    use crate::test_utils::test_utils::create_test_config;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        let sanitizer = Sanitizer::new();

        let sanitized = sanitizer.sanitize(&config, "AC/DC");
        assert!(!sanitized.contains('/'));
        let recovered = sanitizer.unsanitize(&sanitized, || panic!("on_miss should not run on a hit")).unwrap();
        assert_eq!(recovered, "AC/DC");
    }

    #[test]
    fn test_sanitize_is_memoized() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        let sanitizer = Sanitizer::new();

        let first = sanitizer.sanitize(&config, "Carly Rae Jepsen");
        let second = sanitizer.sanitize(&config, "Carly Rae Jepsen");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unsanitize_miss_invokes_callback_then_retries() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        let sanitizer = Sanitizer::new();

        let mut called = false;
        let result = sanitizer.unsanitize("Never Seen", || {
            called = true;
            sanitizer.sanitize(&config, "Never/Seen");
            Ok(())
        });
        assert!(called);
        // The callback repopulated the map under whatever key `sanitize_dirname` produced, which
        // isn't necessarily "Never Seen", so this specific lookup still misses and errors out.
        assert!(result.is_err());
    }

    #[test]
    fn test_unsanitize_unknown_without_repopulation_errors() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        let _ = &config;
        let sanitizer = Sanitizer::new();
        let result = sanitizer.unsanitize("Ghost", || Ok(()));
        assert!(result.is_err());
    }
}
