use std::path::PathBuf;

use thiserror::Error;

/// Fatal discovery failures. Everything inside an accepted zone degrades
/// gracefully; these abort the run because they make zone boundaries or the
/// output artifact ambiguous.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("repository root '{0}' is not a readable directory")]
    UnreadableRoot(PathBuf),

    #[error("manual zone configuration is malformed: {0}")]
    InvalidConfig(String),

    #[error("profile failed schema validation: {0}")]
    InvalidProfile(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_input() {
        let err = DiscoveryError::UnreadableRoot(PathBuf::from("/no/such/dir"));
        assert!(err.to_string().contains("/no/such/dir"));

        let err = DiscoveryError::InvalidConfig("zone 'api' has empty path".to_string());
        assert!(err.to_string().contains("zone 'api'"));
    }
}
