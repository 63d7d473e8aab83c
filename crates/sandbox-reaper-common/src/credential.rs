//! Opaque credential handle
//!
//! Master credentials for sandbox accounts pass through logs-adjacent code
//! paths (config, account records, error contexts), so the wrapper redacts
//! itself in Debug and Display output.

use serde::Deserialize;

/// An account credential. The secret is only reachable via [`Credential::expose`].
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building auth requests
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let cred = Credential::new("super-secret");
        assert_eq!(format!("{cred:?}"), "Credential(***)");
        assert_eq!(format!("{cred}"), "***");
        assert_eq!(cred.expose(), "super-secret");
    }
}
