//! Placement token domain types

use std::fmt;

/// File name the placement token is discovered and installed under
pub const TOKEN_FILENAME: &str = "ap-placement.tkn";

/// Install directory, relative to the user's home directory
pub const TOKEN_DIR: &str = ".condor/tokens.d";

/// Mode of the install directory (owner only)
pub const TOKEN_DIR_MODE: u32 = 0o700;

/// Mode of the installed token file (owner read/write only)
pub const TOKEN_FILE_MODE: u32 = 0o600;

/// Opaque bearer credential authorizing job placement at an access point
///
/// The bytes are never interpreted locally; validity and expiry are decided
/// by the access point when the credential is presented.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Vec<u8>);

impl Credential {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_whitespace())
    }

    /// Token text as sent in an `Authorization: Bearer` header
    pub fn bearer(&self) -> String {
        String::from_utf8_lossy(&self.0).trim().to_string()
    }

    /// Compares against a bearer string presented by a peer
    pub fn matches_bearer(&self, presented: &str) -> bool {
        self.bearer() == presented.trim()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes redacted>)", self.0.len())
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::from("secret.token.value");
        let shown = format!("{:?}", credential);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("18 bytes"));
    }

    #[test]
    fn test_bearer_trims_trailing_newline() {
        let credential = Credential::new(b"abc.def.ghi\n".to_vec());
        assert_eq!(credential.bearer(), "abc.def.ghi");
        assert!(credential.matches_bearer("abc.def.ghi"));
        assert!(!credential.matches_bearer("abc.def"));
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(Credential::new(b" \n\t".to_vec()).is_empty());
        assert!(!Credential::from("x").is_empty());
    }
}
