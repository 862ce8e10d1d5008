//! Authentication collaborator seam.
//!
//! Credential verification lives outside the core: some external layer
//! (JWT verification, a session store) turns a bearer credential into an
//! identity. The core only defines the seam and trusts the returned id as
//! authoritative for all actor checks.

use crate::error::{CoreError, Result};

/// Identity returned by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Opaque subject id; matches the member id in the presence store.
    pub id: String,
    /// Email claim, if the credential carried one.
    pub email: String,
}

/// Verifies a bearer credential and resolves it to an identity.
///
/// Implementations must fail with [`CoreError::Unauthorized`] for missing,
/// invalid, or expired credentials.
pub trait Authenticator: Send + Sync {
    /// Resolves `bearer` to the identity it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the credential is missing,
    /// invalid, or expired.
    fn authenticate(&self, bearer: &str) -> Result<AuthUser>;
}

/// Token-map authenticator for tests and local development.
///
/// Maps fixed bearer strings to identities. Real deployments verify
/// credentials outside the core.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    tokens: std::collections::HashMap<String, AuthUser>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticAuthenticator {
    /// Creates an empty authenticator; every credential is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bearer` as a valid credential for the given identity.
    #[must_use]
    pub fn with_token(
        mut self,
        bearer: impl Into<String>,
        id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.tokens.insert(
            bearer.into(),
            AuthUser {
                id: id.into(),
                email: email.into(),
            },
        );
        self
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, bearer: &str) -> Result<AuthUser> {
        self.tokens
            .get(bearer)
            .cloned()
            .ok_or_else(|| CoreError::Unauthorized("invalid or expired credential".to_string()))
    }
}
