//! Principal model and the authentication service seam.
//!
//! # Responsibility
//! - Describe the authenticated actor attributed to audit entries.
//! - Define the contract of the external authentication service.
//! - Provide role checks for boundary layers.
//!
//! Token issuance and password verification live outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VIEWER: &str = "viewer";

/// Authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(id: i64, email: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            email: email.into(),
            full_name: None,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` when the principal holds at least one of `required`.
    pub fn has_any_role(&self, required: &[&str]) -> bool {
        required.iter().any(|role| self.roles.contains(*role))
    }
}

/// Boundary-layer authentication/authorization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, invalid or expired credentials.
    Unauthorized(String),
    /// Authenticated but lacking every required role.
    Forbidden { required: Vec<String> },
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized(reason) => write!(f, "unauthorized: {reason}"),
            Self::Forbidden { required } => write!(
                f,
                "insufficient role; requires one of: {}",
                required.join(", ")
            ),
        }
    }
}

impl Error for AuthError {}

/// Contract of the external authentication service.
///
/// Deployments plug their identity provider in here; [`StaticAuthenticator`]
/// covers local tooling and tests.
pub trait Authenticator {
    /// Checks credentials; `Ok(None)` means they did not match an active user.
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<Principal>, AuthError>;
    /// Resolves a bearer token to its principal.
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Fixed users and tokens held in memory.
///
/// Passwords are kept only as BLAKE3 digests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, (blake3::Hash, Principal)>,
    tokens: HashMap<String, Principal>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `principal` under its email with `password`.
    pub fn with_user(mut self, principal: Principal, password: &str) -> Self {
        let digest = blake3::hash(password.as_bytes());
        self.users
            .insert(principal.email.clone(), (digest, principal));
        self
    }

    /// Registers a bearer token for `principal`.
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<Principal>, AuthError> {
        let Some((digest, principal)) = self.users.get(email.trim()) else {
            return Ok(None);
        };
        // blake3::Hash equality is constant-time.
        if *digest != blake3::hash(password.as_bytes()) {
            return Ok(None);
        }
        Ok(Some(principal.clone()))
    }

    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthorized("missing token".to_string()));
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Unauthorized("invalid token".to_string()))
    }
}

/// Ensures `principal` holds at least one of `required`.
pub fn require_roles<'p>(principal: &'p Principal, required: &[&str]) -> Result<&'p Principal, AuthError> {
    if principal.has_any_role(required) {
        return Ok(principal);
    }
    Err(AuthError::Forbidden {
        required: required.iter().map(|role| (*role).to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        require_roles, AuthError, Authenticator, Principal, StaticAuthenticator, ROLE_ADMIN,
        ROLE_VIEWER,
    };

    fn authenticator() -> StaticAuthenticator {
        let admin = Principal::new(1, "admin@example.com", [ROLE_ADMIN]);
        StaticAuthenticator::new()
            .with_user(admin.clone(), "s3cret")
            .with_token("tok-1", admin)
    }

    #[test]
    fn static_authenticator_checks_password() {
        let auth = authenticator();
        let principal = auth.authenticate(" admin@example.com", "s3cret").unwrap();
        assert_eq!(principal.map(|p| p.id), Some(1));
        assert_eq!(auth.authenticate("admin@example.com", "wrong").unwrap(), None);
        assert_eq!(auth.authenticate("nobody@example.com", "s3cret").unwrap(), None);
    }

    #[test]
    fn static_authenticator_resolves_tokens() {
        let auth = authenticator();
        assert_eq!(auth.verify("tok-1").unwrap().email, "admin@example.com");
        assert!(matches!(auth.verify("tok-2"), Err(AuthError::Unauthorized(_))));
        assert!(matches!(auth.verify("  "), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn require_roles_accepts_any_matching_role() {
        let viewer = Principal::new(7, "viewer@example.com", [ROLE_VIEWER]);
        assert!(require_roles(&viewer, &[ROLE_ADMIN, ROLE_VIEWER]).is_ok());
    }

    #[test]
    fn require_roles_rejects_missing_role() {
        let viewer = Principal::new(7, "viewer@example.com", [ROLE_VIEWER]);
        let err = require_roles(&viewer, &[ROLE_ADMIN]).unwrap_err();
        assert_eq!(
            err,
            AuthError::Forbidden {
                required: vec![ROLE_ADMIN.to_string()]
            }
        );
        assert!(err.to_string().contains("admin"));
    }
}
