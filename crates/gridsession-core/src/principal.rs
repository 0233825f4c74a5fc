//! Principal-name resolution for security-context attributes.
//!
//! A session's principal is normally derived from the authentication stored
//! by the host application's security layer. Rather than evaluating an
//! attribute path against an opaque object, known context types implement
//! [`HasPrincipalName`] directly.

use serde::{Deserialize, Serialize};

/// Attribute name holding an explicitly assigned principal name.
pub const PRINCIPAL_NAME_INDEX_NAME: &str = "principalName";

/// Attribute name under which the host application stores its security context.
pub const SECURITY_CONTEXT_ATTRIBUTE: &str = "SECURITY_CONTEXT";

/// Capability to expose the name of an authenticated principal.
pub trait HasPrincipalName {
    /// Principal name, or `None` when nothing is authenticated.
    fn principal_name(&self) -> Option<String>;
}

/// An authenticated principal and the authorities granted to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub name: String,
    #[serde(default)]
    pub authorities: Vec<String>,
}

impl Authentication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorities: Vec::new(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.push(authority.into());
        self
    }
}

impl HasPrincipalName for Authentication {
    fn principal_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

/// Security context stored as a session attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub authentication: Option<Authentication>,
}

impl SecurityContext {
    /// Context holding the given authentication.
    pub fn authenticated(authentication: Authentication) -> Self {
        Self {
            authentication: Some(authentication),
        }
    }

    /// Context with nobody logged in.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl HasPrincipalName for SecurityContext {
    fn principal_name(&self) -> Option<String> {
        self.authentication
            .as_ref()
            .and_then(HasPrincipalName::principal_name)
    }
}
