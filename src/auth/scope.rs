//! Scope vocabulary
//!
//! The closed set of permission strings a token may carry, plus the pure
//! validators used by the provider and the resource guard.

use crate::error::OAuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named permission limiting what a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Read the resource owner's profile
    User,
    /// Create and modify reviews
    Review,
    /// Vote on reviews
    Vote,
}

impl Scope {
    /// The global vocabulary
    pub const ALL: [Scope; 3] = [Scope::User, Scope::Review, Scope::Vote];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Review => "review",
            Scope::Vote => "vote",
        }
    }

    /// Short description shown on the consent prompt
    pub fn description(&self) -> &'static str {
        match self {
            Scope::User => "Access to your profile",
            Scope::Review => "Create and modify your reviews",
            Scope::Vote => "Submit and delete votes on reviews",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Scope::User),
            "review" => Ok(Scope::Review),
            "vote" => Ok(Scope::Vote),
            _ => Err(OAuthError::InvalidScope),
        }
    }
}

/// Check that every whitespace-separated item of `requested` is in `allowed`.
///
/// `None` means the global vocabulary. Empty or blank input is invalid.
pub fn validate_scope(requested: &str, allowed: Option<&[Scope]>) -> bool {
    let allowed = allowed.unwrap_or(&Scope::ALL);
    let mut items = requested.split_whitespace().peekable();
    if items.peek().is_none() {
        return false;
    }
    items.all(|item| {
        item.parse::<Scope>()
            .map(|scope| allowed.contains(&scope))
            .unwrap_or(false)
    })
}

/// Parse a scope string into the vocabulary, failing with `InvalidScope`
pub fn parse_scopes(requested: &str) -> Result<Vec<Scope>, OAuthError> {
    if !validate_scope(requested, None) {
        return Err(OAuthError::InvalidScope);
    }
    let mut scopes = requested
        .split_whitespace()
        .map(Scope::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    scopes.sort();
    scopes.dedup();
    Ok(scopes)
}

/// Scopes stored on a persisted row. Unknown items are ignored.
pub fn stored_scopes(stored: &str) -> Vec<Scope> {
    stored
        .split_whitespace()
        .filter_map(|item| item.parse().ok())
        .collect()
}

/// True when every required scope is present in the stored scope string
pub fn scope_contains(stored: &str, required: &[Scope]) -> bool {
    let granted = stored_scopes(stored);
    required.iter().all(|scope| granted.contains(scope))
}

/// True when `requested` is a non-empty subset of the `granted` scope string
pub fn is_subset(requested: &str, granted: &str) -> bool {
    let granted = stored_scopes(granted);
    validate_scope(requested, Some(&granted))
}

/// Canonical space-joined representation
pub fn join_scopes(scopes: &[Scope]) -> String {
    scopes
        .iter()
        .map(Scope::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_scope_global_vocabulary() {
        assert!(validate_scope("user", None));
        assert!(validate_scope("review vote", None));
        assert!(validate_scope("  vote\treview  ", None));
        assert!(!validate_scope("review admin", None));
        assert!(!validate_scope("", None));
        assert!(!validate_scope("   ", None));
    }

    #[test]
    fn test_validate_scope_allowed_set() {
        let allowed = [Scope::Review];
        assert!(validate_scope("review", Some(&allowed)));
        assert!(!validate_scope("review vote", Some(&allowed)));
        assert!(!validate_scope("user", Some(&[])));
    }

    #[test]
    fn test_parse_scopes_dedups_and_orders() {
        let scopes = parse_scopes("vote review vote").unwrap();
        assert_eq!(scopes, vec![Scope::Review, Scope::Vote]);
        assert_eq!(join_scopes(&scopes), "review vote");
        assert_eq!(parse_scopes("nope"), Err(OAuthError::InvalidScope));
    }

    #[test]
    fn test_scope_contains() {
        assert!(scope_contains("review vote", &[Scope::Review, Scope::Vote]));
        assert!(scope_contains("user review vote", &[Scope::Vote]));
        assert!(!scope_contains("review", &[Scope::Review, Scope::Vote]));
        assert!(scope_contains("", &[]));
    }

    #[test]
    fn test_is_subset() {
        assert!(is_subset("review", "review vote"));
        assert!(!is_subset("user", "review vote"));
        assert!(!is_subset("", "review"));
    }
}
