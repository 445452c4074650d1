//! Core data models for Grantry
//!
//! The three persisted records of the authorization subsystem: registered
//! clients, one-time authorization grants, and access/refresh token pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered third-party application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Public client identifier, unique and immutable
    pub client_id: String,

    /// Secret compared on every token request
    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Canonical callback URL
    pub redirect_uri: String,

    /// User who registered the application
    pub owner_user_id: String,

    /// Display name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// A one-time authorization code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: String,
    pub client_id: String,
    pub code: String,
    pub user_id: String,

    /// Exact redirect URI used at approval time
    pub redirect_uri: String,

    /// Space-delimited scope
    pub scope: String,
    pub expires: DateTime<Utc>,
}

impl Grant {
    /// A grant is valid only while `now < expires`
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// An access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,

    /// Space-delimited scope
    pub scope: String,

    /// Access token expiry
    pub expires: DateTime<Utc>,
}

impl Token {
    /// The access token is accepted only while `now < expires`
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// Counts reported by an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeStats {
    pub grants: u64,
    pub tokens: u64,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;
