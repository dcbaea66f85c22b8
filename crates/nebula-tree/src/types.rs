//! Identifiers and namespaces
//!
//! Provides [`NodeId`] for addressing nodes and [`Namespace`] for the five
//! independent forests of a project.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Opaque node identifier
///
/// Ids are assigned by the persistence collaborator. Drafts created on the
/// client side use a ULID until the collaborator replaces it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh client-side identifier
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("draft_{}", Ulid::new()))
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a child identifier by suffix (`<id>_<suffix>`)
    #[inline]
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One of the fixed top-level forests of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Web pages
    Pages,
    /// Mobile apps
    Apps,
    /// Backend services
    Apis,
    /// Database connections and schema objects
    Models,
    /// External system integrations
    External,
}

impl Namespace {
    /// All namespaces in sidebar order
    pub const ALL: [Namespace; 5] = [
        Namespace::Pages,
        Namespace::Apps,
        Namespace::Apis,
        Namespace::Models,
        Namespace::External,
    ];

    /// Stable lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Pages => "pages",
            Namespace::Apps => "apps",
            Namespace::Apis => "apis",
            Namespace::Models => "models",
            Namespace::External => "external",
        }
    }

    /// Position in [`Namespace::ALL`]
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Namespace::Pages => 0,
            Namespace::Apps => 1,
            Namespace::Apis => 2,
            Namespace::Models => 3,
            Namespace::External => 4,
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownNamespace(s.to_string()))
    }
}

/// Namespace name did not match any known forest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown namespace: {0} (expected pages, apps, apis, models or external)")]
pub struct UnknownNamespace(pub String);
