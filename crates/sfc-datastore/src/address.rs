//! Tree addressing
//!
//! Provides [`Address`] (container or container entry) and [`Partition`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Leaf that keys every list entry
pub const KEY_LEAF: &str = "name";

/// Logical partition of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partition {
    /// Intended configuration, written by management operations
    Configuration,
    /// Derived operational state
    Operational,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "config"),
            Self::Operational => write!(f, "operational"),
        }
    }
}

/// Hierarchical address of a tree node
///
/// Either a whole container (`key == None`) or a single keyed entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    container: Cow<'static, str>,
    key: Option<String>,
}

impl Address {
    /// Address of a root container
    #[inline]
    #[must_use]
    pub const fn container(name: &'static str) -> Self {
        Self {
            container: Cow::Borrowed(name),
            key: None,
        }
    }

    /// Address of the entry keyed `key` inside this address's container
    #[inline]
    #[must_use]
    pub fn child(&self, key: impl Into<String>) -> Self {
        Self {
            container: self.container.clone(),
            key: Some(key.into()),
        }
    }

    /// Address of the enclosing container
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Self {
        Self {
            container: self.container.clone(),
            key: None,
        }
    }

    /// Container name
    #[inline]
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container
    }

    /// Entry key, `None` for container addresses
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Whether this addresses a whole container
    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.key.is_none()
    }

    /// Whether `other` is an entry of the container addressed by `self`
    #[must_use]
    pub fn contains(&self, other: &Address) -> bool {
        self.is_container() && !other.is_container() && self.container == other.container
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}/{}", self.container, key),
            None => write!(f, "{}", self.container),
        }
    }
}
