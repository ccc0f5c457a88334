//! Identifiers for subdomains and the interfaces between them.
use feti_traits::Real;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a subdomain.
///
/// Ids are supplied by the caller. Their total order determines both the orientation of
/// interfaces and the layout of the global degrees of freedom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubdomainId(pub usize);

impl fmt::Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SubdomainId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

/// An interface seen from one of its subdomains: `(owner, neighbor)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceKey {
    pub owner: SubdomainId,
    pub neighbor: SubdomainId,
}

impl InterfaceKey {
    pub fn new(owner: SubdomainId, neighbor: SubdomainId) -> Self {
        Self { owner, neighbor }
    }

    /// The same interface seen from the neighbor.
    pub fn reversed(&self) -> Self {
        Self {
            owner: self.neighbor,
            neighbor: self.owner,
        }
    }

    /// Returns the canonical interface, or `None` if owner and neighbor coincide.
    pub fn interface(&self) -> Option<InterfaceId> {
        InterfaceId::new(self.owner, self.neighbor)
    }

    /// `+1` if the neighbor id is greater than the owner id, `-1` otherwise.
    ///
    /// The two subdomains sharing an interface therefore always carry opposite signs.
    pub fn sign<T: Real>(&self) -> T {
        if self.neighbor > self.owner {
            T::one()
        } else {
            -T::one()
        }
    }
}

/// An unordered pair of distinct subdomains, stored as `(first, second)` with `first < second`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceId {
    first: SubdomainId,
    second: SubdomainId,
}

impl InterfaceId {
    pub fn new(a: SubdomainId, b: SubdomainId) -> Option<Self> {
        if a < b {
            Some(Self { first: a, second: b })
        } else if b < a {
            Some(Self { first: b, second: a })
        } else {
            None
        }
    }

    pub fn first(&self) -> SubdomainId {
        self.first
    }

    pub fn second(&self) -> SubdomainId {
        self.second
    }

    pub fn contains(&self, id: SubdomainId) -> bool {
        self.first == id || self.second == id
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
