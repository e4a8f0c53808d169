//! Server identity, snapshots, and the diff between two snapshots.
//!
//! A [`Snapshot`] is the set of servers believed reachable after the last
//! successful poll. Diffing two snapshots yields a [`Delta`] whose lists are
//! always sorted, so emission order never depends on upstream list order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// On-disk shape of a key: `[name, address, port]`.
type KeyTriple = (String, String, u16);

/// Stable identity of a registry entry.
///
/// Field order matters: the derived `Ord` compares name, then address, then port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "KeyTriple", into = "KeyTriple")]
pub struct ServerKey {
    pub name: String,
    pub address: String,
    pub port: u16,
}

impl ServerKey {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }
}

impl From<KeyTriple> for ServerKey {
    fn from((name, address, port): KeyTriple) -> Self {
        Self {
            name,
            address,
            port,
        }
    }
}

impl From<ServerKey> for KeyTriple {
    fn from(key: ServerKey) -> Self {
        (key.name, key.address, key.port)
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.name, self.address, self.port)
    }
}

/// Set of servers known to be up. Iterates and serializes in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    keys: BTreeSet<ServerKey>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &ServerKey) -> bool {
        self.keys.contains(key)
    }

    /// Insert a key. Returns false if it was already present.
    pub fn insert(&mut self, key: ServerKey) -> bool {
        self.keys.insert(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerKey> {
        self.keys.iter()
    }

    /// Compute what changed going from `self` (previous) to `current`.
    pub fn diff(&self, current: &Snapshot) -> Delta {
        diff(self, current)
    }
}

impl FromIterator<ServerKey> for Snapshot {
    fn from_iter<I: IntoIterator<Item = ServerKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a ServerKey;
    type IntoIter = std::collections::btree_set::Iter<'a, ServerKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Kind of availability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Up,
    Down,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Up => "up",
            EventKind::Down => "down",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single availability change, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub server: ServerKey,
}

/// Result of diffing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Servers present now but not before, sorted.
    pub appeared: Vec<ServerKey>,
    /// Servers present before but not now, sorted.
    pub disappeared: Vec<ServerKey>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty()
    }

    pub fn len(&self) -> usize {
        self.appeared.len() + self.disappeared.len()
    }

    /// Events in emission order: every `Up` before any `Down`.
    pub fn events(&self) -> impl Iterator<Item = ServerEvent> + '_ {
        let ups = self.appeared.iter().map(|server| ServerEvent {
            kind: EventKind::Up,
            server: server.clone(),
        });
        let downs = self.disappeared.iter().map(|server| ServerEvent {
            kind: EventKind::Down,
            server: server.clone(),
        });
        ups.chain(downs)
    }
}

/// `appeared = current \ previous`, `disappeared = previous \ current`.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Delta {
    // BTreeSet::difference yields in ascending order, so both lists come out sorted.
    Delta {
        appeared: current.keys.difference(&previous.keys).cloned().collect(),
        disappeared: previous.keys.difference(&current.keys).cloned().collect(),
    }
}
