//! Name allow-list for tracked servers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Set of server names to track. Empty means track everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchFilter {
    names: BTreeSet<String>,
}

impl WatchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` should be tracked.
    pub fn accepts(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.contains(name)
    }

    /// Add a name. Returns false if it was already present.
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Remove a name. Returns false if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for WatchFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Free-function form used by the poll cycle.
pub fn accepts(name: &str, filter: &WatchFilter) -> bool {
    filter.accepts(name)
}
