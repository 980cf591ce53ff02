//! Static catalog of tracked items.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// One tracked item. Built at startup, never mutated, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedItem {
    /// Stable identifier (e.g. `"firestorm"`).
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Where the fetcher reads the current value from.
    pub locator: String,
    /// Persistence handle of the item's history.
    pub history: PathBuf,
}

impl TrackedItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        locator: impl Into<String>,
        history: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            locator: locator.into(),
            history: history.into(),
        }
    }

    pub fn history(&self) -> &Path {
        &self.history
    }
}

/// Ordered, read-only set of tracked items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<TrackedItem>,
}

impl Catalog {
    /// Build a catalog. Uniqueness of ids is checked by [`crate::Config`].
    pub fn new(items: Vec<TrackedItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&TrackedItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
