//! Registry of known keys per category.
//!
//! Built once from the agent configuration and shared by every mediator.
//! Keys are only ever added: the unknown-value sentinels get registered the
//! first time a pass needs them.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;

/// Reserved application key identifying the mediating host itself.
pub const SELF_APPLICATION_KEY: &str = "esb";

/// Registry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Applications,
    Operations,
    PayloadTypes,
    IdTypes,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Applications,
        Category::Operations,
        Category::PayloadTypes,
        Category::IdTypes,
    ];

    /// Sentinel key used when a value of this category cannot be resolved.
    pub fn sentinel(&self) -> &'static str {
        match self {
            Category::Applications => "unknownApplication",
            Category::Operations => "unknownOperation",
            Category::PayloadTypes => "unknownPayloadType",
            Category::IdTypes => "unknownIdType",
        }
    }

    /// Display entry registered alongside the sentinel.
    pub fn sentinel_entry(&self) -> &'static str {
        match self {
            Category::Applications => "Unknown application",
            Category::Operations => "Unknown operation",
            Category::PayloadTypes => "Unknown payload type",
            Category::IdTypes => "Unknown id type",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Applications => "application",
            Category::Operations => "operation",
            Category::PayloadTypes => "payload type",
            Category::IdTypes => "id type",
        }
    }

    fn index(&self) -> usize {
        match self {
            Category::Applications => 0,
            Category::Operations => 1,
            Category::PayloadTypes => 2,
            Category::IdTypes => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Known keys and their display entries, one map per category.
#[derive(Debug, Default)]
pub struct ValueRegistry {
    categories: [RwLock<IndexMap<String, String>>; 4],
}

impl ValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bulk load, used while reading configuration.
    pub fn with_entries<I, K, V>(self, category: Category, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, entry) in entries {
            self.ensure(category, key, entry);
        }
        self
    }

    pub fn exists(&self, category: Category, key: &str) -> bool {
        self.categories[category.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Display entry for a key, or the key itself when it is not registered.
    pub fn entry(&self, category: Category, key: &str) -> String {
        self.categories[category.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Insert a key if it is absent. Returns `true` when this call inserted.
    ///
    /// Check and insert happen under one write lock, so concurrent callers
    /// racing on the same key produce exactly one insert.
    pub fn ensure(
        &self,
        category: Category,
        key: impl Into<String>,
        entry: impl Into<String>,
    ) -> bool {
        let mut map = self.categories[category.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match map.entry(key.into()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                tracing::debug!(%category, key = %slot.key(), "registering key");
                slot.insert(entry.into());
                true
            }
        }
    }

    /// Register the sentinel of a category.
    pub fn ensure_sentinel(&self, category: Category) -> bool {
        self.ensure(category, category.sentinel(), category.sentinel_entry())
    }

    pub fn len(&self, category: Category) -> usize {
        self.categories[category.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn keys(&self, category: Category) -> Vec<String> {
        self.categories[category.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn application_exists(&self, key: &str) -> bool {
        self.exists(Category::Applications, key)
    }

    pub fn operation_exists(&self, key: &str) -> bool {
        self.exists(Category::Operations, key)
    }

    pub fn payload_type_exists(&self, key: &str) -> bool {
        self.exists(Category::PayloadTypes, key)
    }

    pub fn id_type_exists(&self, key: &str) -> bool {
        self.exists(Category::IdTypes, key)
    }
}
