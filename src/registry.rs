//! Page registry.
//!
//! Discovery writes pages into a [`PageRegistryBuilder`], possibly from many
//! threads. Before the bundler starts, the builder is frozen into a
//! [`PageRegistry`]: an immutable, sorted snapshot that synthesis reads
//! concurrently without locks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::LogicalPagePath;
use crate::PagesError;

// ---------------------------------------------------------------------------
// Page Metadata
// ---------------------------------------------------------------------------

/// Whether a route renders a page or answers as an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    #[default]
    Page,
    Endpoint,
}

/// Routing info attached by discovery. Carried through, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteInfo {
    /// Route pattern, e.g. `/blog/[slug]`.
    pub route: String,
    pub kind: PageKind,
    /// Dynamic parameter names, in declaration order.
    pub params: Vec<String>,
    pub prerender: bool,
}

/// What the registry knows about one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PageMetadata {
    /// Import specifier of the real page implementation.
    pub module_specifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteInfo>,
}

impl PageMetadata {
    pub fn new(module_specifier: impl Into<String>) -> Self {
        Self {
            module_specifier: module_specifier.into(),
            route: None,
        }
    }

    pub fn with_route(mut self, route: RouteInfo) -> Self {
        self.route = Some(route);
        self
    }
}

// ---------------------------------------------------------------------------
// PageRegistryBuilder
// ---------------------------------------------------------------------------

/// Concurrent collector used while pages are being discovered.
#[derive(Debug, Default)]
pub struct PageRegistryBuilder {
    pages: DashMap<LogicalPagePath, PageMetadata>,
}

impl PageRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. A path may only be registered once.
    pub fn insert(&self, path: LogicalPagePath, metadata: PageMetadata) -> Result<(), PagesError> {
        match self.pages.entry(path) {
            Entry::Occupied(occupied) => Err(PagesError::DuplicatePage {
                path: occupied.key().to_string(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(metadata);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Take the immutable snapshot used for the rest of the build.
    pub fn freeze(self) -> PageRegistry {
        let pages: BTreeMap<_, _> = self.pages.into_iter().collect();
        PageRegistry {
            pages: Arc::new(pages),
        }
    }
}

// ---------------------------------------------------------------------------
// PageRegistry
// ---------------------------------------------------------------------------

/// Immutable page snapshot for one build. Clones share the same map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRegistry {
    pages: Arc<BTreeMap<LogicalPagePath, PageMetadata>>,
}

impl PageRegistry {
    /// Build a snapshot from `(path, metadata)` pairs, rejecting duplicate paths.
    pub fn from_pages<I, P>(pages: I) -> Result<Self, PagesError>
    where
        I: IntoIterator<Item = (P, PageMetadata)>,
        P: AsRef<str>,
    {
        let builder = PageRegistryBuilder::new();
        for (path, metadata) in pages {
            builder.insert(LogicalPagePath::new(path)?, metadata)?;
        }
        Ok(builder.freeze())
    }

    pub fn get(&self, path: &str) -> Option<&PageMetadata> {
        self.pages.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.pages.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pages in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&LogicalPagePath, &PageMetadata)> {
        self.pages.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &LogicalPagePath> {
        self.pages.keys()
    }
}

impl Serialize for PageRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.pages.iter())
    }
}

impl<'de> Deserialize<'de> for PageRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = PageRegistry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of logical page paths to page metadata")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let builder = PageRegistryBuilder::new();
                while let Some((path, metadata)) =
                    map.next_entry::<LogicalPagePath, PageMetadata>()?
                {
                    builder
                        .insert(path, metadata)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(builder.freeze())
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}
