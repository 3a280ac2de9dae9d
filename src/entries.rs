//! Entry selection.
//!
//! Decides which pages become bundler entry points and merges them into the
//! bundler's input without disturbing entries other producers contributed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::PageRegistry;
use crate::utils::{self, PageNamespace, VirtualModuleId};
use crate::{OutputMode, PagesError};

/// Compute the entry ids for a build.
///
/// Server output never contributes entries: pages are resolved on demand.
/// Static output contributes one id per registered page, in sorted order.
pub fn select_entries(
    registry: &PageRegistry,
    namespace: &PageNamespace,
    mode: OutputMode,
) -> Result<BTreeSet<VirtualModuleId>, PagesError> {
    let mut entries = BTreeSet::new();
    if !mode.is_static() {
        debug!(?mode, "skipping page entries");
        return Ok(entries);
    }

    for path in registry.paths() {
        let id = namespace.encode(path)?;
        if !entries.insert(id) {
            // Unreachable while the codec is injective and registry keys are unique.
            return Err(PagesError::DuplicatePage {
                path: path.to_string(),
            });
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// EntryInput
// ---------------------------------------------------------------------------

/// The bundler's input option, in any of the shapes it accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryInput {
    #[default]
    Empty,
    Single(String),
    List(Vec<String>),
    /// Output name → module id.
    Named(BTreeMap<String, String>),
}

impl EntryInput {
    /// Additively merge `ids` into the input. Existing entries are never
    /// replaced or reordered; ids already present are skipped.
    /// Returns how many entries were added.
    pub fn add_inputs<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        match self {
            EntryInput::Empty | EntryInput::Single(_) | EntryInput::List(_) => {
                let mut list = match std::mem::take(self) {
                    EntryInput::Single(single) => vec![single],
                    EntryInput::List(list) => list,
                    _ => Vec::new(),
                };
                for id in ids {
                    let id = id.as_ref();
                    if !list.iter().any(|existing| existing == id) {
                        list.push(id.to_string());
                        added += 1;
                    }
                }
                *self = if list.is_empty() {
                    EntryInput::Empty
                } else {
                    EntryInput::List(list)
                };
            }
            EntryInput::Named(named) => {
                for id in ids {
                    let id = id.as_ref();
                    if named.values().any(|existing| existing == id) {
                        continue;
                    }
                    let name = unique_name(named, utils::entry_name(id));
                    named.insert(name, id.to_string());
                    added += 1;
                }
            }
        }
        added
    }

    /// All module ids in the input, in input order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            EntryInput::Empty => Vec::new(),
            EntryInput::Single(single) => vec![single.as_str()],
            EntryInput::List(list) => list.iter().map(String::as_str).collect(),
            EntryInput::Named(named) => named.values().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EntryInput::Empty => 0,
            EntryInput::Single(_) => 1,
            EntryInput::List(list) => list.len(),
            EntryInput::Named(named) => named.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First free name among `base`, `base-1`, `base-2`, ...
fn unique_name(named: &BTreeMap<String, String>, base: &str) -> String {
    if !named.contains_key(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !named.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}
