//! Broadcast context registry.
//!
//! Tracks named contexts (topics) with an active flag and a live subscriber
//! count. Static contexts come from configuration and live for the whole
//! process; dynamic contexts are created on first reference and may be
//! deleted. Every change happens under one lock around the context map, so
//! concurrent subscribe/unsubscribe events never lose updates.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Where a context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    Static,
    Dynamic,
}

/// Snapshot of one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub name: String,
    pub is_active: bool,
    pub connection_count: u64,
    pub origin: ContextOrigin,
}

/// What `increment` does with a name the registry has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownContextPolicy {
    /// Create the context as dynamic, then count the subscriber
    #[default]
    CreateOnDemand,
    /// Leave unknown names untracked
    Ignore,
}

/// Outcome of [`ContextRegistry::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    NotFound,
    /// Static contexts are never removed
    Permanent,
}

#[derive(Debug)]
struct Slot {
    name: String,
    is_active: bool,
    connection_count: u64,
    origin: ContextOrigin,
}

impl Slot {
    fn entry(&self) -> ContextEntry {
        ContextEntry {
            name: self.name.clone(),
            is_active: self.is_active,
            connection_count: self.connection_count,
            origin: self.origin,
        }
    }
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

/// Registry of broadcast contexts, shared by handle across the process.
#[derive(Debug)]
pub struct ContextRegistry {
    contexts: Mutex<HashMap<String, Slot>>,
    policy: UnknownContextPolicy,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new(UnknownContextPolicy::default())
    }
}

impl ContextRegistry {
    /// Create an empty registry.
    pub fn new(policy: UnknownContextPolicy) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Create a registry seeded with static contexts as `(name, active)`.
    ///
    /// Later duplicates of a name (case-insensitive) are ignored; callers
    /// that need to reject them validate beforehand.
    pub fn with_static<I, S>(policy: UnknownContextPolicy, contexts: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let registry = Self::new(policy);
        {
            let mut map = registry.contexts.lock();
            for (name, is_active) in contexts {
                let name = name.into();
                map.entry(key(&name)).or_insert(Slot {
                    name,
                    is_active,
                    connection_count: 0,
                    origin: ContextOrigin::Static,
                });
            }
        }
        registry
    }

    /// Return the context, creating an active dynamic one if absent.
    pub fn ensure(&self, name: &str) -> ContextEntry {
        let mut map = self.contexts.lock();
        map.entry(key(name))
            .or_insert_with(|| {
                debug!(context = %name, "Creating dynamic context");
                Slot {
                    name: name.to_string(),
                    is_active: true,
                    connection_count: 0,
                    origin: ContextOrigin::Dynamic,
                }
            })
            .entry()
    }

    pub fn get(&self, name: &str) -> Option<ContextEntry> {
        self.contexts.lock().get(&key(name)).map(Slot::entry)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.contexts.lock().contains_key(&key(name))
    }

    /// Count one more subscriber. Returns the new count, or `None` when the
    /// name is unknown and the policy is [`UnknownContextPolicy::Ignore`].
    pub fn increment(&self, name: &str) -> Option<u64> {
        let mut map = self.contexts.lock();
        let k = key(name);

        if !map.contains_key(&k) {
            match self.policy {
                UnknownContextPolicy::Ignore => {
                    debug!(context = %name, "Ignoring increment for unknown context");
                    return None;
                }
                UnknownContextPolicy::CreateOnDemand => {
                    map.insert(
                        k.clone(),
                        Slot {
                            name: name.to_string(),
                            is_active: true,
                            connection_count: 0,
                            origin: ContextOrigin::Dynamic,
                        },
                    );
                }
            }
        }

        map.get_mut(&k).map(|slot| {
            slot.connection_count += 1;
            slot.connection_count
        })
    }

    /// Count one subscriber less, floored at zero. `None` for unknown names.
    pub fn decrement(&self, name: &str) -> Option<u64> {
        self.contexts.lock().get_mut(&key(name)).map(|slot| {
            slot.connection_count = slot.connection_count.saturating_sub(1);
            slot.connection_count
        })
    }

    /// Remove a dynamic context. Static contexts are left in place.
    pub fn delete(&self, name: &str) -> DeleteOutcome {
        let mut map = self.contexts.lock();
        let k = key(name);
        match map.get(&k).map(|slot| slot.origin) {
            None => DeleteOutcome::NotFound,
            Some(ContextOrigin::Static) => DeleteOutcome::Permanent,
            Some(ContextOrigin::Dynamic) => {
                map.remove(&k);
                debug!(context = %name, "Deleted dynamic context");
                DeleteOutcome::Removed
            }
        }
    }

    /// Toggle discovery of a context. Returns false if it does not exist.
    pub fn set_active(&self, name: &str, active: bool) -> bool {
        match self.contexts.lock().get_mut(&key(name)) {
            Some(slot) => {
                slot.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Names of all active contexts, sorted case-insensitively.
    pub fn list_active(&self) -> Vec<String> {
        let map = self.contexts.lock();
        let active: BTreeSet<(&String, &str)> = map
            .iter()
            .filter(|(_, slot)| slot.is_active)
            .map(|(k, slot)| (k, slot.name.as_str()))
            .collect();
        active.into_iter().map(|(_, name)| name.to_string()).collect()
    }

    /// Every context, sorted by name.
    pub fn snapshot(&self) -> Vec<ContextEntry> {
        let map = self.contexts.lock();
        let mut entries: Vec<_> = map.values().map(Slot::entry).collect();
        entries.sort_by_key(|e| key(&e.name));
        entries
    }

    /// Sum of all subscriber counts.
    pub fn total_connections(&self) -> u64 {
        self.contexts
            .lock()
            .values()
            .map(|slot| slot.connection_count)
            .sum()
    }
}
