//! Namespaced registry of groupings
//!
//! Every grouping the engine shows is created, updated and removed through a
//! [`GroupRegistry`]. The registry mirrors what has been sent to the session
//! sink, so it is also the place that knows which names are taken.
//!
//! Names are derived from the registry key (a client id or a line priority),
//! never from the text a grouping displays. Two clients that both show up as
//! "Steve" therefore never compete for a name.

use crate::error::DisplayError;
use crate::sink::SessionSink;
use display_shared::{truncate_units, ClientId, GroupScope, Grouping, MAX_GROUP_NAME_LEN};
use log::{debug, error};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

/// Units taken by a salted suffix such as `~1f0a`.
const SALT_UNITS: usize = 5;

/// Salts tried before giving up on a name.
const MAX_SALT_ATTEMPTS: u32 = 1024;

/// Key a registry stores groupings under.
pub trait GroupKey: Clone + Eq + Hash + fmt::Debug {
    /// Stable seed the bounded grouping name is derived from.
    fn name_seed(&self) -> String;
}

impl GroupKey for ClientId {
    fn name_seed(&self) -> String {
        self.as_str().to_string()
    }
}

/// Sidebar lines are keyed by priority.
impl GroupKey for i32 {
    fn name_seed(&self) -> String {
        format!("l{}", self)
    }
}

/// Desired state of a grouping, minus its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub priority: i32,
    pub members: BTreeSet<ClientId>,
    pub prefix: String,
    pub suffix: String,
}

impl GroupSpec {
    /// Grouping with a single member, the usual case.
    pub fn single(
        member: ClientId,
        priority: i32,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            members: BTreeSet::from([member]),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    fn matches(&self, group: &Grouping) -> bool {
        self.priority == group.priority
            && self.members == group.members
            && self.prefix == group.prefix
            && self.suffix == group.suffix
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Groupings of one scope, keyed by their owner's key.
#[derive(Debug)]
pub struct GroupRegistry<K: GroupKey> {
    scope: GroupScope,
    entries: HashMap<K, Grouping>,
    /// Which key holds each name
    claims: HashMap<String, K>,
}

impl<K: GroupKey> GroupRegistry<K> {
    pub fn new(scope: GroupScope) -> Self {
        Self {
            scope,
            entries: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    pub fn scope(&self) -> &GroupScope {
        &self.scope
    }

    /// Bounded, unique name for `key`
    ///
    /// A registered key keeps the name it was created with. A new key gets
    /// its seed truncated to [`MAX_GROUP_NAME_LEN`] units; if another key
    /// already holds that name, a salted hash suffix is appended instead.
    /// The result only depends on the seed and on the names currently held.
    pub fn name_for(&self, key: &K) -> Result<String, DisplayError> {
        if let Some(existing) = self.entries.get(key) {
            return Ok(existing.name.clone());
        }

        let seed = key.name_seed();
        let candidate = truncate_units(&seed, MAX_GROUP_NAME_LEN);
        if !self.claims.contains_key(candidate) {
            return Ok(candidate.to_string());
        }

        let base = truncate_units(&seed, MAX_GROUP_NAME_LEN - SALT_UNITS);
        for salt in 0..MAX_SALT_ATTEMPTS {
            let name = format!("{}~{:04x}", base, salted_hash(&seed, salt) & 0xffff);
            if !self.claims.contains_key(&name) {
                debug!(
                    "Grouping name {:?} taken in {:?}, using {:?} for {:?}",
                    candidate, self.scope, name, key
                );
                return Ok(name);
            }
        }

        error!(
            "No free grouping name for {:?} in {:?} after {} salts",
            key, self.scope, MAX_SALT_ATTEMPTS
        );
        Err(DisplayError::NameCollision {
            scope: self.scope.clone(),
            name: candidate.to_string(),
        })
    }

    /// Creates or replaces the grouping under `key`
    ///
    /// An existing grouping is edited in place with a single sink call, so
    /// viewers never see it half updated. A grouping that already matches
    /// `spec` produces no sink traffic at all.
    pub fn upsert(
        &mut self,
        key: K,
        spec: GroupSpec,
        sink: &mut dyn SessionSink,
    ) -> Result<UpsertOutcome, DisplayError> {
        if let Some(group) = self.entries.get_mut(&key) {
            if spec.matches(group) {
                return Ok(UpsertOutcome::Unchanged);
            }

            group.priority = spec.priority;
            group.members = spec.members;
            group.prefix = spec.prefix;
            group.suffix = spec.suffix;
            sink.create_or_update_group(&self.scope, group);
            return Ok(UpsertOutcome::Updated);
        }

        let name = self.name_for(&key)?;
        if let Some(holder) = self.claims.get(&name) {
            // name_for only hands out unclaimed names
            error!(
                "Grouping name {:?} in {:?} derived for {:?} is held by {:?}",
                name, self.scope, key, holder
            );
            return Err(DisplayError::NameCollision {
                scope: self.scope.clone(),
                name,
            });
        }

        let group = Grouping {
            name: name.clone(),
            priority: spec.priority,
            members: spec.members,
            prefix: spec.prefix,
            suffix: spec.suffix,
        };
        sink.create_or_update_group(&self.scope, &group);

        self.claims.insert(name, key.clone());
        self.entries.insert(key, group);
        Ok(UpsertOutcome::Created)
    }

    /// Unregisters the grouping under `key`
    ///
    /// Returns false, without touching the sink, if there was none.
    pub fn remove(&mut self, key: &K, sink: &mut dyn SessionSink) -> bool {
        let Some(group) = self.entries.remove(key) else {
            return false;
        };

        self.claims.remove(&group.name);
        sink.remove_group(&self.scope, &group.name);
        debug!("Removed grouping {:?} from {:?}", group.name, self.scope);
        true
    }

    /// Removes every grouping whose key fails `keep`, returning how many
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool, sink: &mut dyn SessionSink) -> usize {
        let doomed: Vec<K> = self.entries.keys().filter(|key| !keep(key)).cloned().collect();
        for key in &doomed {
            self.remove(key, sink);
        }
        doomed.len()
    }

    /// Removes every grouping, returning how many there were
    pub fn clear(&mut self, sink: &mut dyn SessionSink) -> usize {
        self.retain(|_| false, sink)
    }

    pub fn get(&self, key: &K) -> Option<&Grouping> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    pub fn groupings(&self) -> impl Iterator<Item = &Grouping> + '_ {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 32-bit FNV-1a over the seed followed by the salt.
fn salted_hash(seed: &str, salt: u32) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    seed.bytes()
        .chain(salt.to_le_bytes())
        .fold(OFFSET, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}
