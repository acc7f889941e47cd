//! Tracking of connected clients for the display engine
//!
//! This module is the source of truth for which clients are connected:
//! - Admission on connect, rejecting duplicate sessions
//! - Eviction on disconnect, tolerating clients that are already gone
//! - Point-in-time snapshots for the refresh worker to iterate
//! - Session numbers that tell two connections of the same id apart
//!
//! Only the engine's event loop mutates the roster. The refresh worker reads
//! snapshots, so admits and evicts never invalidate an iteration in progress.

use crate::error::DisplayError;
use display_shared::ClientId;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A connected client as seen by the roster
///
/// Each entry records:
/// - The client's identifier
/// - The session number assigned at admission
/// - When the client connected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub client: ClientId,
    /// Monotonic per roster, never reused
    pub session: u64,
    pub connected_at: Instant,
}

impl RosterEntry {
    /// How long this session has been connected
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Consistent copy of the roster at one instant
///
/// Iterating a snapshot never observes admits or evicts that happen after it
/// was taken, and the snapshot can be iterated as many times as needed.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    entries: Arc<[RosterEntry]>,
}

impl RosterSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, RosterEntry> {
        self.entries.iter()
    }

    pub fn client_ids(&self) -> impl Iterator<Item = &ClientId> + '_ {
        self.entries.iter().map(|entry| &entry.client)
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.entries.iter().any(|entry| &entry.client == client)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a RosterSnapshot {
    type Item = &'a RosterEntry;
    type IntoIter = std::slice::Iter<'a, RosterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The live set of connected clients
///
/// The RosterTracker enforces one session per client id and hands out
/// session numbers so that a frame rendered for an earlier connection can be
/// recognised as stale after the same id reconnects.
#[derive(Debug)]
pub struct RosterTracker {
    /// Connected clients indexed by their id
    entries: HashMap<ClientId, RosterEntry>,
    /// Session number for the next admission
    next_session: u64,
}

impl RosterTracker {
    /// Creates an empty roster
    ///
    /// Session numbers start from 1 and increment for each admission.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_session: 1,
        }
    }

    /// Admits a newly connected client
    ///
    /// Returns the new roster entry, or `AlreadyConnected` if the id already
    /// has a live session. The existing session is left untouched in that case.
    pub fn admit(&mut self, client: ClientId) -> Result<RosterEntry, DisplayError> {
        if self.entries.contains_key(&client) {
            return Err(DisplayError::AlreadyConnected(client));
        }

        let entry = RosterEntry {
            client: client.clone(),
            session: self.next_session,
            connected_at: Instant::now(),
        };
        self.next_session += 1;

        info!("Client {} admitted (session {})", client, entry.session);
        self.entries.insert(client, entry.clone());
        Ok(entry)
    }

    /// Evicts a disconnected client
    ///
    /// Returns the removed entry, or None if the client was already gone.
    /// Disconnects racing with external cleanup are expected, so a missing
    /// client is not an error.
    pub fn evict(&mut self, client: &ClientId) -> Option<RosterEntry> {
        match self.entries.remove(client) {
            Some(entry) => {
                info!(
                    "Client {} evicted after {:.1}s (session {})",
                    client,
                    entry.connected_for().as_secs_f32(),
                    entry.session
                );
                Some(entry)
            }
            None => {
                debug!("Evict for unknown client {} ignored", client);
                None
            }
        }
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.entries.contains_key(client)
    }

    /// Returns true if `client` is connected under the given session
    ///
    /// Used right before applying a rendered frame: a frame for a session
    /// that has since ended must not be applied, even if the same id has
    /// reconnected in the meantime.
    pub fn is_current(&self, client: &ClientId, session: u64) -> bool {
        self.entries
            .get(client)
            .is_some_and(|entry| entry.session == session)
    }

    pub fn entry(&self, client: &ClientId) -> Option<&RosterEntry> {
        self.entries.get(client)
    }

    /// Takes a point-in-time copy of the roster, ordered by session
    pub fn snapshot(&self) -> RosterSnapshot {
        let mut entries: Vec<RosterEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.session);

        RosterSnapshot {
            entries: entries.into(),
        }
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RosterTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Test suite for roster bookkeeping
///
/// Tests cover admission, eviction, session numbering and snapshot
/// isolation from later changes.
#[cfg(test)]
mod tests {
    use super::*;

    fn steve() -> ClientId {
        ClientId::new("steve")
    }

    fn alex() -> ClientId {
        ClientId::new("alex")
    }

    #[test]
    fn test_roster_creation() {
        let roster = RosterTracker::new();
        assert!(roster.is_empty());
        assert_eq!(roster.len(), 0);
        assert!(roster.snapshot().is_empty());
    }

    #[test]
    fn test_admit_client() {
        let mut roster = RosterTracker::new();

        let entry = roster.admit(steve()).unwrap();
        assert_eq!(entry.client, steve());
        assert_eq!(entry.session, 1);
        assert_eq!(roster.len(), 1);
        assert!(roster.contains(&steve()));
    }

    #[test]
    fn test_admit_twice_rejected() {
        let mut roster = RosterTracker::new();
        roster.admit(steve()).unwrap();

        let result = roster.admit(steve());
        assert_eq!(result, Err(DisplayError::AlreadyConnected(steve())));
        assert_eq!(roster.len(), 1);
        assert!(roster.is_current(&steve(), 1));
    }

    #[test]
    fn test_evict_client() {
        let mut roster = RosterTracker::new();
        roster.admit(steve()).unwrap();

        let removed = roster.evict(&steve());
        assert_eq!(removed.map(|e| e.session), Some(1));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_evict_unknown_is_noop() {
        let mut roster = RosterTracker::new();
        roster.admit(alex()).unwrap();

        assert!(roster.evict(&steve()).is_none());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_reconnect_gets_new_session() {
        let mut roster = RosterTracker::new();

        let first = roster.admit(steve()).unwrap();
        roster.evict(&steve());
        let second = roster.admit(steve()).unwrap();

        assert_ne!(first.session, second.session);
        assert!(!roster.is_current(&steve(), first.session));
        assert!(roster.is_current(&steve(), second.session));
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let mut roster = RosterTracker::new();
        roster.admit(steve()).unwrap();
        roster.admit(alex()).unwrap();

        let snapshot = roster.snapshot();
        roster.evict(&steve());
        roster.admit(ClientId::new("herobrine")).unwrap();

        let ids: Vec<&ClientId> = snapshot.client_ids().collect();
        assert_eq!(ids, vec![&steve(), &alex()]);
        assert!(snapshot.contains(&steve()));
        assert!(!snapshot.contains(&ClientId::new("herobrine")));
    }

    #[test]
    fn test_snapshot_is_restartable() {
        let mut roster = RosterTracker::new();
        roster.admit(steve()).unwrap();
        roster.admit(alex()).unwrap();

        let snapshot = roster.snapshot();
        let first: Vec<u64> = snapshot.iter().map(|e| e.session).collect();
        let second: Vec<u64> = (&snapshot).into_iter().map(|e| e.session).collect();

        assert_eq!(first, vec![1, 2]);
        assert_eq!(first, second);
    }
}
