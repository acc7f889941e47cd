//! Session sinks: where rendered display state ends up
//!
//! The presentation managers are the only writers of a sink, and they only
//! write from the engine's event loop. A sink is therefore a plain `&mut`
//! target with no locking of its own.

use display_shared::{encode_update, ClientId, DisplayUpdate, GroupScope, Grouping};
use log::error;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

/// Display operations the engine performs on connected sessions.
pub trait SessionSink: Send {
    /// Shows the sidebar panel of `client` with the given title.
    fn show_panel(&mut self, client: &ClientId, title: &str);

    /// Hides the sidebar panel of `client`, restoring the default view.
    fn hide_panel(&mut self, client: &ClientId);

    /// Sets the name other clients see for `client` in the tab list.
    fn set_visible_name(&mut self, client: &ClientId, name: &str);

    fn set_header(&mut self, client: &ClientId, header: &str);

    fn set_footer(&mut self, client: &ClientId, footer: &str);

    /// Creates the grouping, or updates it in place if the name exists.
    fn create_or_update_group(&mut self, scope: &GroupScope, group: &Grouping);

    /// Unregisters the grouping. Unknown names are ignored.
    fn remove_group(&mut self, scope: &GroupScope, name: &str);
}

/// Sink that keeps the resulting display state in memory
///
/// Mirrors exactly what a session would show, which makes it the reference
/// sink for tests and for inspecting engine output.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    panels: HashMap<ClientId, String>,
    visible_names: HashMap<ClientId, String>,
    headers: HashMap<ClientId, String>,
    footers: HashMap<ClientId, String>,
    groups: HashMap<GroupScope, BTreeMap<String, Grouping>>,
    operations: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panel_title(&self, client: &ClientId) -> Option<&str> {
        self.panels.get(client).map(String::as_str)
    }

    pub fn visible_name(&self, client: &ClientId) -> Option<&str> {
        self.visible_names.get(client).map(String::as_str)
    }

    pub fn header(&self, client: &ClientId) -> Option<&str> {
        self.headers.get(client).map(String::as_str)
    }

    pub fn footer(&self, client: &ClientId) -> Option<&str> {
        self.footers.get(client).map(String::as_str)
    }

    /// Groupings registered in `scope`, ordered by name
    pub fn groups(&self, scope: &GroupScope) -> Vec<&Grouping> {
        self.groups
            .get(scope)
            .map(|groups| groups.values().collect())
            .unwrap_or_default()
    }

    /// Groupings in `scope` ordered by descending priority, as rendered
    pub fn rendered_lines(&self, scope: &GroupScope) -> Vec<&Grouping> {
        let mut lines = self.groups(scope);
        lines.sort_by(|a, b| b.priority.cmp(&a.priority));
        lines
    }

    pub fn group(&self, scope: &GroupScope, name: &str) -> Option<&Grouping> {
        self.groups.get(scope).and_then(|groups| groups.get(name))
    }

    /// Total number of groupings across every scope
    pub fn group_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    /// Number of sink calls received so far
    pub fn operations(&self) -> usize {
        self.operations
    }
}

impl SessionSink for RecordingSink {
    fn show_panel(&mut self, client: &ClientId, title: &str) {
        self.operations += 1;
        self.panels.insert(client.clone(), title.to_string());
    }

    fn hide_panel(&mut self, client: &ClientId) {
        self.operations += 1;
        self.panels.remove(client);
    }

    fn set_visible_name(&mut self, client: &ClientId, name: &str) {
        self.operations += 1;
        self.visible_names.insert(client.clone(), name.to_string());
    }

    fn set_header(&mut self, client: &ClientId, header: &str) {
        self.operations += 1;
        self.headers.insert(client.clone(), header.to_string());
    }

    fn set_footer(&mut self, client: &ClientId, footer: &str) {
        self.operations += 1;
        self.footers.insert(client.clone(), footer.to_string());
    }

    fn create_or_update_group(&mut self, scope: &GroupScope, group: &Grouping) {
        self.operations += 1;
        self.groups
            .entry(scope.clone())
            .or_default()
            .insert(group.name.clone(), group.clone());
    }

    fn remove_group(&mut self, scope: &GroupScope, name: &str) {
        self.operations += 1;
        if let Some(groups) = self.groups.get_mut(scope) {
            groups.remove(name);
            if groups.is_empty() {
                self.groups.remove(scope);
            }
        }
    }
}

/// Who an outbound packet is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Client(ClientId),
    Broadcast,
}

/// Encoded display update queued for the transport
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub recipient: Recipient,
    pub payload: Vec<u8>,
}

/// Sink that encodes every operation as a [`DisplayUpdate`] packet
///
/// Packets go to an unbounded queue drained by whatever transport owns the
/// sessions. Tab-list state that every viewer sees is broadcast; headers,
/// footers and panels go to their owner only.
pub struct PacketSink {
    outbound: mpsc::UnboundedSender<OutboundPacket>,
}

impl PacketSink {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundPacket>) -> Self {
        Self { outbound }
    }

    fn queue(&self, recipient: Recipient, update: DisplayUpdate) {
        let payload = match encode_update(&update) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode display update {:?}: {}", update, e);
                return;
            }
        };

        if let Err(e) = self.outbound.send(OutboundPacket { recipient, payload }) {
            error!("Failed to queue display update: {}", e);
        }
    }

    fn recipient_for(scope: &GroupScope) -> Recipient {
        match scope {
            GroupScope::Shared => Recipient::Broadcast,
            GroupScope::Panel(owner) => Recipient::Client(owner.clone()),
        }
    }
}

impl SessionSink for PacketSink {
    fn show_panel(&mut self, client: &ClientId, title: &str) {
        self.queue(
            Recipient::Client(client.clone()),
            DisplayUpdate::ShowPanel {
                title: title.to_string(),
            },
        );
    }

    fn hide_panel(&mut self, client: &ClientId) {
        self.queue(Recipient::Client(client.clone()), DisplayUpdate::HidePanel);
    }

    fn set_visible_name(&mut self, client: &ClientId, name: &str) {
        self.queue(
            Recipient::Broadcast,
            DisplayUpdate::SetVisibleName {
                client: client.clone(),
                name: name.to_string(),
            },
        );
    }

    fn set_header(&mut self, client: &ClientId, header: &str) {
        self.queue(
            Recipient::Client(client.clone()),
            DisplayUpdate::SetHeader {
                text: header.to_string(),
            },
        );
    }

    fn set_footer(&mut self, client: &ClientId, footer: &str) {
        self.queue(
            Recipient::Client(client.clone()),
            DisplayUpdate::SetFooter {
                text: footer.to_string(),
            },
        );
    }

    fn create_or_update_group(&mut self, scope: &GroupScope, group: &Grouping) {
        self.queue(
            Self::recipient_for(scope),
            DisplayUpdate::UpsertGroup {
                scope: scope.clone(),
                group: group.clone(),
            },
        );
    }

    fn remove_group(&mut self, scope: &GroupScope, name: &str) {
        self.queue(
            Self::recipient_for(scope),
            DisplayUpdate::RemoveGroup {
                scope: scope.clone(),
                name: name.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use display_shared::decode_update;
    use std::collections::BTreeSet;

    fn grouping(name: &str, priority: i32) -> Grouping {
        Grouping {
            name: name.to_string(),
            priority,
            members: BTreeSet::new(),
            prefix: String::new(),
            suffix: String::new(),
        }
    }

    #[test]
    fn test_recording_sink_groups() {
        let mut sink = RecordingSink::new();
        let scope = GroupScope::Panel(ClientId::new("steve"));

        sink.create_or_update_group(&scope, &grouping("l1", 1));
        sink.create_or_update_group(&scope, &grouping("l9", 9));
        sink.create_or_update_group(&GroupScope::Shared, &grouping("steve", 0));

        assert_eq!(sink.group_count(), 3);
        let order: Vec<i32> = sink.rendered_lines(&scope).iter().map(|g| g.priority).collect();
        assert_eq!(order, vec![9, 1]);

        sink.remove_group(&scope, "l1");
        sink.remove_group(&scope, "l9");
        sink.remove_group(&scope, "missing");
        assert!(sink.groups(&scope).is_empty());
        assert_eq!(sink.group_count(), 1);
        assert_eq!(sink.operations(), 6);
    }

    #[test]
    fn test_recording_sink_session_text() {
        let mut sink = RecordingSink::new();
        let steve = ClientId::new("steve");

        sink.show_panel(&steve, "logo");
        sink.set_header(&steve, "header");
        sink.set_footer(&steve, "footer");
        sink.set_visible_name(&steve, "[Admin] Steve");

        assert_eq!(sink.panel_title(&steve), Some("logo"));
        assert_eq!(sink.header(&steve), Some("header"));
        assert_eq!(sink.footer(&steve), Some("footer"));
        assert_eq!(sink.visible_name(&steve), Some("[Admin] Steve"));

        sink.hide_panel(&steve);
        assert_eq!(sink.panel_title(&steve), None);
    }

    #[test]
    fn test_packet_sink_routing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = PacketSink::new(tx);
        let steve = ClientId::new("steve");

        sink.set_header(&steve, "hello");
        sink.create_or_update_group(&GroupScope::Shared, &grouping("steve", 0));
        sink.remove_group(&GroupScope::Panel(steve.clone()), "l7");

        let header = rx.try_recv().unwrap();
        assert_eq!(header.recipient, Recipient::Client(steve.clone()));
        assert_eq!(
            decode_update(&header.payload).unwrap(),
            DisplayUpdate::SetHeader {
                text: "hello".to_string()
            }
        );

        let upsert = rx.try_recv().unwrap();
        assert_eq!(upsert.recipient, Recipient::Broadcast);

        let remove = rx.try_recv().unwrap();
        assert_eq!(remove.recipient, Recipient::Client(steve));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_packet_sink_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let mut sink = PacketSink::new(tx);
        sink.hide_panel(&ClientId::new("steve"));
    }
}
