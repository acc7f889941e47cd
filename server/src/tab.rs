//! Tab-list presentation: header, footer and the rank-prefixed name every
//! other client sees.

use crate::config::LOGO;
use crate::error::DisplayError;
use crate::provider::Attributes;
use crate::registry::{GroupRegistry, GroupSpec};
use crate::roster::{RosterEntry, RosterTracker};
use crate::scheduler::{render_all, FrameRenderer, RefreshReport};
use crate::sink::SessionSink;
use display_shared::placeholder::placeholders;
use display_shared::{translate_color_codes, ClientId, ColorSpec, Field, FieldValues, GroupScope};
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Templates for everything the tab list shows.
///
/// All text accepts `%field%` placeholders and `&` color codes.
#[derive(Debug, Clone)]
pub struct TabTemplate {
    pub header: String,
    pub footer: String,
    pub visible_name: String,
    /// Sort priority of every client's tab grouping
    pub group_priority: i32,
    /// Group whose members get `default_group_color` names
    pub default_group: String,
    pub default_group_color: ColorSpec,
    /// Name color for everyone else, and when no rank source answers
    pub name_color: ColorSpec,
}

impl Default for TabTemplate {
    fn default() -> Self {
        Self {
            header: format!("\n\n\n\n\n\n\n{}", LOGO),
            footer: "\n &f &#ffecb8Players: &f%server_online%&8/&f%server_max_players% &8&l/ \
                     &f &#ffecb8Ping: &f%player_ping%ms &8&l/ \
                     &f &#ffecb8TPS: %server_tps% \n"
                .to_string(),
            visible_name: "%luckperms_prefix% %player_name%".to_string(),
            group_priority: 0,
            default_group: "default".to_string(),
            default_group_color: ColorSpec::GRAY,
            name_color: ColorSpec::WHITE,
        }
    }
}

/// Text a client's own tab list shows, plus the name others see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabText {
    pub header: String,
    pub footer: String,
    pub visible_name: String,
}

/// Rendered tab state for one client, not yet applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabFrame {
    pub entry: RosterEntry,
    pub text: TabText,
    /// Rank prefix carried by the client's grouping
    pub group_prefix: String,
}

/// Computes tab frames off the event loop
#[derive(Clone)]
pub struct TabRenderer {
    attributes: Attributes,
    template: Arc<TabTemplate>,
    fields: Arc<[Field]>,
}

impl TabRenderer {
    pub fn new(attributes: Attributes, template: TabTemplate) -> Self {
        let mut fields = vec![Field::RankPrefix, Field::PlayerName];
        for text in [&template.header, &template.footer, &template.visible_name] {
            for field in placeholders(text) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }

        Self {
            attributes,
            template: Arc::new(template),
            fields: fields.into(),
        }
    }

    async fn render_tab(&self, entry: &RosterEntry) -> Result<TabFrame, DisplayError> {
        let client = &entry.client;
        let values = self.attributes.resolve(client, &self.fields).await?;
        let group = self.attributes.primary_group(client).await;

        let rank_prefix = values.get(Field::RankPrefix);
        let group_prefix = if rank_prefix.is_empty() {
            String::new()
        } else {
            translate_color_codes(&format!("{} ", rank_prefix))
        };

        Ok(TabFrame {
            entry: entry.clone(),
            text: TabText {
                header: translate_color_codes(&values.expand(&self.template.header)),
                footer: translate_color_codes(&values.expand(&self.template.footer)),
                visible_name: self.visible_name(client, &values, group.as_deref()),
            },
            group_prefix,
        })
    }

    /// Visible name with the name colored by primary group
    ///
    /// Falls back to the full client id while the provider has no name yet.
    fn visible_name(&self, client: &ClientId, values: &FieldValues, group: Option<&str>) -> String {
        let color = match group {
            Some(group) if group.eq_ignore_ascii_case(&self.template.default_group) => {
                self.template.default_group_color
            }
            _ => self.template.name_color,
        };

        let name = match values.get(Field::PlayerName) {
            "" => client.as_str(),
            name => name,
        };

        let mut values = values.clone();
        values.insert(Field::PlayerName, format!("{}{}", color, name));
        translate_color_codes(values.expand(&self.template.visible_name).trim_start())
    }
}

impl FrameRenderer for TabRenderer {
    type Frame = TabFrame;

    fn render(&self, entry: &RosterEntry) -> impl Future<Output = Result<TabFrame, DisplayError>> + Send {
        self.render_tab(entry)
    }
}

/// Owns the shared-scope tab groupings, one per connected client
pub struct TabPresentationManager {
    renderer: TabRenderer,
    registry: GroupRegistry<ClientId>,
    /// Last text sent to each client, to skip identical rewrites
    applied: HashMap<ClientId, TabText>,
}

impl TabPresentationManager {
    pub fn new(renderer: TabRenderer) -> Self {
        Self {
            renderer,
            registry: GroupRegistry::new(GroupScope::Shared),
            applied: HashMap::new(),
        }
    }

    pub fn renderer(&self) -> &TabRenderer {
        &self.renderer
    }

    pub fn registry(&self) -> &GroupRegistry<ClientId> {
        &self.registry
    }

    /// Applies a rendered frame to the client's session and grouping
    ///
    /// Roster membership is checked first: a frame for a session that has
    /// ended is rejected with `StaleClient` and nothing is written.
    pub fn apply(
        &mut self,
        frame: TabFrame,
        roster: &RosterTracker,
        sink: &mut dyn SessionSink,
    ) -> Result<(), DisplayError> {
        let client = frame.entry.client.clone();
        if !roster.is_current(&client, frame.entry.session) {
            return Err(DisplayError::StaleClient(client));
        }

        if self.applied.get(&client) != Some(&frame.text) {
            sink.set_header(&client, &frame.text.header);
            sink.set_footer(&client, &frame.text.footer);
            sink.set_visible_name(&client, &frame.text.visible_name);
            self.applied.insert(client.clone(), frame.text);
        }

        let spec = GroupSpec::single(
            client.clone(),
            self.renderer.template.group_priority,
            frame.group_prefix,
            "",
        );
        self.registry.upsert(client, spec, sink)?;
        Ok(())
    }

    /// Renders and applies the tab display of one connected client
    pub async fn rebuild_one(
        &mut self,
        client: &ClientId,
        roster: &RosterTracker,
        sink: &mut dyn SessionSink,
    ) -> Result<(), DisplayError> {
        let entry = roster
            .entry(client)
            .cloned()
            .ok_or_else(|| DisplayError::StaleClient(client.clone()))?;

        let frame = self.renderer.render_tab(&entry).await?;
        self.apply(frame, roster, sink)
    }

    /// Removes the client's grouping and forgets what was sent to it
    pub fn teardown_one(&mut self, client: &ClientId, sink: &mut dyn SessionSink) -> bool {
        self.applied.remove(client);
        let removed = self.registry.remove(client, sink);
        if removed {
            debug!("Tab grouping of {} torn down", client);
        }
        removed
    }

    /// Rebuilds every client in the roster
    ///
    /// A failure for one client is logged and counted; the others are still
    /// rebuilt.
    pub async fn rebuild_all(
        &mut self,
        roster: &RosterTracker,
        sink: &mut dyn SessionSink,
    ) -> RefreshReport {
        let snapshot = roster.snapshot();
        let outcomes = render_all(&self.renderer, &snapshot).await;

        let mut report = RefreshReport::default();
        for outcome in outcomes {
            let result = outcome
                .result
                .and_then(|frame| self.apply(frame, roster, sink));
            report.record(&outcome.entry.client, result);
        }
        report
    }
}
