//! Sidebar board presentation
//!
//! Every client gets its own panel of [`DisplayLine`]s. Each line is backed by
//! a grouping in the client's panel scope, named after the line's priority,
//! which doubles as its sort score. A rebuild:
//!
//! - shows the panel (first time, or when the title changed)
//! - removes lines the current layout no longer has
//! - creates or updates one grouping per layout line
//!
//! so it always lands in `Populated`, whatever state the panel was in before.

use crate::config::{DEFAULT_SERVER_ADDRESS, LOGO};
use crate::error::DisplayError;
use crate::provider::Attributes;
use crate::registry::{GroupRegistry, GroupSpec};
use crate::roster::{RosterEntry, RosterTracker};
use crate::scheduler::{render_all, FrameRenderer, RefreshReport};
use crate::sink::SessionSink;
use display_shared::placeholder::placeholders;
use display_shared::{translate_color_codes, ClientId, ColorSpec, DisplayLine, Field, GroupScope};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Title and lines of every client's sidebar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardLayout {
    pub title: String,
    pub lines: Vec<DisplayLine>,
}

impl BoardLayout {
    /// Builds a layout, rejecting lines that share a priority or a key
    pub fn new(title: impl Into<String>, lines: Vec<DisplayLine>) -> Result<Self, DisplayError> {
        let mut priorities = HashSet::new();
        let mut keys = HashSet::new();
        for line in &lines {
            if !priorities.insert(line.priority) {
                return Err(DisplayError::InvalidLayout(format!(
                    "priority {} is used by more than one line",
                    line.priority
                )));
            }
            if !keys.insert(line.key.as_str()) {
                return Err(DisplayError::InvalidLayout(format!(
                    "line key '{}' is used more than once",
                    line.key
                )));
            }
        }

        Ok(Self {
            title: title.into(),
            lines,
        })
    }

    /// The stock ten-line sidebar, ending with `server_address`
    pub fn standard(server_address: &str) -> Self {
        let top = "&m                                 ";
        let bottom = "&m                                ";
        let stat = |key: &str, priority: i32, label: &str, value: &str| {
            DisplayLine::label(key, priority, ColorSpec::PRIMARY, format!("  &f &#ffecb8{}: ", label))
                .with_value(ColorSpec::WHITE, value)
        };

        Self {
            title: LOGO.to_string(),
            lines: vec![
                DisplayLine::label("top", 10, ColorSpec::DARK_GRAY, top),
                DisplayLine::label("date", 9, ColorSpec::PRIMARY, "&7        ⏰ %localtime_date%"),
                DisplayLine::label("player", 8, ColorSpec::PRIMARY, "&#ffd769&l%player_name%"),
                stat("rank", 7, "Rank", "%luckperms_prefix%"),
                stat("ping", 6, "Ping", "%player_ping%ms"),
                stat("tps", 5, "TPS", "%server_tps%"),
                stat(
                    "playtime",
                    4,
                    "Playtime",
                    "%playtime_days%d, %playtime_hours%h, %playtime_minutes%m",
                ),
                DisplayLine::label("blank", 3, ColorSpec::PRIMARY, " "),
                DisplayLine::label("address", 2, ColorSpec::GRAY, " ")
                    .with_value(ColorSpec::GRAY, server_address),
                DisplayLine::label("bottom", 1, ColorSpec::DARK_GRAY, bottom),
            ],
        }
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = placeholders(&self.title);
        let texts = self
            .lines
            .iter()
            .flat_map(|line| std::iter::once(&line.static_text).chain(line.dynamic_value.as_ref()));
        for text in texts {
            for field in placeholders(text) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self::standard(DEFAULT_SERVER_ADDRESS)
    }
}

/// Rendered sidebar for one client, not yet applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFrame {
    pub entry: RosterEntry,
    pub title: String,
    /// Layout lines with every placeholder expanded
    pub lines: Vec<DisplayLine>,
}

/// Computes board frames off the event loop
#[derive(Clone)]
pub struct BoardRenderer {
    attributes: Attributes,
    layout: Arc<BoardLayout>,
    fields: Arc<[Field]>,
}

impl BoardRenderer {
    pub fn new(attributes: Attributes, layout: BoardLayout) -> Self {
        let fields = layout.fields();
        Self {
            attributes,
            layout: Arc::new(layout),
            fields: fields.into(),
        }
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    async fn render_board(&self, entry: &RosterEntry) -> Result<BoardFrame, DisplayError> {
        let values = self.attributes.resolve(&entry.client, &self.fields).await?;

        let lines = self
            .layout
            .lines
            .iter()
            .map(|line| DisplayLine {
                static_text: values.expand(&line.static_text),
                dynamic_value: line.dynamic_value.as_deref().map(|value| values.expand(value)),
                ..line.clone()
            })
            .collect();

        Ok(BoardFrame {
            entry: entry.clone(),
            title: translate_color_codes(&values.expand(&self.layout.title)),
            lines,
        })
    }
}

impl FrameRenderer for BoardRenderer {
    type Frame = BoardFrame;

    fn render(&self, entry: &RosterEntry) -> impl Future<Output = Result<BoardFrame, DisplayError>> + Send {
        self.render_board(entry)
    }
}

/// Where a client's panel is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// No panel has been shown
    Absent,
    /// Panel shown, lines not all set yet
    Initialized,
    /// Every layout line is set
    Populated,
    /// Lines removed and panel hidden after a disconnect
    TornDown,
}

/// Hidden entry a line's score is attached to
fn line_entry(priority: i32) -> ClientId {
    ClientId::new(format!("#line{}", priority))
}

struct ClientPanel {
    state: PanelState,
    title: Option<String>,
    lines: GroupRegistry<i32>,
}

impl ClientPanel {
    fn new(client: &ClientId) -> Self {
        Self {
            state: PanelState::Absent,
            title: None,
            lines: GroupRegistry::new(GroupScope::Panel(client.clone())),
        }
    }

    fn tear_down(&mut self, client: &ClientId, sink: &mut dyn SessionSink) -> usize {
        let removed = self.lines.clear(sink);
        if self.title.take().is_some() {
            sink.hide_panel(client);
        }
        self.state = PanelState::TornDown;
        removed
    }
}

/// Owns every client's sidebar panel and its line groupings
pub struct BoardPresentationManager {
    renderer: BoardRenderer,
    panels: HashMap<ClientId, ClientPanel>,
}

impl BoardPresentationManager {
    pub fn new(renderer: BoardRenderer) -> Self {
        Self {
            renderer,
            panels: HashMap::new(),
        }
    }

    pub fn renderer(&self) -> &BoardRenderer {
        &self.renderer
    }

    /// Current state of the client's panel
    ///
    /// A torn-down panel reads as `TornDown` until [`prune_torn_down`] drops
    /// it, after which it reads as `Absent`.
    ///
    /// [`prune_torn_down`]: Self::prune_torn_down
    pub fn panel_state(&self, client: &ClientId) -> PanelState {
        self.panels
            .get(client)
            .map_or(PanelState::Absent, |panel| panel.state)
    }

    /// Number of line groupings registered for the client
    pub fn line_count(&self, client: &ClientId) -> usize {
        self.panels.get(client).map_or(0, |panel| panel.lines.len())
    }

    /// Groupings of the client's panel
    pub fn lines(&self, client: &ClientId) -> Option<&GroupRegistry<i32>> {
        self.panels.get(client).map(|panel| &panel.lines)
    }

    /// Number of clients with a panel that is not torn down
    pub fn panel_count(&self) -> usize {
        self.panels
            .values()
            .filter(|panel| panel.state != PanelState::TornDown)
            .count()
    }

    /// Applies a rendered frame to the client's panel
    ///
    /// Rejected with `StaleClient` if the frame's session has ended.
    pub fn apply(
        &mut self,
        frame: BoardFrame,
        roster: &RosterTracker,
        sink: &mut dyn SessionSink,
    ) -> Result<(), DisplayError> {
        let client = frame.entry.client;
        if !roster.is_current(&client, frame.entry.session) {
            return Err(DisplayError::StaleClient(client));
        }

        let panel = self
            .panels
            .entry(client.clone())
            .or_insert_with(|| ClientPanel::new(&client));

        if panel.title.as_deref() != Some(frame.title.as_str()) {
            sink.show_panel(&client, &frame.title);
            panel.title = Some(frame.title);
        }
        if matches!(panel.state, PanelState::Absent | PanelState::TornDown) {
            panel.state = PanelState::Initialized;
        }

        let wanted: HashSet<i32> = frame.lines.iter().map(|line| line.priority).collect();
        let stale = panel.lines.retain(|priority| wanted.contains(priority), sink);
        if stale > 0 {
            debug!("Removed {} stale sidebar lines of {}", stale, client);
        }

        for line in &frame.lines {
            let (prefix, suffix) = line.split();
            let spec = GroupSpec::single(line_entry(line.priority), line.priority, prefix, suffix);
            if let Err(e) = panel.lines.upsert(line.priority, spec, sink) {
                panel.state = PanelState::Initialized;
                return Err(e);
            }
        }

        panel.state = PanelState::Populated;
        Ok(())
    }

    /// Renders and applies the sidebar of one connected client
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

        let frame = self.renderer.render_board(&entry).await?;
        self.apply(frame, roster, sink)
    }

    /// Removes every line of the client's panel and hides it
    ///
    /// Returns false if there was no live panel to tear down.
    pub fn teardown_one(&mut self, client: &ClientId, sink: &mut dyn SessionSink) -> bool {
        match self.panels.get_mut(client) {
            Some(panel) if panel.state != PanelState::TornDown => {
                let removed = panel.tear_down(client, sink);
                debug!("Sidebar of {} torn down, {} lines removed", client, removed);
                true
            }
            _ => false,
        }
    }

    /// Forgets torn-down panels, returning how many were dropped
    pub fn prune_torn_down(&mut self) -> usize {
        let before = self.panels.len();
        self.panels.retain(|_, panel| panel.state != PanelState::TornDown);
        before - self.panels.len()
    }

    /// Rebuilds every client in the roster
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{AttributeProvider, LookupFuture};
    use crate::sink::RecordingSink;
    use std::time::Duration;

    struct TestProvider;

    impl AttributeProvider for TestProvider {
        fn lookup<'a>(&'a self, client: &'a ClientId, field: Field) -> LookupFuture<'a, String> {
            let value = match (client.as_str(), field) {
                ("broken", _) => Err(ProviderError::Failed("boom".to_string())),
                (_, Field::PlayerName) => Ok("Steve".to_string()),
                (_, Field::Ping) => Ok("42".to_string()),
                (_, Field::OnlineCount) => Ok("3".to_string()),
                (_, Field::PlaytimeDays) => Ok("1".to_string()),
                (_, Field::PlaytimeHours) => Ok("2".to_string()),
                (_, Field::PlaytimeMinutes) => Ok("3".to_string()),
                _ => Err(ProviderError::Unavailable),
            };
            Box::pin(async move { value })
        }
    }

    fn manager_with(layout: BoardLayout) -> BoardPresentationManager {
        let attributes = Attributes::new(Arc::new(TestProvider), Duration::from_millis(100));
        BoardPresentationManager::new(BoardRenderer::new(attributes, layout))
    }

    fn manager() -> BoardPresentationManager {
        manager_with(BoardLayout::default())
    }

    fn admit(roster: &mut RosterTracker, id: &str) -> ClientId {
        let client = ClientId::new(id);
        roster.admit(client.clone()).unwrap();
        client
    }

    #[test]
    fn test_layout_rejects_duplicate_priority() {
        let lines = vec![
            DisplayLine::label("a", 1, ColorSpec::GRAY, "a"),
            DisplayLine::label("b", 1, ColorSpec::GRAY, "b"),
        ];
        assert!(matches!(
            BoardLayout::new("title", lines),
            Err(DisplayError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_layout_rejects_duplicate_key() {
        let lines = vec![
            DisplayLine::label("a", 1, ColorSpec::GRAY, "a"),
            DisplayLine::label("a", 2, ColorSpec::GRAY, "b"),
        ];
        assert!(BoardLayout::new("title", lines).is_err());
    }

    #[test]
    fn test_standard_layout_is_valid() {
        let layout = BoardLayout::default();
        let checked = BoardLayout::new(layout.title.clone(), layout.lines.clone()).unwrap();
        assert_eq!(checked, layout);

        let priorities: Vec<i32> = layout.lines.iter().map(|l| l.priority).collect();
        assert_eq!(priorities, (1..=10).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_rebuild_one_populates_panel() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");

        assert_eq!(board.panel_state(&steve), PanelState::Absent);
        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();

        assert_eq!(board.panel_state(&steve), PanelState::Populated);
        assert_eq!(sink.panel_title(&steve), Some(LOGO));
        assert_eq!(board.line_count(&steve), 10);

        let scope = GroupScope::Panel(steve.clone());
        assert_eq!(board.lines(&steve).map(|lines| lines.scope()), Some(&scope));
        let lines = sink.rendered_lines(&scope);
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0].priority, 10);
        assert_eq!(lines[9].priority, 1);

        let ping = sink.group(&scope, "l6").unwrap();
        assert!(ping.prefix.ends_with("Ping: "));
        assert_eq!(ping.suffix, "§f42ms");

        let playtime = sink.group(&scope, "l4").unwrap();
        assert_eq!(playtime.suffix, "§f1d, 2h, 3m");

        let address = sink.group(&scope, "l2").unwrap();
        assert_eq!(address.suffix, format!("§7{}", DEFAULT_SERVER_ADDRESS));
    }

    #[tokio::test]
    async fn test_rebuild_one_is_idempotent() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");

        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();
        let ops = sink.operations();
        let scope = GroupScope::Panel(steve.clone());
        let first: Vec<_> = sink.groups(&scope).into_iter().cloned().collect();

        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();
        let second: Vec<_> = sink.groups(&scope).into_iter().cloned().collect();

        assert_eq!(sink.operations(), ops);
        assert_eq!(first, second);
        assert_eq!(board.line_count(&steve), 10);
    }

    #[tokio::test]
    async fn test_shorter_layout_removes_stale_lines() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");
        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();

        let entry = roster.entry(&steve).cloned().unwrap();
        let mut frame = board.renderer().render_board(&entry).await.unwrap();
        frame.lines.retain(|line| line.priority > 5);
        board.apply(frame, &roster, &mut sink).unwrap();

        assert_eq!(board.line_count(&steve), 5);
        let scope = GroupScope::Panel(steve.clone());
        assert_eq!(sink.groups(&scope).len(), 5);
        assert!(sink.group(&scope, "l4").is_none());
        assert_eq!(board.panel_state(&steve), PanelState::Populated);
    }

    #[tokio::test]
    async fn test_value_color_splits_at_delimiter() {
        let layout = BoardLayout::new(
            "&lStats",
            vec![DisplayLine::label("online", 1, ColorSpec::GRAY, "Online:%server_online%")
                .with_value_color(ColorSpec::WHITE)],
        )
        .unwrap();
        let mut board = manager_with(layout);
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");

        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();

        let line = sink.group(&GroupScope::Panel(steve.clone()), "l1").unwrap();
        assert_eq!(line.prefix, "§7Online:");
        assert_eq!(line.suffix, "§f3");
        assert_eq!(sink.panel_title(&steve), Some("§lStats"));
    }

    #[tokio::test]
    async fn test_apply_rejects_stale_frame() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");

        let entry = roster.entry(&steve).cloned().unwrap();
        let frame = board.renderer().render_board(&entry).await.unwrap();
        roster.evict(&steve);
        roster.admit(steve.clone()).unwrap();

        // Same id, newer session
        let result = board.apply(frame, &roster, &mut sink);
        assert_eq!(result, Err(DisplayError::StaleClient(steve.clone())));
        assert_eq!(sink.operations(), 0);
        assert_eq!(board.panel_state(&steve), PanelState::Absent);
    }

    #[tokio::test]
    async fn test_teardown_hides_panel() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");
        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();

        assert!(board.teardown_one(&steve, &mut sink));
        assert!(!board.teardown_one(&steve, &mut sink));

        assert_eq!(sink.group_count(), 0);
        assert_eq!(sink.panel_title(&steve), None);
        assert_eq!(board.panel_state(&steve), PanelState::TornDown);
        assert_eq!(board.line_count(&steve), 0);
        assert_eq!(board.panel_count(), 0);

        assert_eq!(board.prune_torn_down(), 1);
        assert_eq!(board.panel_state(&steve), PanelState::Absent);
        assert_eq!(board.prune_torn_down(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_after_teardown_repopulates() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let steve = admit(&mut roster, "steve");
        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();
        board.teardown_one(&steve, &mut sink);

        board.rebuild_one(&steve, &roster, &mut sink).await.unwrap();

        assert_eq!(board.panel_state(&steve), PanelState::Populated);
        assert_eq!(sink.panel_title(&steve), Some(LOGO));
        assert_eq!(board.line_count(&steve), 10);
        assert_eq!(board.prune_torn_down(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_all_isolates_failures() {
        let mut board = manager();
        let mut roster = RosterTracker::new();
        let mut sink = RecordingSink::new();
        let a = admit(&mut roster, "alex");
        let b = admit(&mut roster, "broken");
        let c = admit(&mut roster, "steve");

        let report = board.rebuild_all(&roster, &mut sink).await;

        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(board.panel_state(&a), PanelState::Populated);
        assert_eq!(board.panel_state(&b), PanelState::Absent);
        assert_eq!(board.panel_state(&c), PanelState::Populated);
        assert_eq!(sink.group_count(), 20);
    }
}
