//! Types shared between the display engine and whatever transport carries its
//! output to connected sessions.
//!
//! The engine only ever talks about clients through [`ClientId`], renders
//! labels through [`Grouping`]s and sidebar rows through [`DisplayLine`]s.
//! [`DisplayUpdate`] is the serializable form of a single session-sink
//! operation, for transports that want bytes rather than method calls.

pub mod color;
pub mod placeholder;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use color::{translate_color_codes, ColorSpec};
pub use placeholder::{Field, FieldValues};

/// Maximum length of a grouping name, in UTF-16 code units.
pub const MAX_GROUP_NAME_LEN: usize = 16;

/// Separates a board line's static label from its value when the line has no
/// dynamic value of its own.
pub const LINE_DELIMITER: char = ':';

/// Opaque identifier of a connected session.
///
/// Unique while connected. The same id may come back after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Namespace a grouping lives in.
///
/// Tab-list groupings are visible to every viewer; sidebar groupings only
/// exist on the panel of the client that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupScope {
    Shared,
    Panel(ClientId),
}

/// Named display binding carrying a prefix/suffix and a sort priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub name: String,
    pub priority: i32,
    pub members: BTreeSet<ClientId>,
    pub prefix: String,
    pub suffix: String,
}

/// One row of a client's sidebar panel.
///
/// `priority` is both the sort score and the seed of the row's grouping name,
/// so two rows of one panel must never share a priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayLine {
    pub key: String,
    pub priority: i32,
    pub prefix_color: ColorSpec,
    pub static_text: String,
    pub value_color: Option<ColorSpec>,
    pub dynamic_value: Option<String>,
}

impl DisplayLine {
    /// Creates a line with only a static label.
    pub fn label(key: impl Into<String>, priority: i32, color: ColorSpec, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            priority,
            prefix_color: color,
            static_text: text.into(),
            value_color: None,
            dynamic_value: None,
        }
    }

    /// Adds a colored dynamic value rendered after the label.
    pub fn with_value(mut self, color: ColorSpec, value: impl Into<String>) -> Self {
        self.value_color = Some(color);
        self.dynamic_value = Some(value.into());
        self
    }

    /// Colors everything after [`LINE_DELIMITER`] in the label with `color`.
    pub fn with_value_color(mut self, color: ColorSpec) -> Self {
        self.value_color = Some(color);
        self
    }

    /// Splits the line into the prefix and suffix of its grouping.
    ///
    /// A line with a dynamic value puts the label in the prefix and the value
    /// in the suffix. A line with only a value color is split at the first
    /// [`LINE_DELIMITER`] of its label. Everything else is prefix only.
    pub fn split(&self) -> (String, String) {
        let head = format!("{}{}", self.prefix_color, self.static_text);

        match (&self.value_color, &self.dynamic_value) {
            (Some(color), Some(value)) => (
                translate_color_codes(&head),
                translate_color_codes(&format!("{}{}", color, value)),
            ),
            (Some(color), None) => match self.static_text.split_once(LINE_DELIMITER) {
                Some((label, rest)) => (
                    translate_color_codes(&format!(
                        "{}{}{}",
                        self.prefix_color, label, LINE_DELIMITER
                    )),
                    translate_color_codes(&format!("{}{}", color, rest)),
                ),
                None => (translate_color_codes(&head), String::new()),
            },
            _ => (translate_color_codes(&head), String::new()),
        }
    }
}

/// Number of UTF-16 code units in `text`.
pub fn code_units(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Longest prefix of `text` that fits in `max` UTF-16 code units.
///
/// Never splits a character, so a surrogate pair that would straddle the
/// limit is dropped entirely.
pub fn truncate_units(text: &str, max: usize) -> &str {
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        used += ch.len_utf16();
        if used > max {
            return &text[..idx];
        }
    }
    text
}

/// Serializable form of one session-sink operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayUpdate {
    ShowPanel {
        title: String,
    },
    HidePanel,
    SetVisibleName {
        client: ClientId,
        name: String,
    },
    SetHeader {
        text: String,
    },
    SetFooter {
        text: String,
    },
    UpsertGroup {
        scope: GroupScope,
        group: Grouping,
    },
    RemoveGroup {
        scope: GroupScope,
        name: String,
    },
}

pub fn encode_update(update: &DisplayUpdate) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(update)
}

pub fn decode_update(bytes: &[u8]) -> Result<DisplayUpdate, bincode::Error> {
    bincode::deserialize(bytes)
}
