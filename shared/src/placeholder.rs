//! `%field%` placeholders in display templates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An attribute the engine can ask the attribute provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    RankPrefix,
    PlayerName,
    Ping,
    TickRate,
    OnlineCount,
    MaxPlayers,
    Uptime,
    LocalDate,
    PlaytimeDays,
    PlaytimeHours,
    PlaytimeMinutes,
    JoinDate,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::RankPrefix,
        Field::PlayerName,
        Field::Ping,
        Field::TickRate,
        Field::OnlineCount,
        Field::MaxPlayers,
        Field::Uptime,
        Field::LocalDate,
        Field::PlaytimeDays,
        Field::PlaytimeHours,
        Field::PlaytimeMinutes,
        Field::JoinDate,
    ];

    /// Name used between the `%` signs of a template.
    pub fn key(self) -> &'static str {
        match self {
            Field::RankPrefix => "luckperms_prefix",
            Field::PlayerName => "player_name",
            Field::Ping => "player_ping",
            Field::TickRate => "server_tps",
            Field::OnlineCount => "server_online",
            Field::MaxPlayers => "server_max_players",
            Field::Uptime => "server_uptime",
            Field::LocalDate => "localtime_date",
            Field::PlaytimeDays => "playtime_days",
            Field::PlaytimeHours => "playtime_hours",
            Field::PlaytimeMinutes => "playtime_minutes",
            Field::JoinDate => "player_first_join",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.key() == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Distinct known fields referenced by `template`, in order of first use.
pub fn placeholders(template: &str) -> Vec<Field> {
    let mut found = Vec::new();
    for_each_segment(template, |segment| {
        if let Segment::Field(field) = segment {
            if !found.contains(&field) {
                found.push(field);
            }
        }
    });
    found
}

enum Segment<'a> {
    Text(&'a str),
    Field(Field),
}

/// Splits `template` into literal text and known `%field%` tokens.
///
/// Unknown tokens stay literal, percent signs included.
fn for_each_segment<'a>(template: &'a str, mut visit: impl FnMut(Segment<'a>)) {
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            break;
        };

        match Field::from_key(&after[..end]) {
            Some(field) => {
                visit(Segment::Text(&rest[..start]));
                visit(Segment::Field(field));
                rest = &after[end + 1..];
            }
            None => {
                // The closing '%' may open the next real token.
                visit(Segment::Text(&rest[..start + 1]));
                rest = after;
            }
        }
    }

    visit(Segment::Text(rest));
}

/// Resolved field values for one client, valid for a single render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    values: HashMap<Field, String>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    /// Value of `field`, or an empty string when it was never resolved.
    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every known `%field%` token in `template`.
    ///
    /// Unknown tokens are left untouched.
    pub fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        for_each_segment(template, |segment| match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Field(field) => out.push_str(self.get(field)),
        });
        out
    }
}
