//! Simulated attribute provider and player churn for the demo server
//!
//! Stands in for the permission plugin and server statistics a real
//! deployment would query. Values jitter between lookups so the periodic
//! refresh has something to show.

use crate::engine::EngineHandle;
use crate::error::ProviderError;
use crate::provider::{AttributeProvider, LookupFuture, RankSource};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use display_shared::color::format_tick_rate;
use display_shared::{ClientId, Field};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Rank of a simulated player, with its prefix and permission group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Default,
    Member,
    Admin,
}

impl Rank {
    pub fn prefix(self) -> &'static str {
        match self {
            Rank::Default => "",
            Rank::Member => "&a[Member]",
            Rank::Admin => "&c[Admin]",
        }
    }

    pub fn group(self) -> &'static str {
        match self {
            Rank::Default => "default",
            Rank::Member => "member",
            Rank::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedPlayer {
    name: String,
    rank: Rank,
    base_ping: u32,
    first_join: DateTime<Local>,
    joined_at: Instant,
    /// Play time from earlier sessions
    earlier_playtime: Duration,
}

impl SimulatedPlayer {
    fn playtime(&self) -> Duration {
        self.earlier_playtime + self.joined_at.elapsed()
    }
}

/// In-memory player table answering attribute and rank lookups
pub struct SimulatedServer {
    players: RwLock<HashMap<ClientId, SimulatedPlayer>>,
    started: Instant,
    max_players: usize,
    /// Upper bound of the artificial delay added to every lookup
    latency: Duration,
}

impl SimulatedServer {
    pub fn new(max_players: usize, latency: Duration) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            started: Instant::now(),
            max_players,
            latency,
        }
    }

    /// Adds a player with a random ping and play history
    pub fn register(&self, client: ClientId, name: &str, rank: Rank) {
        let mut rng = rand::thread_rng();
        let days_ago = rng.gen_range(0..400);
        let player = SimulatedPlayer {
            name: name.to_string(),
            rank,
            base_ping: rng.gen_range(8..120),
            first_join: Local::now() - ChronoDuration::days(days_ago),
            joined_at: Instant::now(),
            earlier_playtime: Duration::from_secs(rng.gen_range(0..days_ago as u64 * 3600 + 60)),
        };

        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client, player);
    }

    pub fn unregister(&self, client: &ClientId) -> bool {
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client)
            .is_some()
    }

    pub fn online(&self) -> usize {
        self.players.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn value(&self, client: &ClientId, field: Field) -> Result<String, ProviderError> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let player = players.get(client).ok_or(ProviderError::UnknownClient)?;
        let mut rng = rand::thread_rng();

        let value = match field {
            Field::RankPrefix => player.rank.prefix().to_string(),
            Field::PlayerName => player.name.clone(),
            Field::Ping => (player.base_ping + rng.gen_range(0..15)).to_string(),
            Field::TickRate => format_tick_rate(rng.gen_range(17.5..20.5)),
            Field::OnlineCount => players.len().to_string(),
            Field::MaxPlayers => self.max_players.to_string(),
            Field::Uptime => format_uptime(self.started.elapsed()),
            Field::LocalDate => Local::now().format("%b %-d, %Y").to_string(),
            Field::PlaytimeDays => (player.playtime().as_secs() / 86_400).to_string(),
            Field::PlaytimeHours => (player.playtime().as_secs() / 3600 % 24).to_string(),
            Field::PlaytimeMinutes => (player.playtime().as_secs() / 60 % 60).to_string(),
            Field::JoinDate => player.first_join.format("%b %-d, %Y").to_string(),
        };
        Ok(value)
    }

    fn delay(&self) -> Duration {
        if self.latency.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..=self.latency)
    }
}

impl AttributeProvider for SimulatedServer {
    fn lookup<'a>(&'a self, client: &'a ClientId, field: Field) -> LookupFuture<'a, String> {
        let delay = self.delay();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.value(client, field)
        })
    }
}

impl RankSource for SimulatedServer {
    fn primary_group<'a>(&'a self, client: &'a ClientId) -> LookupFuture<'a, String> {
        let group = self
            .players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client)
            .map(|player| player.rank.group().to_string())
            .ok_or(ProviderError::UnknownClient);
        Box::pin(async move { group })
    }
}

/// `1h 2m 3s`, dropping leading zero units
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

const BOT_NAMES: [&str; 6] = ["Steve", "Alex", "Notch", "Jeb", "Dinnerbone", "Steve"];

/// Account-style id, long enough to need truncation as a grouping name
fn bot_id(rng: &mut impl Rng) -> ClientId {
    ClientId::new(format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u64>() & 0xffff_ffff_ffff
    ))
}

/// Connects and disconnects simulated players through the engine handle
pub struct BotChurn {
    server: Arc<SimulatedServer>,
    engine: EngineHandle,
    bots: Vec<ClientId>,
}

impl BotChurn {
    pub fn new(server: Arc<SimulatedServer>, engine: EngineHandle) -> Self {
        Self {
            server,
            engine,
            bots: Vec::new(),
        }
    }

    pub fn bots(&self) -> &[ClientId] {
        &self.bots
    }

    /// Registers a new bot and connects it
    pub fn join(&mut self) -> ClientId {
        let (client, name, rank) = {
            let mut rng = rand::thread_rng();
            let name = BOT_NAMES.choose(&mut rng).copied().unwrap_or("Steve");
            let rank = match rng.gen_range(0..10) {
                0 => Rank::Admin,
                1..=4 => Rank::Member,
                _ => Rank::Default,
            };
            (bot_id(&mut rng), name, rank)
        };

        self.server.register(client.clone(), name, rank);
        self.engine.connect(client.clone());
        debug!("Bot {} joined as {} ({:?})", client, name, rank);

        self.bots.push(client.clone());
        client
    }

    /// Disconnects a random bot, if there is one
    pub fn leave(&mut self) -> Option<ClientId> {
        if self.bots.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..self.bots.len());
        let client = self.bots.swap_remove(index);

        self.engine.disconnect(client.clone());
        self.server.unregister(&client);
        debug!("Bot {} left", client);
        Some(client)
    }

    /// Replaces one bot every `period` until the engine goes away
    pub async fn run(mut self, initial: usize, period: Duration) {
        for _ in 0..initial {
            self.join();
        }
        info!("{} bots online", self.bots.len());

        if period.is_zero() {
            return;
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.leave();
            self.join();
        }
    }
}
