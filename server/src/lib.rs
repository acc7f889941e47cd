//! # Display Server Library
//!
//! This library keeps the tab list and sidebar of every connected client in
//! sync with live server data. Rank prefixes, ping, tick rate and play time
//! change continuously and come from an external attribute provider; the
//! engine re-derives every client's display from them once per refresh.
//!
//! ## Core Responsibilities
//!
//! ### Roster Tracking
//! Knows which clients are connected, under which session. The roster is the
//! source of truth for which groupings must exist.
//!
//! ### Grouping Management
//! Labels are attached through named groupings rather than by rewriting every
//! viewer's state. Grouping names are bounded to 16 units and derived from a
//! client id or line priority, never from display text, so two clients named
//! "Steve" never collide.
//!
//! ### Periodic Refresh
//! Every client is rebuilt from scratch once per interval. There is no
//! diffing: each refresh is a fresh projection of roster and provider state,
//! and unchanged groupings cost no sink calls.
//!
//! ## Architecture Design
//!
//! ### Single Writer Event Loop
//! All sink and registry writes happen on the engine's event loop, one event
//! at a time. Lifecycle events, reloads and rendered batches are queued to it
//! over unbounded channels.
//!
//! ### Off-Loop Rendering
//! Attribute lookups can be slow, so rendering runs on scheduler tasks, one
//! task per client. A lookup that fails or times out only degrades that
//! field, or at worst that client.
//!
//! ### Teardown Wins
//! A frame is applied only if its session is still current when it reaches the
//! event loop. A render that finishes after its client disconnected is
//! dropped, so it can never resurrect a grouping.
//!
//! ## Module Organization
//!
//! ### Roster Module (`roster`)
//! Connected clients, session numbers and point-in-time snapshots.
//!
//! ### Registry Module (`registry`)
//! Bounded, collision-free grouping names and idempotent upsert/remove.
//!
//! ### Presentation Modules (`tab`, `board`)
//! Renderers that turn provider data into frames, and managers that apply
//! frames to a session sink:
//! - `tab`: header, footer and the rank-prefixed visible name
//! - `board`: the per-client sidebar, one grouping per line
//!
//! ### Scheduler Module (`scheduler`)
//! Periodic and connect-triggered rendering, and per-refresh reports.
//!
//! ### Engine Module (`engine`)
//! The event loop tying everything together, and the handle used to feed it.
//!
//! ### Collaborator Modules (`provider`, `sink`, `simulation`)
//! The attribute provider and rank source seams, the session sink seam with
//! recording and packet implementations, and a simulated provider for demos.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use display_server::config::EngineConfig;
//! use display_server::engine::DisplayEngine;
//! use display_server::simulation::SimulatedServer;
//! use display_server::sink::RecordingSink;
//! use display_shared::ClientId;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Arc::new(SimulatedServer::new(20, Duration::from_millis(20)));
//!     let mut engine = DisplayEngine::new(
//!         EngineConfig::default(),
//!         server.clone(),
//!         Some(server.clone()),
//!         RecordingSink::new(),
//!     );
//!
//!     let handle = engine.handle();
//!     let steve = ClientId::new("steve");
//!     server.register(steve.clone(), "Steve", display_server::simulation::Rank::Admin);
//!     handle.connect(steve);
//!
//!     // Runs until handle.shutdown() is called
//!     engine.run().await;
//! }
//! ```

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod registry;
pub mod roster;
pub mod scheduler;
pub mod simulation;
pub mod sink;
pub mod tab;

pub use engine::{DisplayEngine, EngineHandle};
pub use error::{DisplayError, ProviderError};
