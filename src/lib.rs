//! wavecall — wave-dispatch volunteer matching engine.
//!
//! Matches people who need help with volunteers over a chat-bot platform:
//! requests fan out to bounded waves of eligible volunteers, at most one
//! volunteer wins each request, matched pairs meet in a pooled group chat
//! room, and verification/complaint workflows gate who may volunteer.
//!
//! The [`dispatch::Switchboard`] is the engine facade; [`router::Router`]
//! turns platform updates into engine calls; `main` wires both to the
//! production [`platform::BotApiClient`] and the background tasks.

pub mod config;
pub mod db;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod metrics;
pub mod moderation;
pub mod platform;
pub mod rooms;
pub mod router;

pub use config::Config;
pub use db::Database;
pub use dispatch::Switchboard;
pub use error::{AcceptOutcome, EngineError, EngineResult, IneligibleReason};
pub use router::Router;
