//! Websocket client for the Home Assistant API
//!
//! The client owns one websocket and multiplexes everything over it:
//!
//! ```text
//!            ┌──────────────┐   Command + id    ┌───────────┐
//! caller ───▶│  HassClient  │──── writer task ─▶│           │
//!            │              │                   │    hub    │
//!            │ PendingCmds  │◀── reader task ───│           │
//!            │ Subscriptions│   result / event  └───────────┘
//!            └──────────────┘
//! ```
//!
//! - [`codec`] turns commands into frames and frames into [`IncomingMessage`]s
//! - [`PendingCommands`] correlates `result` frames with outstanding commands by id
//! - [`SubscriptionRegistry`] keeps one hub subscription per event type and a
//!   broadcast stream per event type for local listeners
//! - [`Toolkit`] is the helper surface handed to automations
//!
//! There is no reconnect loop: a dropped connection fails every pending
//! command and ends every stream, and the caller decides what to do next.

pub mod codec;
mod client;
mod config;
mod correlation;
mod diff;
mod error;
mod subscriptions;
mod toolkit;

pub use client::{HassClient, ListenerHandle};
pub use codec::{Command, ErrorInfo, EventFrame, IncomingMessage, ResultFrame};
pub use config::ConnectOptions;
pub use correlation::PendingCommands;
pub use diff::{diff, DiffEntry, DiffKind};
pub use error::{ClientError, ClientResult};
pub use subscriptions::{Subscription, SubscriptionRegistry, TypedSubscription};
pub use toolkit::Toolkit;
