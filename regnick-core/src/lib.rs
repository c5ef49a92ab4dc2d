//! regnick-core: keep an IRC bot identified with network services.
//!
//! The crate is a synchronous state machine with no I/O of its own:
//!
//! - `tracker` — follow connection state from raw lines, emit [`Inbound`] events
//! - `agent` — identify / recover / re-identify, driven by those events
//! - `classify` — keyword rules for the authority's free-text notices
//! - `privileges` — ask for op/halfop/voice once identified
//! - `gate` — hold channel joins until identified
//! - `commands` — operator-requested actions (identify, recover, unban, ...)
//!
//! Hosts feed events in arrival order, one [`Agent`] per network, and send
//! the [`Outbound`] actions they get back.

pub mod action;
pub mod agent;
pub mod classify;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
pub mod host;
pub mod irc;
pub mod privileges;
pub mod session;
pub mod tracker;

pub use action::{Action, Delivery, Outbound};
pub use agent::Agent;
pub use config::{ChannelPolicy, ServicesConfig};
pub use error::AgentError;
pub use event::{CannotJoinReason, Inbound};
pub use host::HostView;
pub use privileges::Grant;
pub use session::AuthState;
pub use tracker::ConnectionState;
