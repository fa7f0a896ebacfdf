//! Session contract for the remote messaging gateway.
//!
//! The gateway transport itself lives outside this workspace; the daemon
//! only ever sees the interfaces defined here. A session emits a closed set
//! of [`SessionEvent`]s and accepts sends, presence updates, and the contact
//! discovery calls the reconciler's strategies are built on.
//!
//! # Architecture
//!
//! - [`session`]: the [`Gateway`]/[`SessionHandle`] traits and event types
//! - [`close_reason`]: status-code classification and the retry-delay table
//! - [`loopback`]: in-process backend for the test suite and local runs

pub mod close_reason;
pub mod loopback;
pub mod session;

pub use close_reason::CloseReason;
pub use session::{
    AuthMode, Gateway, InboundMessage, PresenceState, SessionError, SessionEvent, SessionHandle,
};
