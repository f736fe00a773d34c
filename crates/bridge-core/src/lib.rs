//! # bridge-core
//!
//! Transport-agnostic core of the session bridge: IDE plugins and CLI tools
//! open a long-lived session, run commands and subscribe to event streams,
//! whichever wire protocol they arrive over.
//!
//! - **Sessions**: [`SessionManager`] owns every session record and its
//!   lifecycle (`Active → Closing → Closed`), with per-session locking and an
//!   admission limit
//! - **Commands**: [`CommandRegistry`] maps names to [`CommandHandler`]s;
//!   [`Bridge::execute`] runs them with a timeout, cancellation grace period
//!   and panic isolation
//! - **Events**: [`EventBroadcaster`] fans events out to subscriptions, each
//!   with a bounded drop-oldest queue
//! - **Adapters**: [`TransportAdapter`] is the contract the socket and RPC
//!   front-ends implement
//!
//! No networking lives here; see `bridge-server`.

#![deny(unsafe_code)]

pub mod adapter;
pub mod backend;
pub mod bridge;
pub mod broadcast;
pub mod builtin;
pub mod command;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod session;

pub use adapter::{EventStream, TransportAdapter};
pub use backend::{BackendError, NoopBackend, SessionBackend};
pub use bridge::{Bridge, BridgeConfig, ExecutionPolicy};
pub use broadcast::{
    EventBroadcaster, EventQueue, PushOutcome, ReleaseHook, Subscription, SubscriptionGuard,
};
pub use command::{
    CommandContext, CommandFailure, CommandRequest, CommandResult, CommandStatus, Parameters,
    required_param,
};
pub use errors::{BridgeError, HandlerError};
pub use event::Event;
pub use ids::{SessionId, SubscriptionId};
pub use registry::{CommandHandler, CommandRegistry, FnHandler, handler_fn};
pub use session::{ClientKind, Liveness, Session, SessionManager, TransportKind};
