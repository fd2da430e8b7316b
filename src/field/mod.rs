//! Field node: subscribes to detection summaries, reacts to categories, and
//! keeps its own link and broker session alive.
//!
//! - `link`: local network link drivers
//! - `connectivity`: link + session state machine and recovery
//! - `router`: keyword dispatch for inbound messages
//! - `heartbeat`: periodic status messages
//! - `node`: the cooperative main loop tying them together

pub mod connectivity;
pub mod heartbeat;
pub mod link;
pub mod node;
pub mod router;

pub use connectivity::{
    generate_client_id, ConnectionState, ConnectivityManager, LinkSettings, SessionSettings,
    DEFAULT_LINK_ATTEMPTS, DEFAULT_LINK_POLL, DEFAULT_RECONNECT_BACKOFF,
};
pub use heartbeat::{HeartbeatScheduler, DEFAULT_HEARTBEAT_INTERVAL};
pub use link::{ConfiguredLink, HostManagedLink, LinkDriver, SysfsLink};
pub use node::{FieldNode, TickReport, DEFAULT_LOOP_POLL};
pub use router::{MessageRouter, RouteOutcome, DEFAULT_KEYWORDS};
