//! Gateway connection lifecycle.
//!
//! Provides:
//! - Wire protocol payloads (hello, identify, resume, heartbeat)
//! - Gateway URL discovery
//! - `Connection` - one socket's handshake, heartbeat and frame reader
//! - `SessionManager` - reconnect loop carrying the resume token
//! - WebSocket connector (feature: websocket)
//! - In-memory connector for tests and simulation (feature: memory)

pub mod config;
pub mod connection;
pub mod discovery;
pub mod protocol;
pub mod session;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "memory")]
pub mod memory;

pub use config::{GatewayConfig, Intents, Shard};
pub use connection::{CloseReason, Closed, Connection, ConnectionError, ConnectionState};
pub use discovery::{DiscoveryError, discover_gateway};
pub use session::{GatewayStatus, SessionManager};
