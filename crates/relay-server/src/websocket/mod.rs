//! WebSocket relay core: connection handles, the registry that fans frames
//! out to them, and the per-client session loop.

pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod registry;
pub mod session;
