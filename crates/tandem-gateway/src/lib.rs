//! WebSocket gateway: pushes live snapshots of a user's requests,
//! connections, conversations and watched message lists.

pub mod connection;
pub mod session;
