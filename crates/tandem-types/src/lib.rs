//! Shared types for Tandem: domain records, change events, and the
//! request/response shapes used by the HTTP and gateway layers.

pub mod api;
pub mod events;
pub mod models;
