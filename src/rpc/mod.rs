//! RPC module - the HTTP façade over a running node

mod server;

pub use server::*;
