//! HTTP status and operator surface: state snapshots, a live event feed and
//! the same commands the keyboard offers.

mod handlers;
mod server;
#[cfg(test)]
mod tests;

pub use server::{router, ServerState, StatusServer, StatusServerBuilder};
