//! Newline-delimited JSON sidecar transport. One request per line on stdin, one
//! response per line on stdout.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
