//! Client-facing HTTP listener.
//!
//! Accepts client connections and hands every request to the dispatcher.

mod listener;

pub use listener::{FrontendListener, handle_request};
