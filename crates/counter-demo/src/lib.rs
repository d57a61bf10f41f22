//! Counter Demo - a small page driven through the fault-relay pipeline
//!
//! The page keeps a `{count, darkMode}` state and exposes increment,
//! decrement, reset and theme-toggle handlers. The binary wires it up with
//! monitoring, toasts and an error boundary and replays a short click script.

pub mod messages;
pub mod page;

pub use page::{CounterPage, CounterState};
