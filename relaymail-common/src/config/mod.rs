//! Configuration types shared by the server and delivery crates.

pub mod timeouts;

pub use timeouts::{ClientTimeouts, ServerTimeouts};
