pub mod address;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod mime;
pub mod status;
pub mod traits;

pub use tracing;

/// Identifier of the local account owning a mailbox.
pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
