pub mod admission;
pub mod auth;
pub mod client;
pub mod command;
pub mod connection;
pub mod error;
pub mod listener;
pub mod session;

pub use admission::{AdmissionController, AdmissionPolicy};
pub use listener::{Listener, ListenerConfig};
pub use session::{Collaborators, Session, SessionConfig, TlsContext};
