pub mod config;
pub mod controller;
pub mod directory;
pub mod store;

pub use config::Config;
pub use controller::Controller;
pub use directory::Directory;
pub use store::FileMessageStore;
