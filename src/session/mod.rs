//! Transport-session bookkeeping and disconnect-driven forfeiture.
//!
//! The registry tracks three mappings with lifetimes tied to the live
//! connection/match: `session -> user`, `session -> match`, and
//! `user -> match`. All three are explicitly deleted at match end or
//! disconnect; nothing here expires implicitly.

pub mod disconnect;
pub mod registry;

pub use disconnect::DisconnectCoordinator;
pub use registry::{InMemorySessionRegistry, SessionRegistry};
