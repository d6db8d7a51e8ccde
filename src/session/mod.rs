//! Session orchestration
//!
//! - `orchestrator`: per-connection event handling
//! - `model`: session state, submissions and hint history
//! - `registry`: the connection to session map shared by all connections
//! - `summary`: final scoring and the completion record
//! - `events`: wire format

pub mod events;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod summary;

pub use events::{ClientEvent, ServerEvent};
pub use orchestrator::{SessionOrchestrator, SessionServices};
pub use registry::SessionRegistry;
