//! Network stream ingestion with automatic reconnection

pub mod backoff;
pub mod stream;


pub use backoff::Backoff;
pub use stream::{ConnectionLinks, StreamConnection, TransitionHandler};
