//! Core types shared across the relay.
//!
//! - [`Frame`] is an immutable, reference-counted pixel buffer with explicit layout
//! - [`FrameRate`] is the rational pacing advertised by a source
//! - [`ConnectionState`] is the single authoritative connection lifecycle enum
//! - [`PreviewRate`] controls how often preview subscribers see delivered frames
//!
//! ## Usage Example
//!
//! ```rust
//! use camrelay::types::{Frame, FrameRate, PixelFormat};
//!
//! let frame = Frame::solid(4, 2, PixelFormat::Bgr24, [255, 0, 0]);
//! assert_eq!(frame.to_rgb().pixel(0, 0), Some([0, 0, 255]));
//!
//! let rate = FrameRate::resolve(None);
//! assert_eq!(rate, FrameRate::new(25, 1));
//! ```

mod frame;
mod frame_rate;
mod preview_rate;
mod state;

pub use frame::{Frame, PixelFormat};
pub use frame_rate::FrameRate;
pub use preview_rate::PreviewRate;
pub use state::ConnectionState;
