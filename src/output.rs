//! Output device traits
//!
//! The virtual camera library is an external collaborator; the sink only needs
//! to open a device once and push RGB frames into it.

use crate::Result;
use crate::types::{Frame, FrameRate};

/// Opens output devices
pub trait OutputBackend: Send + Sync + 'static {
    /// Open a device with fixed dimensions and rate
    ///
    /// The parameters cannot be changed once the device is open.
    fn open(&self, width: u32, height: u32, rate: FrameRate) -> Result<Box<dyn OutputDevice>>;
}

/// An open output device
pub trait OutputDevice: Send {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Push one RGB frame
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Release the device
    fn close(&mut self);
}
