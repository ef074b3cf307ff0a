use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector backend.
///
/// Backends receive frames already resized to `input_size()` and return
/// boxes in that coordinate space. Callers map boxes back to the captured
/// frame themselves.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Width and height the backend expects its input frames to have.
    fn input_size(&self) -> (u32, u32);

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
