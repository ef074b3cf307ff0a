mod backend;
mod backends;
pub mod labels;
mod postprocess;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use postprocess::{decode_yolov8, non_max_suppression, YoloParams};
pub use result::{BoundingBox, Detection};
