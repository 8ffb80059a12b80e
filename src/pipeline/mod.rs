#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod keypoints;
#[cfg(feature = "camera-nokhwa")]
mod rgba_converter;

#[cfg(feature = "camera-nokhwa")]
pub use camera::{
    CameraDevice, CameraStream, FrameSource, PumpExit, available_cameras, pump_frames,
    start_camera_stream,
};
pub use keypoints::{KeypointProvider, OrtKeypointProvider, PalmDetectorConfig};
