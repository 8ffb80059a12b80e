use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError, bounded};
use nokhwa::{
    Camera, query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::types::Frame;

// Raw formats first: some built-in cameras advertise YUYV but fail to stream it.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

/// Yields RGBA frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Why [`pump_frames`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    Stopped,
    /// The counting side dropped its receiver, so the session is over.
    Disconnected,
}

/// Moves frames from `source` into `frame_tx` until `stop` is raised or the
/// receiver goes away.
///
/// Never blocks on the channel: when the counting worker has not taken the
/// previous frame yet the new one is dropped. Unreadable frames are logged
/// and skipped.
pub fn pump_frames<S: FrameSource>(
    source: &mut S,
    frame_tx: &Sender<Frame>,
    stop: &AtomicBool,
) -> PumpExit {
    let mut dropped = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("skipping camera frame: {err:?}");
                continue;
            }
        };

        match frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("{dropped} frames dropped while the counter was busy");
                return PumpExit::Disconnected;
            }
        }
    }
    log::debug!("{dropped} frames dropped while the counter was busy");
    PumpExit::Stopped
}

struct NokhwaSource {
    camera: Camera,
}

impl FrameSource for NokhwaSource {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("camera frame read failed")?;
        let converted = rgba_converter::convert_camera_frame(&buffer)?;
        Ok(Frame {
            rgba: converted.rgba,
            width: converted.width,
            height: converted.height,
            timestamp: Instant::now(),
        })
    }
}

fn open_camera(index: &CameraIndex) -> Result<Camera> {
    let requested = RequestedFormat::with_formats(
        RequestedFormatType::AbsoluteHighestFrameRate,
        PREFERRED_PIXEL_FORMATS,
    );
    let mut camera = Camera::new(index.clone(), requested)
        .with_context(|| format!("failed to open camera {index:?}"))?;
    camera
        .open_stream()
        .with_context(|| format!("failed to start streaming from camera {index:?}"))?;
    log::info!(
        "camera {index:?} streaming {:?} at {:?}",
        camera.frame_format(),
        camera.resolution()
    );
    Ok(camera)
}

/// Capture thread for one counting session.
///
/// Capture ends when the session drops its frame receiver, on [`stop`], or
/// when the handle is dropped.
///
/// [`stop`]: CameraStream::stop
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("camera thread panicked");
            }
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens the camera on its own thread and starts feeding `frame_tx`.
///
/// Returns once the camera is streaming, or with the error that kept it from
/// opening.
pub fn start_camera_stream(index: CameraIndex, frame_tx: Sender<Frame>) -> Result<CameraStream> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

    let handle = thread::spawn(move || {
        let mut source = match open_camera(&index) {
            Ok(camera) => {
                let _ = ready_tx.send(Ok(()));
                NokhwaSource { camera }
            }
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };

        let exit = pump_frames(&mut source, &frame_tx, &stop_flag);
        log::info!("camera {index:?} capture ended ({exit:?})");
        if let Err(err) = source.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    });

    let stream = CameraStream {
        stop,
        handle: Some(handle),
    };
    ready_rx
        .recv()
        .map_err(|_| anyhow!("camera thread exited before opening the camera"))??;
    Ok(stream)
}
