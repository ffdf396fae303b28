use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{info, warn};

use crate::error::{LiveError, Result};
use crate::kernel::devices::VideoTrack;

/// Native camera on its own thread, keeping only the newest frame.
pub struct CameraCapture {
    latest: Arc<Mutex<Option<RgbImage>>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraCapture {
    pub fn open(index: u32) -> Result<Self> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread = {
            let latest = latest.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("camera".into())
                .spawn(move || {
                    let requested =
                        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
                    let mut camera = match Camera::new(CameraIndex::Index(index), requested)
                        .and_then(|mut c| c.open_stream().map(|_| c))
                    {
                        Ok(camera) => camera,
                        Err(e) => {
                            running.store(false, Ordering::SeqCst);
                            let _ = ready_tx.send(Err(LiveError::DeviceAccess(e.to_string())));
                            return;
                        }
                    };
                    info!("camera {} streaming", index);
                    let _ = ready_tx.send(Ok(()));

                    while running.load(Ordering::SeqCst) {
                        let decoded = camera
                            .frame()
                            .and_then(|frame| frame.decode_image::<RgbFormat>());
                        match decoded {
                            Ok(image) => {
                                let (w, h) = (image.width(), image.height());
                                if let Some(frame) = RgbImage::from_raw(w, h, image.into_raw()) {
                                    *latest.lock().unwrap_or_else(PoisonError::into_inner) =
                                        Some(frame);
                                }
                            }
                            Err(e) => warn!("camera frame dropped: {}", e),
                        }
                    }
                    let _ = camera.stop_stream();
                    info!("camera {} released", index);
                })
                .map_err(|e| LiveError::DeviceAccess(e.to_string()))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                latest,
                running,
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(LiveError::DeviceAccess("camera thread exited early".into()))
            }
        }
    }
}

impl VideoTrack for CameraCapture {
    fn latest_frame(&self) -> Option<RgbImage> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
