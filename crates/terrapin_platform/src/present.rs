//! The present channel between the engine's script thread and the winit
//! thread: a pre-sized shared pixel buffer plus an event-loop nudge.
//!
//! The engine finishes a forward buffer and copies it into the
//! [`FrameShare`]; the winit thread later expands it into the window's
//! surface. Neither side ever blocks the other for longer than one
//! whole-buffer copy.

use std::sync::{Arc, Mutex};

use terrapin_core::DisplaySink;
use terrapin_raster::Raster;
use winit::event_loop::EventLoopProxy;

/// User event fired through the event-loop proxy whenever a new frame
/// lands in the share, waking the winit thread to redraw.
#[derive(Debug, Clone, Copy)]
pub struct FramePresented;

/// The shared present buffer, sized once at startup. Frames move through
/// it by whole-buffer copy in both directions.
pub struct FrameShare {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u32>>,
}

impl FrameShare {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            pixels: Mutex::new(vec![0; width as usize * height as usize]),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn store(&self, frame: &Raster) {
        let mut pixels = self.pixels.lock().unwrap();
        pixels.copy_from_slice(frame.pixels());
    }

    /// Expand the packed `0x00RRGGBB` frame into the RGBA byte layout a
    /// CPU framebuffer surface expects.
    pub fn blit_rgba(&self, dest: &mut [u8]) {
        let pixels = self.pixels.lock().unwrap();
        for (chunk, &packed) in dest.chunks_exact_mut(4).zip(pixels.iter()) {
            chunk[0] = (packed >> 16) as u8;
            chunk[1] = (packed >> 8) as u8;
            chunk[2] = packed as u8;
            chunk[3] = 0xff;
        }
    }
}

/// [`DisplaySink`] backed by a window: copy the finished frame into the
/// share, then nudge the event loop to redraw from it.
pub struct WindowSink {
    share: Arc<FrameShare>,
    proxy: Mutex<EventLoopProxy<FramePresented>>,
}

impl WindowSink {
    pub fn new(share: Arc<FrameShare>, proxy: EventLoopProxy<FramePresented>) -> Self {
        Self {
            share,
            proxy: Mutex::new(proxy),
        }
    }
}

impl DisplaySink for WindowSink {
    fn present(&self, frame: &Raster) {
        self.share.store(frame);
        // send_event only fails once the event loop is gone; the process
        // is on its way out at that point.
        if self.proxy.lock().unwrap().send_event(FramePresented).is_err() {
            log::debug!("event loop gone, dropped a frame");
        }
    }
}
