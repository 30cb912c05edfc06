pub mod present;
pub mod window;

pub use present::{FramePresented, FrameShare, WindowSink};
pub use window::{create_window, PlatformConfig};
