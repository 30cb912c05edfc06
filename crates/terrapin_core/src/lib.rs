pub mod engine;
pub mod events;
pub mod pacing;
pub mod space;
pub mod turtle;

pub use engine::{DisplaySink, Engine, FrameLoop, FrameTick, TurtleHandle};
pub use events::{resolve_key, EventCallback, EventQueue, KeyBindings, KeyCode};
pub use pacing::FrameClock;
pub use space::Viewport;
pub use turtle::{Turtle, TurtleUpdate};
