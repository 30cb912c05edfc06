//! The engine context: the canvas/forward buffer pair, the turtle
//! registry, key bindings and the deferred event queue, and the frame loop
//! that ties them together.
//!
//! One `Engine` owns all shared state; there are no process-wide globals.
//! The script thread issues turtle commands and drives the frame loop; the
//! platform's notification thread calls [`Engine::key_pressed`] and nothing
//! else. The mutexes exist for that one crossing -- everything besides the
//! event queue is only ever touched from the script thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use terrapin_raster::{Color, Raster};

use crate::events::{resolve_key, EventCallback, EventQueue, KeyBindings, KeyCode};
use crate::pacing::FrameClock;
use crate::space::Viewport;
use crate::turtle::{Turtle, TurtleUpdate};

/// Where composited frames go. The platform hands the engine one of these;
/// the engine calls it once per frame step with the finished forward
/// buffer.
pub trait DisplaySink: Send + Sync {
    fn present(&self, frame: &Raster);
}

pub struct Engine {
    viewport: Viewport,
    canvas: Mutex<Raster>,
    forward: Mutex<Raster>,
    turtles: Mutex<HashMap<u32, Arc<Mutex<Turtle>>>>,
    queue: EventQueue,
    bindings: Mutex<KeyBindings>,
    ids: Mutex<SmallRng>,
    clock: Mutex<FrameClock>,
    sink: Arc<dyn DisplaySink>,
}

impl Engine {
    pub fn new(
        width: u32,
        height: u32,
        frame_delay: Duration,
        sink: Arc<dyn DisplaySink>,
    ) -> Arc<Self> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            | 1;
        Arc::new(Self {
            viewport: Viewport::new(width, height),
            canvas: Mutex::new(Raster::new(width, height)),
            forward: Mutex::new(Raster::new(width, height)),
            turtles: Mutex::new(HashMap::new()),
            queue: EventQueue::new(),
            bindings: Mutex::new(KeyBindings::new()),
            ids: Mutex::new(SmallRng::seed_from_u64(seed)),
            clock: Mutex::new(FrameClock::new(frame_delay)),
            sink,
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Construct and register a turtle. Ids come from the time-seeded
    /// generator; collisions are not checked.
    pub fn spawn_turtle(self: &Arc<Self>) -> TurtleHandle {
        let id = self.ids.lock().unwrap().random::<u32>();
        let turtle = Arc::new(Mutex::new(Turtle::new(id)));
        self.turtles.lock().unwrap().insert(id, turtle.clone());
        TurtleHandle {
            engine: self.clone(),
            turtle,
            id,
        }
    }

    /// Bind a callback to a key. Every callback bound to a key fires, in
    /// registration order, once per press.
    pub fn listen(&self, key: &str, callback: Arc<dyn EventCallback>) -> Result<(), String> {
        let code = resolve_key(key)?;
        self.bindings.lock().unwrap().bind(code, callback);
        Ok(())
    }

    /// The platform input path. The only engine interaction allowed from
    /// the notification thread: look up the key's bindings and append them
    /// to the live queue. Nothing is invoked here.
    pub fn key_pressed(&self, code: KeyCode) {
        let bindings = self.bindings.lock().unwrap();
        let bound = bindings.bound(code);
        if !bound.is_empty() {
            self.queue.extend(bound);
        }
    }

    /// One frame: promote the canvas into the forward buffer, drain and run
    /// queued events, stamp visible registered turtles over the top,
    /// present, then pace. Indefinitely re-invocable; the only per-step
    /// allocation is the vec the drained queue swaps out.
    pub fn frame_step(&self) {
        {
            let canvas = self.canvas.lock().unwrap();
            let mut forward = self.forward.lock().unwrap();
            forward.copy_from(&canvas);
        }

        // No engine locks are held while callbacks run: they are free to
        // issue turtle commands, bind keys, or draw.
        for callback in self.queue.drain() {
            if let Err(err) = callback.invoke() {
                log::error!("key callback failed: {err}");
            }
        }

        {
            let turtles = self.turtles.lock().unwrap();
            let mut forward = self.forward.lock().unwrap();
            for turtle in turtles.values() {
                let turtle = turtle.lock().unwrap();
                if turtle.show {
                    turtle.stamp_to(&self.viewport, &mut forward);
                }
            }
        }

        {
            let forward = self.forward.lock().unwrap();
            self.sink.present(&forward);
        }

        self.clock.lock().unwrap().pace();
    }

    /// A fresh never-ending iterator over frame steps. Restartable: every
    /// call yields a new iterator over the same engine and pacing clock.
    pub fn frame_loop(self: &Arc<Self>) -> FrameLoop {
        FrameLoop {
            engine: self.clone(),
        }
    }
}

/// Marker yielded once per frame step; carries no data.
#[derive(Debug, Clone, Copy)]
pub struct FrameTick;

pub struct FrameLoop {
    engine: Arc<Engine>,
}

impl Iterator for FrameLoop {
    type Item = FrameTick;

    fn next(&mut self) -> Option<FrameTick> {
        self.engine.frame_step();
        Some(FrameTick)
    }
}

/// A turtle plus the engine it draws into. Clones share the same turtle.
/// The handle stays valid while unregistered: the turtle keeps its state
/// and can move, draw, and later rejoin the registry.
#[derive(Clone)]
pub struct TurtleHandle {
    engine: Arc<Engine>,
    turtle: Arc<Mutex<Turtle>>,
    id: u32,
}

impl TurtleHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Re-add this turtle to the per-frame stamping set.
    pub fn register(&self) {
        self.engine
            .turtles
            .lock()
            .unwrap()
            .insert(self.id, self.turtle.clone());
    }

    /// Drop out of the per-frame stamping set. State is untouched; direct
    /// drawing keeps working.
    pub fn unregister(&self) {
        self.engine.turtles.lock().unwrap().remove(&self.id);
    }

    pub fn forward(&self, distance: f64) {
        let mut canvas = self.engine.canvas.lock().unwrap();
        let mut turtle = self.turtle.lock().unwrap();
        turtle.forward(distance, &self.engine.viewport, &mut canvas);
    }

    pub fn left(&self, degrees: f64) {
        self.turtle.lock().unwrap().left(degrees);
    }

    pub fn right(&self, degrees: f64) {
        self.turtle.lock().unwrap().right(degrees);
    }

    pub fn circle(&self, radius: f64) {
        let mut canvas = self.engine.canvas.lock().unwrap();
        let turtle = self.turtle.lock().unwrap();
        turtle.circle(radius, &self.engine.viewport, &mut canvas);
    }

    /// Stamp the contour onto the permanent canvas, regardless of pen or
    /// show and regardless of registry membership.
    pub fn stamp(&self) {
        let mut canvas = self.engine.canvas.lock().unwrap();
        let turtle = self.turtle.lock().unwrap();
        turtle.stamp_to(&self.engine.viewport, &mut canvas);
    }

    pub fn set(&self, update: TurtleUpdate) {
        self.turtle.lock().unwrap().apply(update);
    }

    pub fn x(&self) -> f64 {
        self.turtle.lock().unwrap().x()
    }

    pub fn y(&self) -> f64 {
        self.turtle.lock().unwrap().y()
    }

    pub fn heading(&self) -> f64 {
        self.turtle.lock().unwrap().heading()
    }

    pub fn width(&self) -> f64 {
        self.turtle.lock().unwrap().width()
    }

    pub fn pen(&self) -> bool {
        self.turtle.lock().unwrap().pen
    }

    pub fn show(&self) -> bool {
        self.turtle.lock().unwrap().show
    }

    pub fn color(&self) -> Color {
        self.turtle.lock().unwrap().color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
    };

    struct RecordingSink {
        frames: Mutex<Vec<Vec<u32>>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }

        fn last_frame(&self) -> Vec<u32> {
            self.frames.lock().unwrap().last().cloned().expect("no frame presented")
        }
    }

    impl DisplaySink for RecordingSink {
        fn present(&self, frame: &Raster) {
            self.frames.lock().unwrap().push(frame.pixels().to_vec());
        }
    }

    struct Tally {
        hits: AtomicUsize,
    }

    impl Tally {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl EventCallback for Tally {
        fn invoke(&self) -> Result<(), String> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rig() -> (Arc<Engine>, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let engine = Engine::new(400, 300, Duration::ZERO, sink.clone());
        (engine, sink)
    }

    fn red(handle: &TurtleHandle) {
        handle.set(TurtleUpdate {
            color: Some(RED),
            ..Default::default()
        });
    }

    fn at(frame: &[u32], x: usize, y: usize) -> u32 {
        frame[y * 400 + x]
    }

    #[test]
    fn spawned_turtles_get_distinct_ids() {
        let (engine, _) = rig();
        let a = engine.spawn_turtle();
        let b = engine.spawn_turtle();
        assert_ne!(a.id(), b.id());
        assert_eq!(engine.turtles.lock().unwrap().len(), 2);
    }

    #[test]
    fn visible_turtles_are_stamped_onto_the_frame_not_the_canvas() {
        let (engine, sink) = rig();
        let turtle = engine.spawn_turtle();
        red(&turtle);
        engine.frame_step();

        let frame = sink.last_frame();
        assert_eq!(at(&frame, 200, 150), RED.pack());
        assert_eq!(engine.canvas.lock().unwrap().pixel(200, 150), Some(0));
    }

    #[test]
    fn hidden_turtles_are_skipped_but_still_draw_permanently() {
        let (engine, sink) = rig();
        let turtle = engine.spawn_turtle();
        red(&turtle);
        turtle.set(TurtleUpdate {
            show: Some(false),
            ..Default::default()
        });
        turtle.forward(0.1);
        engine.frame_step();

        let frame = sink.last_frame();
        // The pen stroke survives into the frame via the canvas copy.
        assert_eq!(at(&frame, 210, 150), RED.pack());
        // But nothing was overlaid: the frame is exactly the canvas.
        let canvas = engine.canvas.lock().unwrap();
        assert_eq!(frame.as_slice(), canvas.pixels());
    }

    #[test]
    fn stamp_marks_the_canvas_even_with_pen_and_show_off() {
        let (engine, _) = rig();
        let turtle = engine.spawn_turtle();
        red(&turtle);
        turtle.set(TurtleUpdate {
            pen: Some(false),
            show: Some(false),
            ..Default::default()
        });
        turtle.stamp();
        let canvas = engine.canvas.lock().unwrap();
        assert!(canvas.pixels().iter().any(|&p| p == RED.pack()));
    }

    #[test]
    fn unregister_register_round_trip_preserves_state() {
        let (engine, sink) = rig();
        let turtle = engine.spawn_turtle();
        red(&turtle);
        turtle.left(90.0);
        turtle.set(TurtleUpdate {
            pen: Some(false),
            ..Default::default()
        });
        turtle.forward(0.2);

        turtle.unregister();
        assert!(engine.turtles.lock().unwrap().is_empty());
        engine.frame_step();
        assert!(sink.last_frame().iter().all(|&p| p == 0));

        // Unregistered turtles still move and draw.
        turtle.right(90.0);
        assert_eq!(turtle.heading(), 0.0);

        turtle.register();
        engine.frame_step();
        assert!((turtle.y() - 0.2).abs() < 1e-12);
        // Stamped again, 50 pixels above the center.
        assert_eq!(at(&sink.last_frame(), 200, 100), RED.pack());
    }

    #[test]
    fn frame_rebuilds_from_the_canvas_every_step() {
        let (engine, sink) = rig();
        let turtle = engine.spawn_turtle();
        red(&turtle);
        engine.frame_step();
        assert_eq!(at(&sink.last_frame(), 200, 150), RED.pack());

        // Once the turtle leaves the registry its old overlay must not
        // linger in later frames.
        turtle.unregister();
        engine.frame_step();
        assert_eq!(at(&sink.last_frame(), 200, 150), 0);
    }

    #[test]
    fn key_press_defers_callbacks_to_the_next_frame_step() {
        let (engine, _) = rig();
        let tally = Tally::new();
        engine.listen("a", tally.clone()).unwrap();

        engine.key_pressed(resolve_key("a").unwrap());
        assert_eq!(tally.count(), 0);

        engine.frame_step();
        assert_eq!(tally.count(), 1);

        // No press, no re-fire.
        engine.frame_step();
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn all_bindings_for_a_key_fire_per_press() {
        let (engine, _) = rig();
        let first = Tally::new();
        let second = Tally::new();
        engine.listen("up", first.clone()).unwrap();
        engine.listen("up", second.clone()).unwrap();

        engine.key_pressed(KeyCode::UP);
        engine.frame_step();
        assert_eq!((first.count(), second.count()), (1, 1));
    }

    #[test]
    fn unknown_key_names_are_rejected() {
        let (engine, _) = rig();
        let tally = Tally::new();
        assert!(engine.listen("not-a-key", tally).is_err());
    }

    struct Rebinder {
        engine: Mutex<Option<Arc<Engine>>>,
        tally: Arc<Tally>,
    }

    impl EventCallback for Rebinder {
        fn invoke(&self) -> Result<(), String> {
            let engine = self.engine.lock().unwrap().take().expect("already invoked");
            engine.listen("b", self.tally.clone()).unwrap();
            // Press the key immediately; the new binding must only fire on
            // a later frame's drain.
            engine.key_pressed(resolve_key("b").unwrap());
            Ok(())
        }
    }

    #[test]
    fn bindings_registered_during_a_drain_fire_next_frame_at_the_earliest() {
        let (engine, _) = rig();
        let tally = Tally::new();
        let rebinder = Arc::new(Rebinder {
            engine: Mutex::new(Some(engine.clone())),
            tally: tally.clone(),
        });
        engine.listen("a", rebinder).unwrap();

        engine.key_pressed(resolve_key("a").unwrap());
        engine.frame_step();
        assert_eq!(tally.count(), 0, "new binding fired during the same drain");

        engine.frame_step();
        assert_eq!(tally.count(), 1);
    }

    struct Failing;

    impl EventCallback for Failing {
        fn invoke(&self) -> Result<(), String> {
            Err("deliberate".to_string())
        }
    }

    #[test]
    fn a_failing_callback_does_not_stop_the_rest_of_the_batch() {
        let (engine, _) = rig();
        let tally = Tally::new();
        engine.listen("a", Arc::new(Failing)).unwrap();
        engine.listen("a", tally.clone()).unwrap();

        engine.key_pressed(resolve_key("a").unwrap());
        engine.frame_step();
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn frame_loop_is_infinite_and_restartable() {
        let (engine, sink) = rig();
        assert_eq!(engine.frame_loop().take(3).count(), 3);
        assert_eq!(engine.frame_loop().take(2).count(), 2);
        assert_eq!(sink.frames.lock().unwrap().len(), 5);
    }
}
