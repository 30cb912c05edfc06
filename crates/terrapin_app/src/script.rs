//! Rust <-> Lua bridge for the turtle command surface.
//!
//! The script owns the pacing of the whole program: it issues turtle
//! commands freely and advances rendering by iterating `turtle.loop()`,
//! each iteration being exactly one frame step. Key callbacks registered
//! through `turtle.listen` are plain Lua functions; the engine queues them
//! on key presses and this thread invokes them inside the frame step, so
//! scripts never see a callback run concurrently with their own code.
//!
//! Property updates arrive as a Lua table with the same sparse keyword
//! surface the command set has always had (aliases included); unknown keys
//! are rejected with an error naming the key rather than silently skipped.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mlua::prelude::*;

use terrapin_core::{Engine, EventCallback, TurtleHandle, TurtleUpdate};
use terrapin_raster::Color;

/// A Lua function bound to a key. Invocation happens on the script thread
/// during the frame step's event drain; errors surface as `Err` and are
/// logged by the engine without stopping the batch.
struct LuaCallback(LuaFunction);

impl EventCallback for LuaCallback {
    fn invoke(&self) -> Result<(), String> {
        self.0.call::<()>(()).map_err(|e| e.to_string())
    }
}

struct ScriptTurtle(TurtleHandle);

impl LuaUserData for ScriptTurtle {
    fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x()));
        fields.add_field_method_get("y", |_, this| Ok(this.0.y()));
        fields.add_field_method_get("heading", |_, this| Ok(this.0.heading()));
        fields.add_field_method_get("width", |_, this| Ok(this.0.width()));
        fields.add_field_method_get("pen", |_, this| Ok(this.0.pen()));
        fields.add_field_method_get("show", |_, this| Ok(this.0.show()));
        fields.add_field_method_get("color", |lua, this| {
            let color = this.0.color();
            let table = lua.create_table()?;
            table.push(color.r)?;
            table.push(color.g)?;
            table.push(color.b)?;
            Ok(table)
        });
    }

    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("forward", |_, this, distance: f64| {
            this.0.forward(distance);
            Ok(())
        });
        methods.add_method("left", |_, this, degrees: f64| {
            this.0.left(degrees);
            Ok(())
        });
        methods.add_method("right", |_, this, degrees: f64| {
            this.0.right(degrees);
            Ok(())
        });
        methods.add_method("circle", |_, this, radius: f64| {
            this.0.circle(radius);
            Ok(())
        });
        methods.add_method("stamp", |_, this, ()| {
            this.0.stamp();
            Ok(())
        });
        methods.add_method("register", |_, this, ()| {
            this.0.register();
            Ok(())
        });
        methods.add_method("unregister", |_, this, ()| {
            this.0.unregister();
            Ok(())
        });
        methods.add_method("set", |_, this, patch: LuaTable| {
            let update = parse_update(patch)?;
            this.0.set(update);
            Ok(())
        });
    }
}

/// Build the `turtle` global table: the constructor, the key-binding entry
/// point, and the frame-loop iterator.
pub fn install_api(lua: &Lua, engine: Arc<Engine>) -> LuaResult<()> {
    let turtle = lua.create_table()?;

    let spawn_engine = engine.clone();
    turtle.set(
        "new",
        lua.create_function(move |_, ()| Ok(ScriptTurtle(spawn_engine.spawn_turtle())))?,
    )?;

    let listen_engine = engine.clone();
    turtle.set(
        "listen",
        lua.create_function(move |_, (key, callback): (String, LuaFunction)| {
            listen_engine
                .listen(&key, Arc::new(LuaCallback(callback)))
                .map_err(LuaError::RuntimeError)
        })?,
    )?;

    turtle.set(
        "loop",
        lua.create_function(move |lua, ()| {
            // `for _ in turtle.loop() do ... end`: every iteration runs one
            // frame step and yields a marker, forever.
            let engine = engine.clone();
            lua.create_function(move |_, ()| {
                engine.frame_step();
                Ok(true)
            })
        })?,
    )?;

    lua.globals().set("turtle", turtle)
}

/// Load and execute the startup script in a fresh interpreter.
pub fn run_script(engine: Arc<Engine>, path: &Path) -> Result<(), String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read script {}: {e}", path.display()))?;
    let lua = Lua::new();
    install_api(&lua, engine).map_err(|e| format!("Failed to install turtle API: {e}"))?;
    log::info!("Running script: {}", path.display());
    lua.load(&source)
        .set_name(path.to_string_lossy())
        .exec()
        .map_err(|e| format!("Script error: {e}"))
}

fn parse_update(patch: LuaTable) -> LuaResult<TurtleUpdate> {
    let mut update = TurtleUpdate::default();
    for entry in patch.pairs::<String, LuaValue>() {
        let (key, value) = entry?;
        match key.to_ascii_lowercase().as_str() {
            "x" => update.x = Some(number(&key, &value)?),
            "y" => update.y = Some(number(&key, &value)?),
            "xy" | "pos" | "position" => update.position = Some(pair(&key, &value)?),
            "h" | "heading" => update.heading = Some(number(&key, &value)?),
            "t" | "thickness" | "w" | "width" => update.width = Some(number(&key, &value)?),
            "p" | "pen" | "penupdown" | "penstate" => update.pen = Some(boolean(&key, &value)?),
            "d" | "draw" | "v" | "visible" | "visibility" | "s" | "show" => {
                update.show = Some(boolean(&key, &value)?)
            }
            "c" | "color" | "colour" => update.color = Some(color(&value)?),
            "shape" => match shape(&value) {
                Ok(points) => update.shape = Some(points),
                // The previous contour stays; the rest of the patch still
                // applies.
                Err(err) => log::error!("ignoring malformed shape: {err}"),
            },
            other => {
                return Err(LuaError::RuntimeError(format!(
                    "unknown turtle property '{other}'"
                )))
            }
        }
    }
    Ok(update)
}

fn number(key: &str, value: &LuaValue) -> LuaResult<f64> {
    match value {
        LuaValue::Integer(i) => Ok(*i as f64),
        LuaValue::Number(n) => Ok(*n),
        _ => Err(LuaError::RuntimeError(format!(
            "turtle property '{key}' expects a number"
        ))),
    }
}

fn boolean(key: &str, value: &LuaValue) -> LuaResult<bool> {
    match value {
        LuaValue::Boolean(b) => Ok(*b),
        _ => Err(LuaError::RuntimeError(format!(
            "turtle property '{key}' expects a boolean"
        ))),
    }
}

fn pair(key: &str, value: &LuaValue) -> LuaResult<(f64, f64)> {
    let table = value.as_table().ok_or_else(|| {
        LuaError::RuntimeError(format!("turtle property '{key}' expects a pair of numbers"))
    })?;
    let x: f64 = table.get(1)?;
    let y: f64 = table.get(2)?;
    Ok((x, y))
}

fn color(value: &LuaValue) -> LuaResult<Color> {
    let table = value
        .as_table()
        .ok_or_else(|| LuaError::RuntimeError("color expects three channels in [0, 1]".into()))?;
    let r: f64 = table.get(1)?;
    let g: f64 = table.get(2)?;
    let b: f64 = table.get(3)?;
    Ok(Color::new(r, g, b))
}

fn shape(value: &LuaValue) -> Result<Vec<(f64, f64)>, String> {
    let table = value
        .as_table()
        .ok_or_else(|| "shape expects a sequence of (x, y) pairs".to_string())?;
    let mut points = Vec::new();
    for (i, entry) in table.clone().sequence_values::<LuaValue>().enumerate() {
        let entry = entry.map_err(|e| format!("shape entry {}: {e}", i + 1))?;
        let point = pair("shape", &entry).map_err(|e| format!("shape entry {}: {e}", i + 1))?;
        points.push(point);
    }
    Ok(points)
}
