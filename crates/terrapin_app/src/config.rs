use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The four-line startup file: canvas width, canvas height, frame delay in
/// milliseconds, script path -- in that order. Lines past the fourth are
/// ignored.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub width: u32,
    pub height: u32,
    pub frame_delay: Duration,
    pub script_path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<StartupConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let mut lines = raw.lines().map(str::trim);

    let width = parse_field::<u32>(lines.next(), "canvas width")?;
    let height = parse_field::<u32>(lines.next(), "canvas height")?;
    let delay_ms = parse_field::<u64>(lines.next(), "frame delay")?;
    let script = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| "Config is missing the script path".to_string())?;

    if width == 0 || height == 0 {
        return Err(format!("Canvas dimensions must be positive, got {width}x{height}"));
    }

    Ok(StartupConfig {
        width,
        height,
        frame_delay: Duration::from_millis(delay_ms),
        script_path: PathBuf::from(script),
    })
}

fn parse_field<T: std::str::FromStr>(line: Option<&str>, what: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let line = line.ok_or_else(|| format!("Config is missing the {what} line"))?;
    line.parse::<T>()
        .map_err(|e| format!("Invalid {what} '{line}': {e}"))
}
