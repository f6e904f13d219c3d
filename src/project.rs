use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::block::{Args, Opcode};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Config {
  #[serde(default = "default_frame_interval_ms")]
  pub frame_interval_ms: u64,
  #[serde(default = "default_move_frames")]
  pub move_frames: u32,
  #[serde(default = "default_turn_frames")]
  pub turn_frames: u32,
  #[serde(default = "default_sprite_spacing")]
  pub sprite_spacing: f64,
  #[serde(default = "default_event_capacity")]
  pub event_capacity: usize,
  /// Sprites closer than this swap scripts mid-run. Off when unset.
  #[serde(default)]
  pub swap_distance: Option<f64>,
}

fn default_frame_interval_ms() -> u64 {
  16
}

fn default_move_frames() -> u32 {
  20
}

fn default_turn_frames() -> u32 {
  15
}

fn default_sprite_spacing() -> f64 {
  120.
}

fn default_event_capacity() -> usize {
  1024
}

fn default_direction() -> f64 {
  90.
}

impl Config {
  pub fn frame_interval(&self) -> Duration {
    Duration::from_millis(self.frame_interval_ms)
  }
}

impl Default for Config {
  fn default() -> Self {
    Config {
      frame_interval_ms: default_frame_interval_ms(),
      move_frames: default_move_frames(),
      turn_frames: default_turn_frames(),
      sprite_spacing: default_sprite_spacing(),
      event_capacity: default_event_capacity(),
      swap_distance: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
  #[serde(default)]
  pub config: Config,
  #[serde(default)]
  pub sprites: Vec<SpriteDef>,
}

/// A sprite as written in a project file. Missing coordinates fall back to
/// the slot an added sprite would get.
#[derive(Debug, Clone, Deserialize)]
pub struct SpriteDef {
  pub name: Option<String>,
  pub x: Option<f64>,
  pub y: Option<f64>,
  #[serde(default = "default_direction")]
  pub direction: f64,
  #[serde(default)]
  pub blocks: Vec<BlockDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDef {
  #[serde(rename = "type")]
  pub opcode: Opcode,
  #[serde(default)]
  pub args: Args,
}

impl Project {
  pub fn load(path: impl AsRef<Path>) -> Result<Project> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
  }

  pub fn parse(json: &str) -> Result<Project> {
    Ok(serde_json::from_str(json)?)
  }
}
