use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Integer(i64),
  Float(f64),
  String(String),
  Null,
}

impl Value {
  /// Numeric view of an argument. Anything that does not read as a finite
  /// number becomes 0.
  pub fn to_f64(&self) -> f64 {
    let value = match self {
      Value::Bool(boolean) => f64::from(u8::from(*boolean)),
      Value::Integer(integer) => *integer as f64,
      Value::Float(float) => *float,
      Value::String(string) => string.trim().parse::<f64>().unwrap_or(0.),
      Value::Null => 0.,
    };
    if value.is_finite() {
      value
    } else {
      0.
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(boolean) => write!(f, "{boolean}"),
      Value::Integer(integer) => write!(f, "{integer}"),
      Value::Float(float) if float.fract() == 0. && float.abs() < 2f64.powi(53) => {
        write!(f, "{}", *float as i64)
      }
      Value::Float(float) => write!(f, "{float}"),
      Value::String(string) => f.write_str(string),
      Value::Null => Ok(()),
    }
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Integer(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

pub type Args = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Opcode {
  EventWhenFlagClicked,
  EventWhenSpriteClicked,
  MotionMoveSteps,
  MotionTurnRight,
  MotionTurnLeft,
  MotionGotoXy,
  ControlRepeatAnimation,
  LooksSayForSecs,
  LooksThinkForSecs,
  Unknown(String),
}

impl Opcode {
  pub fn as_str(&self) -> &str {
    match self {
      Opcode::EventWhenFlagClicked => "EVENT_WHEN_FLAG_CLICKED",
      Opcode::EventWhenSpriteClicked => "EVENT_WHEN_SPRITE_CLICKED",
      Opcode::MotionMoveSteps => "MOTION_MOVE_STEPS",
      Opcode::MotionTurnRight => "MOTION_TURN_RIGHT",
      Opcode::MotionTurnLeft => "MOTION_TURN_LEFT",
      Opcode::MotionGotoXy => "MOTION_GOTO_XY",
      Opcode::ControlRepeatAnimation => "CONTROL_REPEAT_ANIMATION",
      Opcode::LooksSayForSecs => "LOOKS_SAY_FOR_SECS",
      Opcode::LooksThinkForSecs => "LOOKS_THINK_FOR_SECS",
      Opcode::Unknown(tag) => tag,
    }
  }

  /// Arguments a freshly created block starts with.
  pub fn default_args(&self) -> Args {
    let defaults: &[(&str, Value)] = match self {
      Opcode::MotionMoveSteps => &[("steps", Value::Integer(10))],
      Opcode::MotionTurnRight | Opcode::MotionTurnLeft => &[("degrees", Value::Integer(15))],
      Opcode::MotionGotoXy => &[("x", Value::Integer(0)), ("y", Value::Integer(0))],
      Opcode::LooksSayForSecs | Opcode::LooksThinkForSecs => &[
        ("message", Value::String(String::new())),
        ("seconds", Value::Integer(2)),
      ],
      Opcode::EventWhenFlagClicked
      | Opcode::EventWhenSpriteClicked
      | Opcode::ControlRepeatAnimation
      | Opcode::Unknown(_) => &[],
    };
    defaults
      .iter()
      .map(|(name, value)| (name.to_string(), value.clone()))
      .collect()
  }
}

impl From<&str> for Opcode {
  fn from(tag: &str) -> Self {
    match tag {
      "EVENT_WHEN_FLAG_CLICKED" => Opcode::EventWhenFlagClicked,
      "EVENT_WHEN_SPRITE_CLICKED" => Opcode::EventWhenSpriteClicked,
      "MOTION_MOVE_STEPS" => Opcode::MotionMoveSteps,
      "MOTION_TURN_RIGHT" => Opcode::MotionTurnRight,
      "MOTION_TURN_LEFT" => Opcode::MotionTurnLeft,
      "MOTION_GOTO_XY" => Opcode::MotionGotoXy,
      "CONTROL_REPEAT_ANIMATION" => Opcode::ControlRepeatAnimation,
      "LOOKS_SAY_FOR_SECS" => Opcode::LooksSayForSecs,
      "LOOKS_THINK_FOR_SECS" => Opcode::LooksThinkForSecs,
      other => Opcode::Unknown(other.to_string()),
    }
  }
}

impl From<String> for Opcode {
  fn from(tag: String) -> Self {
    Opcode::from(tag.as_str())
  }
}

impl From<Opcode> for String {
  fn from(opcode: Opcode) -> Self {
    opcode.as_str().to_string()
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockId(u64);

impl BlockId {
  fn fresh() -> Self {
    BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "block-{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
  pub id: BlockId,
  #[serde(rename = "type")]
  pub opcode: Opcode,
  pub args: Args,
}

impl Block {
  pub fn number(&self, name: &str) -> f64 {
    self.args.get(name).map_or(0., Value::to_f64)
  }

  pub fn text(&self, name: &str) -> String {
    self.args.get(name).map(Value::to_string).unwrap_or_default()
  }

  /// Merges `update` over the current arguments.
  pub fn update_args(&mut self, update: Args) {
    self.args.extend(update);
  }
}

pub fn create_block(opcode: Opcode) -> Block {
  Block {
    id: BlockId::fresh(),
    args: opcode.default_args(),
    opcode,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_args_per_opcode() {
    let block = create_block(Opcode::MotionMoveSteps);
    assert_eq!(block.args.get("steps"), Some(&Value::Integer(10)));

    let block = create_block(Opcode::MotionTurnLeft);
    assert_eq!(block.number("degrees"), 15.);

    let block = create_block(Opcode::MotionGotoXy);
    assert_eq!((block.number("x"), block.number("y")), (0., 0.));

    let block = create_block(Opcode::LooksThinkForSecs);
    assert_eq!(block.text("message"), "");
    assert_eq!(block.number("seconds"), 2.);

    assert!(create_block(Opcode::EventWhenFlagClicked).args.is_empty());
    assert!(create_block(Opcode::ControlRepeatAnimation).args.is_empty());
  }

  #[test]
  fn test_unknown_opcode_still_creates_block() {
    let block = create_block(Opcode::from("PEN_DOWN"));
    assert_eq!(block.opcode, Opcode::Unknown("PEN_DOWN".to_string()));
    assert!(block.args.is_empty());
  }

  #[test]
  fn test_block_ids_are_unique() {
    let a = create_block(Opcode::MotionMoveSteps);
    let b = create_block(Opcode::MotionMoveSteps);
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn test_numeric_coercion_never_fails() {
    assert_eq!(Value::from("abc").to_f64(), 0.);
    assert_eq!(Value::from(" 12.5 ").to_f64(), 12.5);
    assert_eq!(Value::from("").to_f64(), 0.);
    assert_eq!(Value::Null.to_f64(), 0.);
    assert_eq!(Value::Float(f64::NAN).to_f64(), 0.);
    assert_eq!(Value::Bool(true).to_f64(), 1.);

    let block = create_block(Opcode::MotionMoveSteps);
    assert_eq!(block.number("missing"), 0.);
  }

  #[test]
  fn test_update_args_merges() {
    let mut block = create_block(Opcode::LooksSayForSecs);
    block.update_args(Args::from([("message".to_string(), Value::from("hi"))]));
    assert_eq!(block.text("message"), "hi");
    assert_eq!(block.number("seconds"), 2.);
  }

  #[test]
  fn test_opcode_tags_round_trip_through_serde() {
    let opcode: Opcode = serde_json::from_str("\"LOOKS_SAY_FOR_SECS\"").unwrap();
    assert_eq!(opcode, Opcode::LooksSayForSecs);
    assert_eq!(serde_json::to_string(&Opcode::MotionGotoXy).unwrap(), "\"MOTION_GOTO_XY\"");

    let args: Args = serde_json::from_str(r#"{"steps": "abc", "seconds": 1.5, "x": null}"#).unwrap();
    assert_eq!(args["steps"].to_f64(), 0.);
    assert_eq!(args["seconds"].to_f64(), 1.5);
    assert_eq!(args["x"], Value::Null);
  }

  #[test]
  fn test_text_of_numbers() {
    assert_eq!(Value::Float(3.).to_string(), "3");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
    assert_eq!(Value::Integer(7).to_string(), "7");
    assert_eq!(Value::Float(-4.).to_string(), "-4");
    assert_eq!(Value::Float(1e20).to_string(), "100000000000000000000");
  }
}
