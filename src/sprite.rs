use std::fmt;

use serde::Serialize;

use crate::block::{create_block, Args, Block, BlockId, Opcode};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SpriteId(String);

impl SpriteId {
  pub fn new(id: impl Into<String>) -> Self {
    SpriteId(id.into())
  }
}

impl fmt::Display for SpriteId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Position in stage units and heading in degrees, 90 facing +x.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
  pub x: f64,
  pub y: f64,
  pub direction: f64,
}

impl Pose {
  pub fn new(x: f64, y: f64, direction: f64) -> Self {
    Pose { x, y, direction }
  }

  pub fn distance_to(&self, other: &Pose) -> f64 {
    (self.x - other.x).hypot(self.y - other.y)
  }
}

impl Default for Pose {
  fn default() -> Self {
    Pose::new(0., 0., 90.)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sprite {
  pub id: SpriteId,
  pub name: String,
  #[serde(flatten)]
  pub pose: Pose,
  pub initial: Pose,
  pub blocks: Vec<Block>,
  pub say: String,
  pub think: String,
}

impl Sprite {
  /// The home pose is fixed here and survives every later move.
  pub fn new(id: SpriteId, name: impl Into<String>, initial: Pose) -> Self {
    Sprite {
      id,
      name: name.into(),
      pose: initial,
      initial,
      blocks: Vec::new(),
      say: String::new(),
      think: String::new(),
    }
  }

  pub fn set_say(&mut self, text: &str) {
    self.say = text.to_string();
    if !text.is_empty() {
      self.think.clear();
    }
  }

  pub fn set_think(&mut self, text: &str) {
    self.think = text.to_string();
    if !text.is_empty() {
      self.say.clear();
    }
  }

  pub fn clear_speech(&mut self) {
    self.say.clear();
    self.think.clear();
  }

  pub fn reset(&mut self) {
    self.pose = self.initial;
    self.clear_speech();
  }

  /// Live repositioning (dragging). The home pose is left alone.
  pub fn move_to(&mut self, x: f64, y: f64) {
    self.pose.x = x;
    self.pose.y = y;
  }

  pub fn add_block(&mut self, opcode: Opcode) -> BlockId {
    let block = create_block(opcode);
    let id = block.id;
    self.blocks.push(block);
    id
  }

  pub fn remove_block(&mut self, id: BlockId) -> bool {
    let before = self.blocks.len();
    self.blocks.retain(|block| block.id != id);
    self.blocks.len() != before
  }

  /// Moves `source` to the slot `target` occupied before the move.
  pub fn reorder_block(&mut self, source: BlockId, target: BlockId) -> bool {
    let source_index = self.blocks.iter().position(|block| block.id == source);
    let target_index = self.blocks.iter().position(|block| block.id == target);
    match (source_index, target_index) {
      (Some(from), Some(to)) if from != to => {
        let moved = self.blocks.remove(from);
        self.blocks.insert(to, moved);
        true
      }
      _ => false,
    }
  }

  pub fn update_block_args(&mut self, id: BlockId, update: Args) -> bool {
    match self.blocks.iter_mut().find(|block| block.id == id) {
      Some(block) => {
        block.update_args(update);
        true
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::Value;

  fn sprite() -> Sprite {
    Sprite::new(SpriteId::new("sprite-1"), "Sprite 1", Pose::default())
  }

  fn order(sprite: &Sprite) -> Vec<BlockId> {
    sprite.blocks.iter().map(|block| block.id).collect()
  }

  #[test]
  fn test_say_and_think_exclude_each_other() {
    let mut sprite = sprite();
    sprite.set_say("hi");
    assert_eq!((sprite.say.as_str(), sprite.think.as_str()), ("hi", ""));

    sprite.set_think("hmm");
    assert_eq!((sprite.say.as_str(), sprite.think.as_str()), ("", "hmm"));

    sprite.set_think("");
    assert_eq!((sprite.say.as_str(), sprite.think.as_str()), ("", ""));
  }

  #[test]
  fn test_empty_say_leaves_think_alone() {
    let mut sprite = sprite();
    sprite.set_think("hmm");
    sprite.set_say("");
    assert_eq!(sprite.think, "hmm");
  }

  #[test]
  fn test_move_keeps_home_pose() {
    let mut sprite = sprite();
    sprite.move_to(40., -10.);
    assert_eq!(sprite.pose, Pose::new(40., -10., 90.));
    assert_eq!(sprite.initial, Pose::default());

    sprite.set_say("x");
    sprite.reset();
    assert_eq!(sprite.pose, Pose::default());
    assert!(sprite.say.is_empty());
  }

  #[test]
  fn test_reorder_moves_source_into_target_slot() {
    let mut sprite = sprite();
    let a = sprite.add_block(Opcode::MotionMoveSteps);
    let b = sprite.add_block(Opcode::MotionTurnLeft);
    let c = sprite.add_block(Opcode::MotionGotoXy);

    assert!(sprite.reorder_block(a, c));
    assert_eq!(order(&sprite), vec![b, c, a]);

    assert!(sprite.reorder_block(a, b));
    assert_eq!(order(&sprite), vec![a, b, c]);
  }

  #[test]
  fn test_reorder_with_bad_ids_is_a_no_op() {
    let mut sprite = sprite();
    let a = sprite.add_block(Opcode::MotionMoveSteps);
    let b = sprite.add_block(Opcode::MotionTurnLeft);
    let stray = create_block(Opcode::MotionGotoXy).id;

    assert!(!sprite.reorder_block(a, a));
    assert!(!sprite.reorder_block(stray, b));
    assert!(!sprite.reorder_block(a, stray));
    assert_eq!(order(&sprite), vec![a, b]);
  }

  #[test]
  fn test_remove_and_update_unknown_blocks() {
    let mut sprite = sprite();
    let a = sprite.add_block(Opcode::MotionMoveSteps);
    let stray = create_block(Opcode::MotionGotoXy).id;

    assert!(!sprite.remove_block(stray));
    assert!(!sprite.update_block_args(stray, Args::new()));

    let update = Args::from([("steps".to_string(), Value::from("abc"))]);
    assert!(sprite.update_block_args(a, update));
    assert_eq!(sprite.blocks[0].number("steps"), 0.);

    assert!(sprite.remove_block(a));
    assert!(sprite.blocks.is_empty());
  }
}
