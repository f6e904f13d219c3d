use std::time::Duration;

use derivative::Derivative;
use log::{debug, trace};

use crate::block::{Block, Opcode};
use crate::project::Config;
use crate::scheduler::RunToken;
use crate::sprite::{Pose, Sprite, SpriteId};

/// Receives everything a running script makes visible.
pub trait ScriptSink: Send {
  fn pose(&mut self, pose: Pose);
  fn say(&mut self, text: &str);
  fn think(&mut self, text: &str);
}

/// What an interpreter runs: the pose and block list a sprite had when the
/// run started. Later edits to the sprite do not reach it.
#[derive(Debug, Clone)]
pub struct Script {
  pub sprite: SpriteId,
  pub pose: Pose,
  pub blocks: Vec<Block>,
}

impl Script {
  pub fn snapshot(sprite: &Sprite) -> Self {
    Script {
      sprite: sprite.id.clone(),
      pose: sprite.pose,
      blocks: sprite.blocks.clone(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Finished,
  Cancelled,
}

enum Step {
  Next,
  Repeat,
  Stale,
}

enum Flow {
  Done,
  Repeat(usize),
  Stale,
}

pub async fn run<S: ScriptSink>(script: Script, token: RunToken, config: Config, sink: S) -> Outcome {
  debug!(
    "running {} ({} blocks) under epoch {}",
    script.sprite,
    script.blocks.len(),
    token.epoch()
  );
  let outcome = Interpreter::new(script.pose, token, config, sink)
    .run(&script.blocks)
    .await;
  debug!("{} {:?}", script.sprite, outcome);
  outcome
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Interpreter<S> {
  pose: Pose,
  token: RunToken,
  config: Config,
  waited: Duration,
  #[derivative(Debug = "ignore")]
  sink: S,
}

impl<S: ScriptSink> Interpreter<S> {
  pub fn new(pose: Pose, token: RunToken, config: Config, sink: S) -> Self {
    Interpreter {
      pose,
      token,
      config,
      waited: Duration::ZERO,
      sink,
    }
  }

  pub async fn run(mut self, blocks: &[Block]) -> Outcome {
    match self.run_sequence(blocks).await {
      Flow::Done => Outcome::Finished,
      Flow::Stale => Outcome::Cancelled,
      Flow::Repeat(index) => {
        self.repeat(&blocks[..index]).await;
        Outcome::Cancelled
      }
    }
  }

  async fn run_sequence(&mut self, blocks: &[Block]) -> Flow {
    for (index, block) in blocks.iter().enumerate() {
      if !self.token.is_current() {
        return Flow::Stale;
      }
      match self.execute_block(block).await {
        Step::Next => {}
        Step::Repeat => return Flow::Repeat(index),
        Step::Stale => return Flow::Stale,
      }
    }
    Flow::Done
  }

  /// Runs `prefix` over and over until the run goes stale. Never returns to
  /// the blocks after the repeat.
  async fn repeat(&mut self, prefix: &[Block]) {
    if prefix.is_empty() {
      self.token.stale().await;
      return;
    }
    loop {
      let waited = self.waited;
      if let Flow::Stale = self.run_sequence(prefix).await {
        return;
      }
      // An iteration that never suspended would spin; hold it to one frame.
      if self.waited == waited && !self.pause(self.config.frame_interval()).await {
        return;
      }
    }
  }

  async fn execute_block(&mut self, block: &Block) -> Step {
    match &block.opcode {
      Opcode::EventWhenFlagClicked | Opcode::EventWhenSpriteClicked => Step::Next,
      Opcode::MotionMoveSteps => {
        let frames = self.config.move_frames.max(1);
        let radians = (self.pose.direction - 90.).to_radians();
        let distance = block.number("steps") / f64::from(frames);
        let (dx, dy) = (distance * radians.cos(), distance * radians.sin());
        self
          .animate(frames, |pose| {
            pose.x += dx;
            pose.y += dy;
          })
          .await
      }
      Opcode::MotionTurnRight => self.turn(block.number("degrees")).await,
      Opcode::MotionTurnLeft => self.turn(-block.number("degrees")).await,
      Opcode::MotionGotoXy => {
        self.pose.x = block.number("x");
        self.pose.y = block.number("y");
        self.sink.pose(self.pose);
        Step::Next
      }
      Opcode::LooksSayForSecs => {
        let message = block.text("message");
        self.sink.say(&message);
        if !self.pause(hold_duration(block.number("seconds"))).await {
          return Step::Stale;
        }
        self.sink.say("");
        Step::Next
      }
      Opcode::LooksThinkForSecs => {
        let message = block.text("message");
        self.sink.think(&message);
        if !self.pause(hold_duration(block.number("seconds"))).await {
          return Step::Stale;
        }
        self.sink.think("");
        Step::Next
      }
      Opcode::ControlRepeatAnimation => Step::Repeat,
      Opcode::Unknown(tag) => {
        trace!("skipping unknown block {tag}");
        Step::Next
      }
    }
  }

  async fn turn(&mut self, degrees: f64) -> Step {
    let frames = self.config.turn_frames.max(1);
    let delta = degrees / f64::from(frames);
    self.animate(frames, |pose| pose.direction += delta).await
  }

  async fn animate<F: FnMut(&mut Pose)>(&mut self, frames: u32, mut frame: F) -> Step {
    for _ in 0..frames {
      if !self.token.is_current() {
        return Step::Stale;
      }
      frame(&mut self.pose);
      self.sink.pose(self.pose);
      if !self.pause(self.config.frame_interval()).await {
        return Step::Stale;
      }
    }
    Step::Next
  }

  async fn pause(&mut self, duration: Duration) -> bool {
    self.waited = self.waited.saturating_add(duration);
    self.token.sleep(duration).await
  }
}

fn hold_duration(seconds: f64) -> Duration {
  Duration::try_from_secs_f64(seconds.max(0.)).unwrap_or(Duration::MAX)
}
