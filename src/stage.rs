use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::block::{Args, BlockId, Opcode};
use crate::error::{Error, Result};
use crate::project::{Config, Project, SpriteDef};
use crate::scheduler::{Epoch, RunToken, Scheduler};
use crate::script::{self, Script, ScriptSink};
use crate::sprite::{Pose, Sprite, SpriteId};

/// Published after every visible change so a renderer can follow along.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
  SpriteChanged(Sprite),
  Played(Epoch),
  Stopped(Epoch),
  Swapped(SpriteId, SpriteId),
}

#[derive(Debug, Default)]
struct Board {
  sprites: Vec<Sprite>,
  selected: Option<SpriteId>,
  playing: bool,
  swapped: HashSet<(SpriteId, SpriteId)>,
}

impl Board {
  fn sprite_mut(&mut self, id: &SpriteId) -> Option<&mut Sprite> {
    self.sprites.iter_mut().find(|sprite| &sprite.id == id)
  }
}

#[derive(Debug)]
struct Shared {
  config: Config,
  scheduler: Scheduler,
  board: Mutex<Board>,
  events: broadcast::Sender<StageEvent>,
  runtime: Handle,
}

/// The set of sprites plus the play/stop machinery that animates them.
///
/// Cloning is cheap and every clone drives the same stage.
#[derive(Debug, Clone)]
pub struct Stage {
  shared: Arc<Shared>,
}

impl Stage {
  /// Creates a stage holding one sprite. Must be called inside a tokio
  /// runtime, which is where scripts will run.
  pub fn new(config: Config) -> Result<Stage> {
    let stage = Stage::empty(config)?;
    stage.add_sprite();
    Ok(stage)
  }

  pub fn from_project(project: Project) -> Result<Stage> {
    if project.sprites.is_empty() {
      return Stage::new(project.config);
    }
    let stage = Stage::empty(project.config)?;
    for def in &project.sprites {
      stage.add_sprite_def(def);
    }
    Ok(stage)
  }

  fn empty(config: Config) -> Result<Stage> {
    let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
    let (events, _) = broadcast::channel(config.event_capacity.max(1));
    Ok(Stage {
      shared: Arc::new(Shared {
        config,
        scheduler: Scheduler::new(),
        board: Mutex::new(Board::default()),
        events,
        runtime,
      }),
    })
  }

  pub fn config(&self) -> &Config {
    &self.shared.config
  }

  pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
    self.shared.events.subscribe()
  }

  fn board(&self) -> MutexGuard<'_, Board> {
    self.shared.board.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, event: StageEvent) {
    // Nobody listening is fine.
    let _ = self.shared.events.send(event);
  }

  /// Adds the next numbered sprite, placed to the right of the previous
  /// ones, and selects it.
  pub fn add_sprite(&self) -> Sprite {
    let mut board = self.board();
    let index = board.sprites.len() + 1;
    let initial = Pose::new(self.shared.config.sprite_spacing * (index - 1) as f64, 0., 90.);
    let sprite = Sprite::new(
      SpriteId::new(format!("sprite-{index}")),
      format!("Sprite {index}"),
      initial,
    );
    self.insert(&mut board, sprite)
  }

  fn add_sprite_def(&self, def: &SpriteDef) -> Sprite {
    let mut board = self.board();
    let index = board.sprites.len() + 1;
    let initial = Pose::new(
      def
        .x
        .unwrap_or(self.shared.config.sprite_spacing * (index - 1) as f64),
      def.y.unwrap_or(0.),
      def.direction,
    );
    let mut sprite = Sprite::new(
      SpriteId::new(format!("sprite-{index}")),
      def.name.clone().unwrap_or_else(|| format!("Sprite {index}")),
      initial,
    );
    for block in &def.blocks {
      let id = sprite.add_block(block.opcode.clone());
      sprite.update_block_args(id, block.args.clone());
    }
    self.insert(&mut board, sprite)
  }

  fn insert(&self, board: &mut Board, sprite: Sprite) -> Sprite {
    debug!("added {} at ({}, {})", sprite.id, sprite.pose.x, sprite.pose.y);
    board.selected = Some(sprite.id.clone());
    board.sprites.push(sprite.clone());
    self.publish(StageEvent::SpriteChanged(sprite.clone()));
    sprite
  }

  pub fn select_sprite(&self, id: &SpriteId) -> bool {
    let mut board = self.board();
    if board.sprites.iter().any(|sprite| &sprite.id == id) {
      board.selected = Some(id.clone());
      true
    } else {
      debug!("cannot select unknown sprite {id}");
      false
    }
  }

  pub fn selected_sprite(&self) -> Option<SpriteId> {
    self.board().selected.clone()
  }

  pub fn sprites(&self) -> Vec<Sprite> {
    self.board().sprites.clone()
  }

  pub fn sprite(&self, id: &SpriteId) -> Option<Sprite> {
    self.board().sprites.iter().find(|sprite| &sprite.id == id).cloned()
  }

  /// Applies `edit` to one sprite's persisted state. Unknown sprites and
  /// edits reporting no change are silently ignored.
  fn edit<T, F>(&self, id: &SpriteId, what: &str, edit: F) -> Option<T>
  where
    F: FnOnce(&mut Sprite) -> Option<T>,
  {
    let mut board = self.board();
    let Some(sprite) = board.sprite_mut(id) else {
      debug!("{what}: no sprite {id}");
      return None;
    };
    match edit(sprite) {
      Some(result) => {
        let changed = sprite.clone();
        self.publish(StageEvent::SpriteChanged(changed));
        Some(result)
      }
      None => {
        debug!("{what} on {id} changed nothing");
        None
      }
    }
  }

  pub fn add_block(&self, sprite: &SpriteId, opcode: Opcode) -> Option<BlockId> {
    self.edit(sprite, "add block", |sprite| Some(sprite.add_block(opcode)))
  }

  pub fn add_block_to_selected(&self, opcode: Opcode) -> Option<BlockId> {
    let selected = self.selected_sprite()?;
    self.add_block(&selected, opcode)
  }

  pub fn remove_block(&self, sprite: &SpriteId, block: BlockId) -> bool {
    self
      .edit(sprite, "remove block", |sprite| sprite.remove_block(block).then_some(()))
      .is_some()
  }

  pub fn reorder_block(&self, sprite: &SpriteId, source: BlockId, target: BlockId) -> bool {
    self
      .edit(sprite, "reorder block", |sprite| {
        sprite.reorder_block(source, target).then_some(())
      })
      .is_some()
  }

  pub fn update_block_args(&self, sprite: &SpriteId, block: BlockId, update: Args) -> bool {
    self
      .edit(sprite, "update block args", |sprite| {
        sprite.update_block_args(block, update).then_some(())
      })
      .is_some()
  }

  /// Drags a sprite to a new spot without touching its home pose.
  pub fn move_sprite(&self, sprite: &SpriteId, x: f64, y: f64) -> bool {
    self
      .edit(sprite, "move sprite", |sprite| {
        sprite.move_to(x, y);
        Some(())
      })
      .is_some()
  }

  pub fn is_playing(&self) -> bool {
    self.board().playing
  }

  pub fn epoch(&self) -> Epoch {
    self.shared.scheduler.current()
  }

  /// Sends every sprite home and starts one script per sprite that has
  /// blocks. Does nothing while already playing.
  pub fn play(&self) {
    let (epoch, scripts) = {
      let mut board = self.board();
      if board.playing {
        debug!("play ignored, already playing");
        return;
      }
      let epoch = self.shared.scheduler.start_run();
      board.playing = true;
      board.swapped.clear();
      self.publish(StageEvent::Played(epoch));
      for sprite in &mut board.sprites {
        sprite.reset();
        self.publish(StageEvent::SpriteChanged(sprite.clone()));
      }
      (epoch, snapshot(&board))
    };
    info!("play, epoch {epoch}, {} scripts", scripts.len());
    self.launch(epoch, scripts);
  }

  /// Invalidates the running scripts and clears all speech. Safe to call
  /// at any time, including when nothing is playing.
  pub fn stop(&self) {
    let mut board = self.board();
    let epoch = self.shared.scheduler.stop_run();
    board.playing = false;
    self.publish(StageEvent::Stopped(epoch));
    for sprite in &mut board.sprites {
      sprite.clear_speech();
      self.publish(StageEvent::SpriteChanged(sprite.clone()));
    }
    info!("stop, epoch {epoch}");
  }

  fn launch(&self, epoch: Epoch, scripts: Vec<Script>) {
    for script in scripts {
      let token = self.shared.scheduler.token(epoch);
      let sink = StageSink {
        sprite: script.sprite.clone(),
        token: token.clone(),
        stage: self.clone(),
      };
      self
        .shared
        .runtime
        .spawn(script::run(script, token, self.shared.config, sink));
    }
  }

  /// Applies one script update if its run is still current. The epoch only
  /// moves under the board lock, so a stale run can never land an update.
  fn apply<F: FnOnce(&mut Sprite)>(&self, id: &SpriteId, token: &RunToken, update: F) -> bool {
    let mut board = self.board();
    if !token.is_current() {
      return false;
    }
    let Some(sprite) = board.sprite_mut(id) else {
      return false;
    };
    update(sprite);
    let changed = sprite.clone();
    self.publish(StageEvent::SpriteChanged(changed));
    true
  }

  /// Swaps scripts with the first sprite within `distance` of `mover`, then
  /// restarts the run from where everyone stands. A pair swaps at most once
  /// per play.
  fn swap_if_close(&self, mover: &SpriteId, token: &RunToken, distance: f64) {
    let (epoch, scripts) = {
      let mut guard = self.board();
      let board = &mut *guard;
      if !token.is_current() {
        return;
      }
      let Some(position) = board.sprites.iter().position(|sprite| &sprite.id == mover) else {
        return;
      };
      let pose = board.sprites[position].pose;
      let partner = board.sprites.iter().enumerate().position(|(index, other)| {
        index != position
          && pose.distance_to(&other.pose) < distance
          && !board.swapped.contains(&pair(mover, &other.id))
      });
      let Some(partner) = partner else {
        return;
      };

      let key = pair(mover, &board.sprites[partner].id);
      board.swapped.insert(key.clone());
      let blocks = std::mem::take(&mut board.sprites[position].blocks);
      board.sprites[position].blocks = std::mem::replace(&mut board.sprites[partner].blocks, blocks);

      let epoch = self.shared.scheduler.start_run();
      info!("{} and {} swapped scripts, epoch {epoch}", key.0, key.1);
      self.publish(StageEvent::Swapped(key.0, key.1));
      for index in [position, partner] {
        self.publish(StageEvent::SpriteChanged(board.sprites[index].clone()));
      }
      (epoch, snapshot(board))
    };
    self.launch(epoch, scripts);
  }
}

fn snapshot(board: &Board) -> Vec<Script> {
  board
    .sprites
    .iter()
    .filter(|sprite| !sprite.blocks.is_empty())
    .map(Script::snapshot)
    .collect()
}

fn pair(a: &SpriteId, b: &SpriteId) -> (SpriteId, SpriteId) {
  if a <= b {
    (a.clone(), b.clone())
  } else {
    (b.clone(), a.clone())
  }
}

/// Feeds one interpreter's updates into the shared sprite record.
#[derive(Debug)]
struct StageSink {
  sprite: SpriteId,
  token: RunToken,
  stage: Stage,
}

impl ScriptSink for StageSink {
  fn pose(&mut self, pose: Pose) {
    let applied = self.stage.apply(&self.sprite, &self.token, |sprite| sprite.pose = pose);
    if let (true, Some(distance)) = (applied, self.stage.shared.config.swap_distance) {
      self.stage.swap_if_close(&self.sprite, &self.token, distance);
    }
  }

  fn say(&mut self, text: &str) {
    self.stage.apply(&self.sprite, &self.token, |sprite| sprite.set_say(text));
  }

  fn think(&mut self, text: &str) {
    self.stage.apply(&self.sprite, &self.token, |sprite| sprite.set_think(text));
  }
}
