pub mod block;
pub mod error;
pub mod project;
pub mod scheduler;
pub mod script;
pub mod sprite;
pub mod stage;

pub use block::{create_block, Args, Block, BlockId, Opcode, Value};
pub use error::{Error, Result};
pub use project::{Config, Project};
pub use scheduler::{Epoch, RunToken, Scheduler};
pub use script::{Outcome, Script, ScriptSink};
pub use sprite::{Pose, Sprite, SpriteId};
pub use stage::{Stage, StageEvent};
