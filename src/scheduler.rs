use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// Generation number of a play/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
  pub fn value(self) -> u64 {
    self.0
  }
}

impl fmt::Display for Epoch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Owns the run epoch. Every play and every stop moves it forward, which
/// invalidates whatever was running under the previous value.
#[derive(Debug)]
pub struct Scheduler {
  epoch: watch::Sender<Epoch>,
}

impl Scheduler {
  pub fn new() -> Self {
    let (epoch, _) = watch::channel(Epoch::default());
    Scheduler { epoch }
  }

  pub fn current(&self) -> Epoch {
    *self.epoch.borrow()
  }

  pub fn start_run(&self) -> Epoch {
    self.bump()
  }

  pub fn stop_run(&self) -> Epoch {
    self.bump()
  }

  fn bump(&self) -> Epoch {
    self.epoch.send_modify(|epoch| epoch.0 += 1);
    self.current()
  }

  pub fn token(&self, epoch: Epoch) -> RunToken {
    RunToken {
      epoch,
      current: self.epoch.subscribe(),
    }
  }
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

/// The captured run id of one interpreter, plus a view of the live epoch.
#[derive(Debug, Clone)]
pub struct RunToken {
  epoch: Epoch,
  current: watch::Receiver<Epoch>,
}

impl RunToken {
  pub fn epoch(&self) -> Epoch {
    self.epoch
  }

  pub fn is_current(&self) -> bool {
    *self.current.borrow() == self.epoch
  }

  /// Waits for `duration`. Returns early with `false` as soon as the epoch
  /// moves on; `true` means the run is still valid afterwards.
  pub async fn sleep(&mut self, duration: Duration) -> bool {
    if !self.is_current() {
      return false;
    }
    let epoch = self.epoch;
    let stale = tokio::select! {
      _ = tokio::time::sleep(duration) => false,
      _ = self.current.wait_for(|current| *current != epoch) => true,
    };
    !stale && self.is_current()
  }

  /// Resolves once this run is no longer current.
  pub async fn stale(&mut self) {
    let epoch = self.epoch;
    // A dropped scheduler also ends the run.
    let _ = self.current.wait_for(|current| *current != epoch).await;
  }
}
