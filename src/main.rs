use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use blockstage::{Project, Result, Sprite, Stage, StageEvent};
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

/// Plays a block project without a display, logging every sprite update.
#[derive(Debug, Parser)]
#[command(name = "blockstage", version)]
struct Cli {
  /// Project file. An empty stage is used when omitted.
  project: Option<PathBuf>,

  /// How long to play before stopping.
  #[arg(long, default_value_t = 5.)]
  seconds: f64,
}

fn describe(sprite: &Sprite) -> String {
  let mut line = format!(
    "{} at ({:.1}, {:.1}) facing {:.1}",
    sprite.name, sprite.pose.x, sprite.pose.y, sprite.pose.direction
  );
  if !sprite.say.is_empty() {
    line.push_str(&format!(" says {:?}", sprite.say));
  } else if !sprite.think.is_empty() {
    line.push_str(&format!(" thinks {:?}", sprite.think));
  }
  line
}

async fn play(cli: Cli) -> Result<()> {
  let project = match &cli.project {
    Some(path) => Project::load(path)?,
    None => Project::default(),
  };
  let stage = Stage::from_project(project)?;
  let mut events = stage.subscribe();

  stage.play();
  let length = Duration::try_from_secs_f64(cli.seconds.max(0.)).unwrap_or(Duration::MAX);
  let deadline = tokio::time::sleep(length);
  tokio::pin!(deadline);
  loop {
    tokio::select! {
      _ = &mut deadline => break,
      event = events.recv() => match event {
        Ok(StageEvent::SpriteChanged(sprite)) => info!("{}", describe(&sprite)),
        Ok(event) => info!("{event:?}"),
        Err(RecvError::Lagged(skipped)) => warn!("skipped {skipped} updates"),
        Err(RecvError::Closed) => break,
      },
    }
  }
  stage.stop();

  for sprite in stage.sprites() {
    println!("{}", serde_json::to_string(&sprite)?);
  }
  Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
  pretty_env_logger::init();
  match play(Cli::parse()).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      error!("{err}");
      ExitCode::FAILURE
    }
  }
}
