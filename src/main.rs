mod app;
mod config;
mod constants;
mod input;
mod model;
mod page;
mod scanner;
mod settings;
mod storage;
mod store;
mod transfer;
mod ui;
mod viewer;
mod youtube;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use settings::{SettingsPanel, Status, default_export_dir};
use storage::{FileStorage, Storage};
use store::PlaylistStore;
use viewer::{format_relative, partition};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None, args_conflicts_with_subcommands = true)]
struct Args {
  /// Directory holding the playlist storage and logs (overrides prefs.toml)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// HTML page to watch for YouTube links
  page: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the playlist, unseen first
  List,
  /// Export the playlist as JSON (a directory gets a dated file name)
  Export {
    /// Target file or directory (default: download directory)
    path: Option<PathBuf>,
  },
  /// Merge a previously exported playlist into the current one
  Import {
    path: PathBuf,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
  },
  /// Delete every video from the playlist
  Clear {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
  },
}

// --- Logging ---

/// Log to a daily file in `dir`. The guard must live until exit.
fn init_logging(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
  let file_appender = tracing_appender::rolling::daily(dir, "ytlater.log");
  let (writer, guard) = tracing_appender::non_blocking(file_appender);
  let filter = EnvFilter::try_from_env("YTLATER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_writer(writer)
    .with_ansi(false)
    .with_env_filter(filter)
    .try_init()
    .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;
  Ok(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let (mut config, config_err) = Config::load();
  if let Some(dir) = args.data_dir {
    config.data_dir = Some(dir);
  }
  let data_dir = config.data_dir();
  let _guard = init_logging(&data_dir)?;
  info!(data_dir = %data_dir.display(), "ytlater starting");
  if let Some(e) = config_err {
    warn!(err = %e, "config: prefs.toml is malformed, using defaults");
  }

  let file_storage = FileStorage::in_dir(&data_dir);
  info!(path = %file_storage.path().display(), "storage: using file");
  let storage: Arc<dyn Storage> = Arc::new(file_storage);

  match args.command {
    Some(command) => run_headless(command, PlaylistStore::new(storage)),
    None => {
      let page = args.page.or_else(|| config.page_file.clone());
      let default_hook = std::panic::take_hook();
      std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        default_hook(info);
      }));

      let mut terminal = ratatui::init();
      let result = run(&mut terminal, App::new(&config, storage, page)).await;
      ratatui::restore();
      result
    }
  }
}

async fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  app.start_watching();

  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.stop_watching();
  info!("ytlater exiting");
  Ok(())
}

// --- Headless commands ---

fn confirm(prompt: &str) -> Result<bool> {
  print!("{} [y/N] ", prompt);
  std::io::stdout().flush()?;
  let mut answer = String::new();
  std::io::stdin().lock().read_line(&mut answer).context("Failed to read answer")?;
  Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn report(status: Status) -> Result<()> {
  match status {
    Status::Success(message) => {
      println!("{}", message);
      Ok(())
    }
    Status::Error(message) => anyhow::bail!(message),
  }
}

fn run_headless(command: Command, store: PlaylistStore) -> Result<()> {
  let panel = SettingsPanel::new(store.clone());
  match command {
    Command::List => {
      let (unseen, seen) = partition(store.get_playlist());
      let now = Utc::now();
      for (label, videos) in [("Unseen", &unseen), ("Seen", &seen)] {
        println!("{} ({})", label, videos.len());
        for video in videos.iter() {
          let when = video.seen_at.unwrap_or(video.added_at);
          println!("  {}  {} · {} · {}", video.video_id, video.title, video.channel, format_relative(when, now));
        }
      }
      Ok(())
    }
    Command::Export { path } => report(panel.export(&path.unwrap_or_else(default_export_dir))),
    Command::Import { path, yes } => {
      let pending = match panel.prepare_import(&path) {
        Ok(pending) => pending,
        Err(status) => return report(status),
      };
      if !yes && !confirm(&pending.prompt())? {
        println!("Import cancelled");
        return Ok(());
      }
      report(panel.apply_import(pending))
    }
    Command::Clear { yes } => {
      let message = match panel.prepare_clear() {
        Ok(message) => message,
        Err(status) => return report(status),
      };
      if !yes && !confirm(&message)? {
        println!("Clear cancelled");
        return Ok(());
      }
      report(panel.apply_clear())
    }
  }
}
