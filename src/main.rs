use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use slideshow_player::authoring::ShowDraft;
use slideshow_player::config::Settings;
use slideshow_player::show_model::{EffectKind, ShowConfig, SlideEffect, legacy, xml};
use slideshow_player::tasks::viewer::{Viewer, ViewerOptions, load_icon};
use slideshow_player::{Error, PlaybackController, PlaybackOptions, SlideDeck};

#[derive(Debug, Parser)]
#[command(name = "slideshow", version, about = "Play and author slide shows")]
struct Cli {
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a show in a window
    Play(PlayArgs),
    /// Build a show from a folder of images
    Create(CreateArgs),
    /// Re-save a legacy show file as XML
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
struct PlayArgs {
    /// Show file (.xml or legacy line format)
    #[arg(value_name = "SHOW")]
    show: PathBuf,
    /// Player settings YAML
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
    /// Window icon image
    #[arg(long, value_name = "PNG")]
    icon: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Folder holding the slide images
    #[arg(value_name = "FOLDER")]
    folder: PathBuf,
    /// Where to save the show (".xml" is appended if missing)
    #[arg(long, value_name = "FILE")]
    out: PathBuf,
    /// Advance automatically every N seconds
    #[arg(long, value_name = "SECONDS", conflicts_with = "manual")]
    interval: Option<NonZeroU32>,
    /// Advance only on user navigation (the default)
    #[arg(long)]
    manual: bool,
    /// Effect used to enter every slide
    #[arg(long, value_name = "KIND", default_value = "none")]
    effect: EffectKind,
    /// Effect duration in seconds
    #[arg(long, value_name = "N", default_value_t = NonZeroU32::MIN)]
    effect_seconds: NonZeroU32,
    /// Audio track to play behind the show (repeatable, played in order)
    #[arg(long, value_name = "FILE")]
    audio: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[arg(value_name = "LEGACY")]
    input: PathBuf,
    #[arg(value_name = "OUT")]
    output: PathBuf,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // RUST_LOG controls the base level; -v/-vv raise this crate only
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let level = match verbosity {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    if let Some(level) = level {
        filter = filter.add_directive(format!("slideshow_player={level}").parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { verbose, command } = Cli::parse();
    init_tracing(verbose)?;

    let outcome = match command {
        Command::Play(args) => play(args).await,
        Command::Create(args) => create(args),
        Command::Convert(args) => convert(args),
    };
    if let Err(err) = &outcome {
        tracing::error!("{err:#}");
    }
    outcome
}

async fn play(args: PlayArgs) -> Result<()> {
    let settings = match &args.settings {
        Some(path) => Settings::from_yaml_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    }
    .validated()
    .context("invalid settings values")?;

    let show = ShowConfig::load(&args.show)
        .with_context(|| format!("failed to load show from {}", args.show.display()))?;
    let icon = args.icon.as_deref().map(load_icon).transpose()?;

    // Decode everything before a window exists so a broken or empty show
    // fails on the terminal.
    let deck = SlideDeck::load_async(&show, settings.canvas(), settings.max_concurrent_decodes)
        .await
        .with_context(|| format!("cannot play {}", args.show.display()))?;

    let viewer = Viewer::new()?;
    let canvas = settings.canvas();
    let mut controller = PlaybackController::start_with_deck(
        show,
        Arc::new(deck),
        viewer.surface(),
        PlaybackOptions {
            settings,
            audio_device: None,
        },
    )?;

    let shutdown = viewer.shutdown_handle();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {err}");
            return;
        }
        tracing::info!("ctrl-c received; initiating shutdown");
        shutdown.request_shutdown();
    });

    let title = args
        .show
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Slideshow".to_string());
    // Runs the window on the main thread; returns once it closes.
    let viewed = viewer.run(
        &mut controller,
        ViewerOptions {
            title,
            canvas,
            icon,
        },
    );
    controller.stop().await.context("playback did not stop cleanly")?;
    viewed
}

fn create(args: CreateArgs) -> Result<()> {
    let effect = SlideEffect::new(args.effect, args.effect_seconds);
    let mut draft = ShowDraft::from_folder(&args.folder, effect)?;
    for track in args.audio {
        draft.add_audio(track);
    }
    match args.interval {
        Some(interval) => draft.automatic(interval),
        None => draft.manual(),
    };

    let (show, excluded) = draft.finish();
    for slide in &excluded {
        println!("excluded {}: {}", slide.path.display(), slide.reason);
    }
    if show.is_empty() {
        bail!("{}: {}", args.folder.display(), Error::EmptyShow);
    }
    let saved = xml::write_file(&args.out, &show)?;
    println!(
        "saved {} slides and {} tracks to {}",
        show.slide_count(),
        show.audio_tracks().len(),
        saved.display()
    );
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let show = legacy::read_file(&args.input)
        .with_context(|| format!("failed to read legacy show {}", args.input.display()))?;
    let saved = xml::write_file(&args.output, &show)?;
    tracing::info!(slides = show.slide_count(), path = %saved.display(), "show converted");
    println!("saved {}", saved.display());
    Ok(())
}
