use std::sync::Arc;
use std::time::Duration;

use show_model::ShowConfig;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{CpalDevice, OutputDevice};
use crate::config::Settings;
use crate::display::DisplaySurface;
use crate::error::{Error, Result};
use crate::events::{
    AudioEvent, Direction, EVENT_BACKLOG, PlaybackEvent, PlaybackState, SchedulerCommand,
};
use crate::tasks::audio::AudioTrackPlayer;
use crate::tasks::loader::SlideDeck;
use crate::tasks::scheduler::{AdvanceScheduler, SchedulerOptions, SchedulerState};

/// Everything besides the show that playback needs.
#[derive(Clone, Default)]
pub struct PlaybackOptions {
    pub settings: Settings,
    /// Output used for the soundtrack. Defaults to the system output device.
    pub audio_device: Option<Arc<dyn OutputDevice>>,
}

/// Runs one show: the scheduler task, the audio thread, and the caller's
/// commands to both.
pub struct PlaybackController {
    manual_advance: bool,
    paused: bool,
    stopped: bool,
    grace: Duration,
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    state: watch::Receiver<SchedulerState>,
    events: broadcast::Sender<PlaybackEvent>,
    audio: Option<AudioTrackPlayer>,
    cancel: CancellationToken,
    scheduler: Option<JoinHandle<Result<()>>>,
}

impl PlaybackController {
    /// Decodes the show's slides off the runtime workers, then starts
    /// playback.
    pub async fn start(
        config: ShowConfig,
        surface: impl DisplaySurface,
        options: PlaybackOptions,
    ) -> Result<Self> {
        if config.is_empty() {
            return Err(Error::EmptyShow);
        }
        let deck = SlideDeck::load_async(
            &config,
            options.settings.canvas(),
            options.settings.max_concurrent_decodes,
        )
        .await?;
        Self::start_with_deck(config, Arc::new(deck), surface, options)
    }

    /// Starts playback over slides that are already decoded.
    pub fn start_with_deck(
        config: ShowConfig,
        deck: Arc<SlideDeck>,
        surface: impl DisplaySurface,
        options: PlaybackOptions,
    ) -> Result<Self> {
        if config.is_empty() {
            return Err(Error::EmptyShow);
        }
        let runtime = Handle::try_current()
            .map_err(|err| Error::ConcurrencyFault(format!("playback needs a tokio runtime: {err}")))?;
        let PlaybackOptions {
            settings,
            audio_device,
        } = options;

        let (events_tx, _) = broadcast::channel(EVENT_BACKLOG);
        let (scheduler, handle) = AdvanceScheduler::new(
            deck,
            config.effects().collect(),
            SchedulerOptions {
                auto_advance: !config.manual_advance(),
                interval: config.interval(),
                animation: settings.animation.clone(),
            },
            Box::new(surface),
            events_tx.clone(),
        )?;

        let audio = if config.audio_tracks().is_empty() {
            None
        } else {
            let device = audio_device
                .unwrap_or_else(|| Arc::new(CpalDevice::new(settings.audio.write_timeout)));
            let mut player = AudioTrackPlayer::new(device, settings.audio.clone());
            player.start(config.audio_tracks().to_vec(), settings.shutdown_grace)?;
            Some(player)
        };

        let cancel = CancellationToken::new();
        let task = runtime.spawn(scheduler.run(cancel.child_token()));
        info!(
            slides = config.slide_count(),
            tracks = config.audio_tracks().len(),
            manual = config.manual_advance(),
            interval = config.interval_secs(),
            "show started"
        );

        Ok(Self {
            manual_advance: config.manual_advance(),
            paused: false,
            stopped: false,
            grace: settings.shutdown_grace,
            commands: handle.commands,
            state: handle.state,
            events: events_tx,
            audio,
            cancel,
            scheduler: Some(task),
        })
    }

    pub fn next(&self) -> Result<()> {
        self.send(SchedulerCommand::Navigate(Direction::Forward))
    }

    pub fn previous(&self) -> Result<()> {
        self.send(SchedulerCommand::Navigate(Direction::Backward))
    }

    /// Pauses or resumes the auto-advance timer together with the audio.
    /// Returns whether the show is playing afterwards.
    pub fn toggle_play_pause(&mut self) -> Result<bool> {
        if self.manual_advance {
            return Err(Error::ManualAdvance);
        }
        let paused = !self.paused;
        self.send(SchedulerCommand::SetAutoAdvance(!paused))?;
        self.paused = paused;
        if let Some(audio) = &self.audio {
            if paused {
                audio.pause();
            } else {
                audio.resume();
            }
        }
        info!(playing = !paused, "play/pause toggled");
        Ok(!paused)
    }

    /// New interval for auto-advance; the wait already in progress keeps its length.
    /// Only whole seconds of at least one are accepted.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval < Duration::from_secs(1) || interval.subsec_nanos() != 0 {
            return Err(Error::InvalidInterval(interval));
        }
        self.send(SchedulerCommand::SetInterval(interval))
    }

    pub fn state(&self) -> PlaybackState {
        let SchedulerState {
            current_index,
            mode,
        } = *self.state.borrow();
        PlaybackState {
            current_index,
            mode,
            is_audio_playing: self.audio.as_ref().is_some_and(AudioTrackPlayer::is_playing),
        }
    }

    /// Waits until the published state satisfies `f`.
    pub async fn wait_for_state(
        &mut self,
        mut f: impl FnMut(&PlaybackState) -> bool,
    ) -> Result<PlaybackState> {
        loop {
            let state = self.state();
            if f(&state) {
                return Ok(state);
            }
            self.state.changed().await.map_err(|_| Error::Stopped)?;
        }
    }

    /// Playback events from now on. A subscriber that falls more than
    /// [`EVENT_BACKLOG`] events behind loses the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn audio_events(&self) -> Option<crossbeam_channel::Receiver<AudioEvent>> {
        self.audio.as_ref().map(AudioTrackPlayer::events)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops the scheduler and the audio thread, waiting at most the
    /// configured grace period for each. Later calls do nothing.
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.cancel.cancel();

        let mut fault = None;
        if let Some(task) = self.scheduler.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(self.grace, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => {
                    warn!(error = %err, "scheduler ended with an error");
                    fault = Some(err);
                }
                Ok(Err(join)) => {
                    fault = Some(Error::ConcurrencyFault(format!(
                        "scheduler task failed: {join}"
                    )));
                }
                Err(_) => {
                    abort.abort();
                    fault = Some(Error::ConcurrencyFault(format!(
                        "scheduler did not stop within {}",
                        humantime::format_duration(self.grace)
                    )));
                }
            }
        }

        if let Some(mut audio) = self.audio.take() {
            let grace = self.grace;
            let stopped = tokio::task::spawn_blocking(move || audio.stop(grace))
                .await
                .map_err(|join| Error::ConcurrencyFault(format!("audio shutdown failed: {join}")))
                .and_then(|res| res);
            if let Err(err) = stopped {
                warn!(error = %err, "audio did not stop cleanly");
                fault.get_or_insert(err);
            }
        }

        info!("show stopped");
        fault.map_or(Ok(()), Err)
    }

    fn send(&self, command: SchedulerCommand) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        self.commands.send(command).map_err(|_| Error::Stopped)
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
