use std::future;
use std::sync::Arc;
use std::time::Duration;

use show_model::{EffectKind, SlideEffect};
use tokio::select;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::buffer::SlideCursor;
use crate::config::AnimationOptions;
use crate::display::DisplaySurface;
use crate::error::{Error, Result};
use crate::events::{Direction, PlaybackEvent, PlaybackMode, SchedulerCommand};
use crate::processing::transition::{TransitionFrame, TransitionRenderer};
use crate::tasks::loader::SlideDeck;

/// Slide position and activity as published by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub current_index: usize,
    pub mode: PlaybackMode,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub auto_advance: bool,
    pub interval: Duration,
    pub animation: AnimationOptions,
}

/// Caller side of a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    pub commands: mpsc::UnboundedSender<SchedulerCommand>,
    pub state: watch::Receiver<SchedulerState>,
}

enum Wake {
    Elapsed,
    Navigate(Direction),
    Shutdown,
}

enum Outcome {
    Committed,
    Interrupted(Direction),
    Shutdown,
}

/// Owns the current slide index. Every change to it, timed or manual, is
/// applied here, one command at a time.
pub struct AdvanceScheduler {
    deck: Arc<SlideDeck>,
    effects: Vec<SlideEffect>,
    renderer: TransitionRenderer,
    surface: Box<dyn DisplaySurface>,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    state: watch::Sender<SchedulerState>,
    events: broadcast::Sender<PlaybackEvent>,
    cursor: SlideCursor,
    auto_advance: bool,
    interval: Duration,
    animation: AnimationOptions,
}

impl AdvanceScheduler {
    pub fn new(
        deck: Arc<SlideDeck>,
        effects: Vec<SlideEffect>,
        options: SchedulerOptions,
        surface: Box<dyn DisplaySurface>,
        events: broadcast::Sender<PlaybackEvent>,
    ) -> Result<(Self, SchedulerHandle)> {
        let cursor = SlideCursor::new(deck.len())?;
        if effects.len() != deck.len() {
            return Err(Error::DeckMismatch {
                slides: effects.len(),
                images: deck.len(),
            });
        }
        let (width, height) = deck.canvas();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState {
            current_index: 0,
            mode: PlaybackMode::Paused,
        });
        let scheduler = Self {
            deck,
            effects,
            renderer: TransitionRenderer::new(width, height),
            surface,
            commands: command_rx,
            state: state_tx,
            events,
            cursor,
            auto_advance: options.auto_advance,
            interval: options.interval,
            animation: options.animation,
        };
        let handle = SchedulerHandle {
            commands: command_tx,
            state: state_rx,
        };
        Ok((scheduler, handle))
    }

    /// Presents slide 0, then alternates between waiting and animating until
    /// `cancel` fires or every command sender is gone.
    #[instrument(name = "scheduler", skip_all, fields(slides = self.deck.len()))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let first = TransitionFrame::still(Arc::clone(self.deck.get(0)));
        self.surface.present(&first);
        self.commit(0);

        let mut pending: Option<Direction> = None;
        loop {
            let direction = match pending.take() {
                Some(direction) => direction,
                None => match self.wait(&cancel).await {
                    Wake::Elapsed => Direction::Forward,
                    Wake::Navigate(direction) => direction,
                    Wake::Shutdown => break,
                },
            };
            match self.animate(direction, &cancel).await? {
                Outcome::Committed => {}
                Outcome::Interrupted(direction) => pending = Some(direction),
                Outcome::Shutdown => break,
            }
        }
        info!(index = self.cursor.current(), "scheduler stopped");
        Ok(())
    }

    /// Rests on the current slide. In auto mode a full interval starts here;
    /// interval changes land on the next wait.
    async fn wait(&mut self, cancel: &CancellationToken) -> Wake {
        let mut deadline = self.auto_advance.then(|| Instant::now() + self.interval);
        self.set_mode(self.resting_mode());
        loop {
            let timer = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => future::pending().await,
                }
            };
            select! {
                biased;
                _ = cancel.cancelled() => return Wake::Shutdown,
                command = self.commands.recv() => match command {
                    None => return Wake::Shutdown,
                    Some(SchedulerCommand::Navigate(direction)) => return Wake::Navigate(direction),
                    Some(SchedulerCommand::SetAutoAdvance(on)) => {
                        if on != self.auto_advance {
                            self.auto_advance = on;
                            deadline = on.then(|| Instant::now() + self.interval);
                            self.set_mode(self.resting_mode());
                        }
                    }
                    Some(SchedulerCommand::SetInterval(interval)) => {
                        debug!(interval = %humantime::format_duration(interval), "interval updated");
                        self.interval = interval;
                    }
                },
                _ = timer => return Wake::Elapsed,
            }
        }
    }

    async fn animate(&mut self, direction: Direction, cancel: &CancellationToken) -> Result<Outcome> {
        let from = self.cursor.current();
        let to = self.cursor.peek(direction);
        let effect = self.effects[self.cursor.entry_effect(to)];
        let steps = match effect.kind() {
            EffectKind::None => 1,
            _ => self.animation.steps_for(effect.duration_secs()),
        };
        debug!(from, to, kind = ?effect.kind(), steps, "transition started");
        self.publish(PlaybackEvent::TransitionStarted { from, to, effect });
        self.set_mode(PlaybackMode::Transitioning);

        let previous = Arc::clone(self.deck.get(from));
        let next = Arc::clone(self.deck.get(to));
        for step in 1..steps {
            let ratio = f64::from(step) / f64::from(steps);
            let frame = self.renderer.render(&previous, &next, effect.kind(), ratio)?;
            self.surface.present(&frame);

            let tick = sleep(self.animation.tick);
            tokio::pin!(tick);
            loop {
                select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(Outcome::Shutdown),
                    command = self.commands.recv() => match command {
                        None => return Ok(Outcome::Shutdown),
                        Some(SchedulerCommand::Navigate(direction)) => {
                            debug!(from, to, step, "transition cancelled");
                            self.publish(PlaybackEvent::TransitionCancelled { from, to });
                            return Ok(Outcome::Interrupted(direction));
                        }
                        Some(SchedulerCommand::SetAutoAdvance(on)) => self.auto_advance = on,
                        Some(SchedulerCommand::SetInterval(interval)) => self.interval = interval,
                    },
                    _ = &mut tick => break,
                }
            }
        }

        // The last sample and the index change happen together, with no
        // suspension point between them.
        let frame = self.renderer.render(&previous, &next, effect.kind(), 1.0)?;
        self.surface.present(&frame);
        self.commit(to);
        Ok(Outcome::Committed)
    }

    fn commit(&mut self, index: usize) {
        self.cursor.commit(index);
        let mode = self.resting_mode();
        let previous = self.state.send_replace(SchedulerState {
            current_index: index,
            mode,
        });
        info!(index, "slide committed");
        self.publish(PlaybackEvent::SlideCommitted { index });
        if previous.mode != mode {
            self.publish(PlaybackEvent::ModeChanged(mode));
        }
    }

    // A send only fails when nobody is subscribed.
    fn publish(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    fn resting_mode(&self) -> PlaybackMode {
        if self.auto_advance {
            PlaybackMode::Playing
        } else {
            PlaybackMode::Paused
        }
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        let changed = self.state.send_if_modified(|state| {
            if state.mode == mode {
                false
            } else {
                state.mode = mode;
                true
            }
        });
        if changed {
            self.publish(PlaybackEvent::ModeChanged(mode));
        }
    }
}
