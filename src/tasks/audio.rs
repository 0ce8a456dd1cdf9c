use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded, unbounded,
};
use tracing::{debug, info, instrument, warn};

use crate::audio::{AudioError, OutputDevice, TrackDecoder};
use crate::config::AudioOptions;
use crate::error::{Error, Result};
use crate::events::{AudioEvent, EVENT_BACKLOG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioCommand {
    Pause,
    Resume,
    Stop,
}

enum TrackEnd {
    Finished,
    Stopped,
}

enum Flow {
    Continue,
    Stop,
}

struct Worker {
    commands: Sender<AudioCommand>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

/// Plays a list of tracks in order on a dedicated thread, looping until
/// stopped. Independent of the slide timer.
pub struct AudioTrackPlayer {
    device: Arc<dyn OutputDevice>,
    options: AudioOptions,
    events_tx: Sender<AudioEvent>,
    events_rx: Receiver<AudioEvent>,
    playing: Arc<AtomicBool>,
    worker: Option<Worker>,
}

impl AudioTrackPlayer {
    pub fn new(device: Arc<dyn OutputDevice>, options: AudioOptions) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_BACKLOG);
        Self {
            device,
            options,
            events_tx,
            events_rx,
            playing: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Event stream shared by every run of this player. Holds at most
    /// [`EVENT_BACKLOG`] events; the oldest go first when nobody reads.
    pub fn events(&self) -> Receiver<AudioEvent> {
        self.events_rx.clone()
    }

    /// True while samples are being produced: not paused, stopped or exhausted.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    /// Starts playback at the first byte of the first track. A run that is
    /// still active is stopped first.
    pub fn start(&mut self, tracks: Vec<PathBuf>, grace: Duration) -> Result<()> {
        self.stop(grace)?;
        if tracks.is_empty() {
            return Ok(());
        }

        let (command_tx, command_rx) = unbounded();
        let (done_tx, done_rx) = bounded::<()>(0);
        let run = WorkerRun {
            tracks,
            device: Arc::clone(&self.device),
            gap: self.options.track_gap,
            commands: command_rx,
            events: self.events_tx.clone(),
            backlog: self.events_rx.clone(),
            playing: Arc::clone(&self.playing),
        };
        self.playing.store(true, Ordering::Release);
        let thread = thread::Builder::new()
            .name("audio-player".into())
            .spawn(move || {
                run.run();
                drop(done_tx);
            })
            .map_err(|err| Error::ConcurrencyFault(format!("failed to spawn audio thread: {err}")))?;
        self.worker = Some(Worker {
            commands: command_tx,
            done: done_rx,
            thread,
        });
        Ok(())
    }

    pub fn pause(&self) {
        self.send(AudioCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(AudioCommand::Resume);
    }

    /// Stops playback and waits up to `grace` for the thread to exit.
    /// Calling it with nothing running is a no-op.
    pub fn stop(&mut self, grace: Duration) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = worker.commands.send(AudioCommand::Stop);
        match worker.done.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => {
                self.playing.store(false, Ordering::Release);
                Err(Error::ConcurrencyFault(format!(
                    "audio thread did not stop within {}",
                    humantime::format_duration(grace)
                )))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    return Err(Error::ConcurrencyFault("audio thread panicked".into()));
                }
                Ok(())
            }
        }
    }

    fn send(&self, command: AudioCommand) {
        if let Some(worker) = &self.worker {
            let _ = worker.commands.send(command);
        }
    }
}

impl Drop for AudioTrackPlayer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.commands.send(AudioCommand::Stop);
        }
    }
}

struct WorkerRun {
    tracks: Vec<PathBuf>,
    device: Arc<dyn OutputDevice>,
    gap: Duration,
    commands: Receiver<AudioCommand>,
    events: Sender<AudioEvent>,
    backlog: Receiver<AudioEvent>,
    playing: Arc<AtomicBool>,
}

impl WorkerRun {
    #[instrument(name = "audio", skip_all, fields(tracks = self.tracks.len()))]
    fn run(self) {
        info!("audio playback started");
        let stopped = 'passes: loop {
            let mut played_any = false;
            for (index, path) in self.tracks.iter().enumerate() {
                match self.play_track(index, path) {
                    Ok(TrackEnd::Finished) => {
                        played_any = true;
                        self.emit(AudioEvent::TrackFinished { index });
                        if let Flow::Stop = self.gap() {
                            break 'passes true;
                        }
                    }
                    Ok(TrackEnd::Stopped) => break 'passes true,
                    Err(err) => {
                        warn!(index, path = %path.display(), error = %err, "skipping audio track");
                        self.emit(AudioEvent::TrackSkipped {
                            index,
                            path: path.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            if !played_any {
                warn!("no audio track could be played; giving up");
                break 'passes false;
            }
        };

        self.playing.store(false, Ordering::Release);
        if stopped {
            info!("audio playback stopped");
            self.emit(AudioEvent::Stopped);
        } else {
            self.emit(AudioEvent::Exhausted);
        }
    }

    fn play_track(&self, index: usize, path: &Path) -> Result<TrackEnd, AudioError> {
        let mut decoder = TrackDecoder::open(path)?;
        let mut output = self.device.open(decoder.format())?;
        info!(index, path = %path.display(), "track started");
        self.emit(AudioEvent::TrackStarted {
            index,
            path: path.to_path_buf(),
        });

        let mut wrote_any = false;
        loop {
            match self.commands.try_recv() {
                Ok(AudioCommand::Pause) => {
                    output.pause()?;
                    debug!(index, byte = decoder.byte_position(), "paused");
                    if let Flow::Stop = self.hold() {
                        return Ok(TrackEnd::Stopped);
                    }
                    output.resume()?;
                }
                Ok(AudioCommand::Resume) | Err(TryRecvError::Empty) => {}
                Ok(AudioCommand::Stop) | Err(TryRecvError::Disconnected) => {
                    return Ok(TrackEnd::Stopped);
                }
            }

            match decoder.next_chunk() {
                Ok(Some(chunk)) => {
                    output.write(&chunk)?;
                    wrote_any = true;
                }
                Ok(None) => {
                    output.drain();
                    return Ok(TrackEnd::Finished);
                }
                Err(err) if wrote_any => {
                    warn!(index, error = %err, "track ended early");
                    return Ok(TrackEnd::Finished);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Blocks while paused. Returns once resumed, or `Flow::Stop`.
    fn hold(&self) -> Flow {
        self.playing.store(false, Ordering::Release);
        self.emit(AudioEvent::Paused);
        loop {
            match self.commands.recv() {
                Ok(AudioCommand::Resume) => {
                    self.playing.store(true, Ordering::Release);
                    self.emit(AudioEvent::Resumed);
                    return Flow::Continue;
                }
                Ok(AudioCommand::Pause) => {}
                Ok(AudioCommand::Stop) | Err(_) => return Flow::Stop,
            }
        }
    }

    /// Silence between tracks. A pause freezes the remaining gap.
    fn gap(&self) -> Flow {
        let mut remaining = self.gap;
        loop {
            let started = Instant::now();
            match self.commands.recv_timeout(remaining) {
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                Ok(AudioCommand::Pause) => {
                    remaining = remaining.saturating_sub(started.elapsed());
                    if let Flow::Stop = self.hold() {
                        return Flow::Stop;
                    }
                    continue;
                }
                Ok(AudioCommand::Resume) => {}
                Ok(AudioCommand::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    return Flow::Stop;
                }
            }
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }

    fn emit(&self, mut event: AudioEvent) {
        loop {
            match self.events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.backlog.try_recv();
                    event = rejected;
                }
            }
        }
    }
}
