use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::{Rgba, RgbaImage};
use slideshow_player::audio::{AudioError, AudioOutput, OutputDevice, PcmFormat};
use slideshow_player::config::{AudioOptions, Settings};
use slideshow_player::events::EVENT_BACKLOG;
use slideshow_player::show_model::{ShowConfig, Slide, SlideEffect};
use slideshow_player::tasks::audio::AudioTrackPlayer;
use slideshow_player::{AudioEvent, NullSurface, PlaybackController, PlaybackOptions, SlideDeck};

const GRACE: Duration = Duration::from_secs(5);
const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
enum Record {
    Open(PcmFormat),
    Samples(Vec<f32>),
    Pause,
    Resume,
    Drain,
}

type Log = Arc<Mutex<Vec<Record>>>;

/// Output device that keeps everything it is given. Each write takes a
/// couple of milliseconds so a track lasts long enough to be paused.
#[derive(Clone, Default)]
struct Recorder {
    log: Log,
}

impl Recorder {
    fn records(&self) -> Vec<Record> {
        self.log.lock().unwrap().clone()
    }

    fn sample_count(&self) -> usize {
        self.records()
            .iter()
            .map(|r| match r {
                Record::Samples(s) => s.len(),
                _ => 0,
            })
            .sum()
    }
}

struct RecordingOutput {
    log: Log,
}

impl OutputDevice for Recorder {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn AudioOutput>, AudioError> {
        self.log.lock().unwrap().push(Record::Open(format));
        Ok(Box::new(RecordingOutput {
            log: Arc::clone(&self.log),
        }))
    }
}

impl AudioOutput for RecordingOutput {
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        thread::sleep(Duration::from_millis(2));
        self.log
            .lock()
            .unwrap()
            .push(Record::Samples(samples.to_vec()));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.log.lock().unwrap().push(Record::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.log.lock().unwrap().push(Record::Resume);
        Ok(())
    }

    fn drain(&mut self) {
        self.log.lock().unwrap().push(Record::Drain);
    }
}

// Mono 8 kHz ramp: sample `i` has the value `i`.
fn write_ramp(path: &Path, len: i16) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..len {
        writer.write_sample(i).unwrap();
    }
    writer.finalize().unwrap();
}

fn as_ramp(samples: &[f32]) -> Vec<i32> {
    samples.iter().map(|s| (s * 32_768.0).round() as i32).collect()
}

/// Samples written between the `nth` open and the drain that follows it.
fn track_samples(records: &[Record], nth: usize) -> Vec<f32> {
    records
        .iter()
        .skip_while({
            let mut opens = 0;
            move |r| {
                if matches!(r, Record::Open(_)) {
                    opens += 1;
                }
                opens <= nth
            }
        })
        .skip(1)
        .take_while(|r| !matches!(r, Record::Drain | Record::Open(_)))
        .flat_map(|r| match r {
            Record::Samples(s) => s.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn options(gap_ms: u64) -> AudioOptions {
    AudioOptions {
        track_gap: Duration::from_millis(gap_ms),
        ..AudioOptions::default()
    }
}

fn wait_for(
    events: &Receiver<AudioEvent>,
    mut wanted: impl FnMut(&AudioEvent) -> bool,
) -> Vec<AudioEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(WAIT)
            .unwrap_or_else(|_| panic!("timed out; saw {seen:?}"));
        let done = wanted(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"definitely not a RIFF file").unwrap();
    path
}

#[test]
fn pause_and_resume_continue_from_the_same_sample() {
    let dir = tempfile::tempdir().unwrap();
    let track = dir.path().join("ramp.wav");
    write_ramp(&track, 32_000);

    let device = Recorder::default();
    let mut player = AudioTrackPlayer::new(Arc::new(device.clone()), options(5_000));
    let events = player.events();
    player.start(vec![track.clone()], GRACE).unwrap();
    assert!(player.is_playing());
    wait_for(&events, |e| matches!(e, AudioEvent::TrackStarted { index: 0, .. }));

    player.pause();
    wait_for(&events, |e| *e == AudioEvent::Paused);
    assert!(!player.is_playing());
    let written = device.sample_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(device.sample_count(), written, "wrote samples while paused");

    player.resume();
    wait_for(&events, |e| *e == AudioEvent::TrackFinished { index: 0 });
    player.stop(GRACE).unwrap();

    let played = as_ramp(&track_samples(&device.records(), 0));
    let expected: Vec<i32> = (0..32_000).collect();
    assert_eq!(played.len(), expected.len());
    assert_eq!(played, expected);
    assert!(
        device
            .records()
            .iter()
            .any(|r| *r == Record::Open(PcmFormat { sample_rate: 8_000, channels: 1 }))
    );
}

#[test]
fn corrupt_track_is_skipped_and_the_list_loops() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("t1.wav");
    write_ramp(&good, 800);
    let bad = garbage(dir.path(), "t2.wav");

    let device = Recorder::default();
    let mut player = AudioTrackPlayer::new(Arc::new(device.clone()), options(20));
    let events = player.events();
    player.start(vec![good.clone(), bad.clone()], GRACE).unwrap();

    let mut starts = 0;
    let seen = wait_for(&events, |e| {
        if matches!(e, AudioEvent::TrackStarted { .. }) {
            starts += 1;
        }
        starts == 2
    });
    player.stop(GRACE).unwrap();

    assert_eq!(seen.len(), 4, "{seen:?}");
    assert_eq!(seen[0], AudioEvent::TrackStarted { index: 0, path: good.clone() });
    assert_eq!(seen[1], AudioEvent::TrackFinished { index: 0 });
    assert!(
        matches!(&seen[2], AudioEvent::TrackSkipped { index: 1, path, .. } if *path == bad),
        "{:?}",
        seen[2]
    );
    assert_eq!(seen[3], AudioEvent::TrackStarted { index: 0, path: good });
    assert_eq!(as_ramp(&track_samples(&device.records(), 0)), (0..800).collect::<Vec<_>>());
}

#[test]
fn stop_then_start_plays_from_the_first_track() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.wav");
    let second = dir.path().join("second.wav");
    write_ramp(&first, 32_000);
    write_ramp(&second, 800);

    let device = Recorder::default();
    let mut player = AudioTrackPlayer::new(Arc::new(device.clone()), options(20));
    let events = player.events();
    let tracks = vec![first.clone(), second];
    player.start(tracks.clone(), GRACE).unwrap();
    wait_for(&events, |e| matches!(e, AudioEvent::TrackStarted { .. }));
    thread::sleep(Duration::from_millis(10));

    player.stop(GRACE).unwrap();
    wait_for(&events, |e| *e == AudioEvent::Stopped);
    assert!(!player.is_playing());
    assert!(!player.is_running());
    player.stop(GRACE).unwrap();

    player.start(tracks, GRACE).unwrap();
    let seen = wait_for(&events, |e| matches!(e, AudioEvent::TrackStarted { .. }));
    assert_eq!(
        seen.last(),
        Some(&AudioEvent::TrackStarted { index: 0, path: first })
    );
    wait_for(&events, |e| *e == AudioEvent::TrackFinished { index: 0 });
    player.stop(GRACE).unwrap();

    let restarted = as_ramp(&track_samples(&device.records(), 1));
    assert_eq!(restarted.first(), Some(&0));
    assert_eq!(restarted.len(), 32_000);
}

#[test]
fn nothing_playable_exhausts_the_player() {
    let dir = tempfile::tempdir().unwrap();
    let bad = garbage(dir.path(), "bad.wav");
    let missing = dir.path().join("missing.aiff");

    let device = Recorder::default();
    let mut player = AudioTrackPlayer::new(Arc::new(device.clone()), options(20));
    let events = player.events();
    player.start(vec![bad, missing], GRACE).unwrap();

    let seen = wait_for(&events, |e| *e == AudioEvent::Exhausted);
    assert_eq!(seen.len(), 3, "{seen:?}");
    assert!(matches!(seen[0], AudioEvent::TrackSkipped { index: 0, .. }));
    assert!(matches!(seen[1], AudioEvent::TrackSkipped { index: 1, .. }));
    assert!(!player.is_playing());
    assert!(device.records().is_empty());
    player.stop(GRACE).unwrap();
}

#[test]
fn unread_events_stay_bounded_and_keep_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let track = dir.path().join("blip.wav");
    write_ramp(&track, 80);

    let device = Recorder::default();
    let mut player = AudioTrackPlayer::new(Arc::new(device.clone()), options(1));
    player.start(vec![track], GRACE).unwrap();

    let opens = || {
        device
            .records()
            .iter()
            .filter(|r| matches!(r, Record::Open(_)))
            .count()
    };
    let deadline = std::time::Instant::now() + WAIT;
    while opens() <= EVENT_BACKLOG {
        assert!(std::time::Instant::now() < deadline, "only {} plays", opens());
        thread::sleep(Duration::from_millis(5));
    }
    player.stop(GRACE).unwrap();

    let events = player.events();
    assert_eq!(events.len(), EVENT_BACKLOG);
    let kept: Vec<AudioEvent> = events.try_iter().collect();
    assert_eq!(kept.last(), Some(&AudioEvent::Stopped));
}

#[test]
fn empty_track_list_starts_nothing() {
    let mut player = AudioTrackPlayer::new(Arc::new(Recorder::default()), options(20));
    player.start(Vec::new(), GRACE).unwrap();
    assert!(!player.is_running());
    player.stop(GRACE).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controller_pauses_audio_with_the_slides() {
    let dir = tempfile::tempdir().unwrap();
    let track = dir.path().join("music.wav");
    write_ramp(&track, 32_000);

    let config = ShowConfig::new(
        None,
        vec![Slide::new("a.png", SlideEffect::default()); 2],
        vec![track],
        false,
        NonZeroU32::new(30).unwrap(),
    );
    let deck = SlideDeck::from_images(
        vec![RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])); 2],
        (4, 4),
    )
    .unwrap();
    let device = Recorder::default();
    let mut controller = PlaybackController::start_with_deck(
        config,
        Arc::new(deck),
        NullSurface,
        PlaybackOptions {
            settings: Settings::default(),
            audio_device: Some(Arc::new(device.clone())),
        },
    )
    .unwrap();
    let audio = controller.audio_events().unwrap();
    assert!(controller.state().is_audio_playing);

    let started = audio.clone();
    tokio::task::spawn_blocking(move || {
        wait_for(&started, |e| matches!(e, AudioEvent::TrackStarted { .. }))
    })
    .await
    .unwrap();

    assert!(!controller.toggle_play_pause().unwrap());
    let paused = audio.clone();
    tokio::task::spawn_blocking(move || wait_for(&paused, |e| *e == AudioEvent::Paused))
        .await
        .unwrap();
    assert!(!controller.state().is_audio_playing);

    assert!(controller.toggle_play_pause().unwrap());
    let resumed = audio.clone();
    tokio::task::spawn_blocking(move || wait_for(&resumed, |e| *e == AudioEvent::Resumed))
        .await
        .unwrap();
    assert!(controller.state().is_audio_playing);

    controller.stop().await.unwrap();
    assert!(audio.try_iter().any(|e| e == AudioEvent::Stopped));
}
