use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use tracing::{debug, warn};

use super::{AudioError, FormatConverter, PcmFormat};

// Chunks buffered ahead of the device. Writes block once this many are queued,
// which paces decoding to playback speed.
const QUEUED_CHUNKS: usize = 8;

/// A sink for one track's samples. Created and used on the audio thread only.
pub trait AudioOutput {
    /// Queues interleaved samples, blocking while the device catches up.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;
    fn pause(&mut self) -> Result<(), AudioError>;
    fn resume(&mut self) -> Result<(), AudioError>;
    /// Waits until everything written so far has been played.
    fn drain(&mut self);
}

/// Opens an output for each track. Takes samples in the track's own
/// format; any conversion the hardware needs happens behind it.
pub trait OutputDevice: Send + Sync {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn AudioOutput>, AudioError>;
}

/// Sample rates a device accepts at one channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRange {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
}

/// Format to run the stream in: the track's own when the device lists it,
/// the device default otherwise.
pub fn negotiate(track: PcmFormat, supported: &[RateRange], default: PcmFormat) -> PcmFormat {
    let native = supported.iter().any(|range| {
        range.channels == track.channels
            && (range.min_rate..=range.max_rate).contains(&track.sample_rate)
    });
    if native { track } else { default }
}

/// The system's default output device.
#[derive(Debug, Clone)]
pub struct CpalDevice {
    write_timeout: Duration,
}

impl CpalDevice {
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }
}

impl OutputDevice for CpalDevice {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn AudioOutput>, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        let supported: Vec<RateRange> = device
            .supported_output_configs()
            .map(|configs| {
                configs
                    .filter(|range| range.sample_format() == SampleFormat::F32)
                    .map(|range| RateRange {
                        channels: range.channels(),
                        min_rate: range.min_sample_rate(),
                        max_rate: range.max_sample_rate(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let default = device
            .default_output_config()
            .map_err(|e| AudioError::Output(e.to_string()))?;
        let stream_format = negotiate(
            format,
            &supported,
            PcmFormat {
                sample_rate: default.sample_rate(),
                channels: default.channels(),
            },
        );
        let converter = if stream_format == format {
            None
        } else {
            debug!(
                track_rate = format.sample_rate,
                track_channels = format.channels,
                rate = stream_format.sample_rate,
                channels = stream_format.channels,
                "converting track to the device format"
            );
            Some(FormatConverter::new(format, stream_format)?)
        };
        let config = StreamConfig {
            channels: stream_format.channels,
            sample_rate: stream_format.sample_rate,
            buffer_size: BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(QUEUED_CHUNKS);
        let queued = Arc::new(AtomicUsize::new(0));
        let mut feed = Feed {
            chunks: chunk_rx,
            current: Vec::new(),
            offset: 0,
            queued: Arc::clone(&queued),
        };
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| feed.fill(data),
                |err| warn!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::Output(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::Output(e.to_string()))?;
        debug!(rate = stream_format.sample_rate, channels = stream_format.channels, "output stream opened");

        Ok(Box::new(CpalOutput {
            stream,
            converter,
            chunks: chunk_tx,
            queued,
            write_timeout: self.write_timeout,
            paused: false,
        }))
    }
}

// Runs inside the device callback: copies queued chunks out, silence when dry.
struct Feed {
    chunks: Receiver<Vec<f32>>,
    current: Vec<f32>,
    offset: usize,
    queued: Arc<AtomicUsize>,
}

impl Feed {
    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.offset == self.current.len() {
                match self.chunks.try_recv() {
                    Ok(chunk) => {
                        self.current = chunk;
                        self.offset = 0;
                        continue;
                    }
                    Err(_) => break,
                }
            }
            let n = (self.current.len() - self.offset).min(data.len() - written);
            data[written..written + n]
                .copy_from_slice(&self.current[self.offset..self.offset + n]);
            self.offset += n;
            written += n;
            self.queued.fetch_sub(n, Ordering::AcqRel);
        }
        data[written..].fill(0.0);
    }
}

struct CpalOutput {
    stream: Stream,
    converter: Option<FormatConverter>,
    chunks: Sender<Vec<f32>>,
    queued: Arc<AtomicUsize>,
    write_timeout: Duration,
    paused: bool,
}

impl CpalOutput {
    fn enqueue(&mut self, chunk: Vec<f32>) -> Result<(), AudioError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len();
        self.queued.fetch_add(len, Ordering::AcqRel);
        match self.chunks.send_timeout(chunk, self.write_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                self.queued.fetch_sub(len, Ordering::AcqRel);
                Err(AudioError::OutputStalled)
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(AudioError::Output("output stream closed".into()))
            }
        }
    }
}

impl AudioOutput for CpalOutput {
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let chunk = match self.converter.as_mut() {
            Some(converter) => converter.process(samples)?,
            None => samples.to_vec(),
        };
        self.enqueue(chunk)
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.paused = true;
        self.stream
            .pause()
            .map_err(|e| AudioError::Output(e.to_string()))
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.paused = false;
        self.stream
            .play()
            .map_err(|e| AudioError::Output(e.to_string()))
    }

    fn drain(&mut self) {
        if self.paused {
            return;
        }
        match self.converter.as_mut().map(FormatConverter::flush) {
            Some(Ok(tail)) => {
                if let Err(err) = self.enqueue(tail) {
                    warn!(error = %err, "dropping converted track tail");
                }
            }
            Some(Err(err)) => warn!(error = %err, "dropping converted track tail"),
            None => {}
        }
        let deadline = Instant::now() + self.write_timeout;
        while self.queued.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: PcmFormat = PcmFormat {
        sample_rate: 22_050,
        channels: 1,
    };
    const DEVICE: PcmFormat = PcmFormat {
        sample_rate: 48_000,
        channels: 2,
    };

    #[test]
    fn listed_track_format_is_used_as_is() {
        let supported = [RateRange {
            channels: 1,
            min_rate: 8_000,
            max_rate: 96_000,
        }];
        assert_eq!(negotiate(TRACK, &supported, DEVICE), TRACK);
    }

    #[test]
    fn unlisted_track_format_falls_back_to_the_device_default() {
        let stereo_only = [RateRange {
            channels: 2,
            min_rate: 8_000,
            max_rate: 96_000,
        }];
        assert_eq!(negotiate(TRACK, &stereo_only, DEVICE), DEVICE);

        let fixed_rate = [RateRange {
            channels: 1,
            min_rate: 48_000,
            max_rate: 48_000,
        }];
        assert_eq!(negotiate(TRACK, &fixed_rate, DEVICE), DEVICE);
        assert_eq!(negotiate(TRACK, &[], DEVICE), DEVICE);
    }
}
