use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::AudioError;

/// Sample layout handed to the output device. Samples are always
/// interleaved `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Streams one audio file packet by packet.
pub struct TrackDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pcm: PcmFormat,
    // Bytes of compressed stream consumed so far; this is the resume cursor.
    byte_position: u64,
}

impl TrackDecoder {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|source| AudioError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::NoTrack {
                path: path.to_path_buf(),
            })?;
        let track_id = track.id;
        let pcm = PcmFormat {
            sample_rate: track.codec_params.sample_rate.unwrap_or(44_100),
            channels: track
                .codec_params
                .channels
                .map(|channels| channels.count() as u16)
                .unwrap_or(2),
        };

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|source| AudioError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), rate = pcm.sample_rate, channels = pcm.channels, "audio track opened");
        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            pcm,
            byte_position: 0,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.pcm
    }

    pub fn byte_position(&self) -> u64 {
        self.byte_position
    }

    /// Decodes the next packet into interleaved samples. `Ok(None)` marks the
    /// end of the track. Packets that fail to decode are dropped.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, AudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(source) => {
                    return Err(AudioError::Decode {
                        path: self.path.clone(),
                        source,
                    });
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }
            self.byte_position += packet.buf().len() as u64;

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut samples =
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                    samples.copy_interleaved_ref(decoded);
                    return Ok(Some(samples.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    warn!(path = %self.path.display(), reason, "dropping undecodable packet");
                }
                Err(source) => {
                    return Err(AudioError::Decode {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }
}
