use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::{AudioError, PcmFormat};

// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Turns a track's samples into the layout an output stream was opened
/// with: channels are remixed first, then the rate is resampled.
pub struct FormatConverter {
    from: PcmFormat,
    to: PcmFormat,
    resampler: Option<SincFixedIn<f32>>,
    // Remixed frames waiting for a full resampler chunk, one Vec per channel.
    pending: Vec<Vec<f32>>,
}

impl FormatConverter {
    pub fn new(from: PcmFormat, to: PcmFormat) -> Result<Self, AudioError> {
        if from.channels == 0 || to.channels == 0 {
            return Err(AudioError::Resample(format!(
                "cannot convert {} to {} channels",
                from.channels, to.channels
            )));
        }
        let resampler = if from.sample_rate == to.sample_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let ratio = f64::from(to.sample_rate) / f64::from(from.sample_rate);
            let resampler = SincFixedIn::<f32>::new(
                ratio,
                1.0,
                params,
                CHUNK_FRAMES,
                usize::from(to.channels),
            )
            .map_err(|e| AudioError::Resample(e.to_string()))?;
            Some(resampler)
        };
        Ok(Self {
            from,
            to,
            resampler,
            pending: vec![Vec::new(); usize::from(to.channels)],
        })
    }

    /// Converts interleaved samples. Resampled output lags the input by up to
    /// a chunk; [`FormatConverter::flush`] releases the rest.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, AudioError> {
        let remixed = remix(samples, self.from.channels, self.to.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(remixed);
        };

        let channels = self.pending.len();
        for frame in remixed.chunks_exact(channels) {
            for (pending, sample) in self.pending.iter_mut().zip(frame) {
                pending.push(*sample);
            }
        }

        let mut out = Vec::new();
        while self.pending[0].len() >= resampler.input_frames_next() {
            let frames = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|pending| pending.drain(..frames).collect())
                .collect();
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            interleave_into(&resampled, &mut out);
        }
        Ok(out)
    }

    /// Everything still held back, including the resampler's delay line.
    /// The converter starts clean afterwards.
    pub fn flush(&mut self) -> Result<Vec<f32>, AudioError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        if !self.pending[0].is_empty() {
            let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
            let resampled = resampler
                .process_partial(Some(chunk.as_slice()), None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            interleave_into(&resampled, &mut out);
        }
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        interleave_into(&tail, &mut out);
        resampler.reset();
        Ok(out)
    }
}

fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }
    let (from, to) = (usize::from(from), usize::from(to));
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

fn interleave_into(channels: &[Vec<f32>], out: &mut Vec<f32>) {
    let frames = channels.first().map_or(0, Vec::len);
    out.reserve(frames * channels.len());
    for i in 0..frames {
        out.extend(channels.iter().map(|channel| channel[i]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(sample_rate: u32, channels: u16) -> PcmFormat {
        PcmFormat {
            sample_rate,
            channels,
        }
    }

    #[test]
    fn mono_is_copied_to_every_output_channel() {
        let mut conv = FormatConverter::new(pcm(48_000, 1), pcm(48_000, 2)).unwrap();
        assert_eq!(conv.process(&[0.1, 0.2]).unwrap(), vec![0.1, 0.1, 0.2, 0.2]);
        assert!(conv.flush().unwrap().is_empty());
    }

    #[test]
    fn downmix_to_mono_averages_channels() {
        let mut conv = FormatConverter::new(pcm(44_100, 2), pcm(44_100, 1)).unwrap();
        assert_eq!(conv.process(&[0.2, 0.4, -1.0, 1.0]).unwrap(), vec![0.3, 0.0]);
    }

    #[test]
    fn upsampling_keeps_a_steady_level() {
        let mut conv = FormatConverter::new(pcm(22_050, 1), pcm(44_100, 2)).unwrap();
        let input = vec![0.5f32; 512];
        let mut out = Vec::new();
        for _ in 0..8 {
            out.extend(conv.process(&input).unwrap());
        }
        out.extend(conv.flush().unwrap());

        let frames = out.len() / 2;
        assert_eq!(out.len() % 2, 0);
        assert!(frames >= 2 * 8 * 512, "only {frames} frames");
        // Well past the filter's warm-up the level matches the input.
        let (left, right) = (out[2 * 4_000], out[2 * 4_000 + 1]);
        assert!((left - 0.5).abs() < 0.05, "left {left}");
        assert_eq!(left, right);
    }

    #[test]
    fn zero_channels_are_rejected() {
        assert!(matches!(
            FormatConverter::new(pcm(44_100, 0), pcm(44_100, 2)),
            Err(AudioError::Resample(_))
        ));
    }
}
