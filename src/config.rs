use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Player settings. The show itself lives in the show file; these are the
/// engine knobs around it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Width of the slide canvas in pixels.
    pub canvas_width: u32,
    /// Height of the slide canvas in pixels.
    pub canvas_height: u32,
    pub animation: AnimationOptions,
    pub audio: AudioOptions,
    /// Slides decoded in parallel while the deck loads.
    pub max_concurrent_decodes: usize,
    /// How long `stop()` waits for each background unit to finish.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Settings {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.canvas_width > 0, "canvas-width must be greater than zero");
        ensure!(
            self.canvas_height > 0,
            "canvas-height must be greater than zero"
        );
        ensure!(
            self.max_concurrent_decodes >= 1,
            "max-concurrent-decodes must be >= 1"
        );
        ensure!(
            self.shutdown_grace > Duration::ZERO,
            "shutdown-grace must be positive"
        );
        self.animation.validate()?;
        self.audio.validate()?;
        Ok(self)
    }

    pub fn canvas(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_width: 600,
            canvas_height: 400,
            animation: AnimationOptions::default(),
            audio: AudioOptions::default(),
            max_concurrent_decodes: 4,
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnimationOptions {
    /// Ratio samples rendered per second of effect duration.
    pub steps_per_second: u32,
    /// Delay between two rendered samples.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl AnimationOptions {
    const fn default_steps_per_second() -> u32 {
        20
    }

    const fn default_tick() -> Duration {
        Duration::from_millis(50)
    }

    /// Number of samples for an effect lasting `duration_secs`.
    pub fn steps_for(&self, duration_secs: u32) -> u32 {
        self.steps_per_second.saturating_mul(duration_secs).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.steps_per_second >= 1,
            "animation.steps-per-second must be >= 1"
        );
        ensure!(
            self.tick > Duration::ZERO,
            "animation.tick must be positive"
        );
        Ok(())
    }
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            steps_per_second: Self::default_steps_per_second(),
            tick: Self::default_tick(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AudioOptions {
    /// Silence inserted after each track that played.
    #[serde(with = "humantime_serde")]
    pub track_gap: Duration,
    /// Upper bound on a single write to the output device.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl AudioOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.track_gap > Duration::ZERO,
            "audio.track-gap must be positive"
        );
        ensure!(
            self.write_timeout > Duration::ZERO,
            "audio.write-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            track_gap: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
        }
    }
}
