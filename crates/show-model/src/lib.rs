//! Show description shared by the player, the authoring path and the file formats.

use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub mod legacy;
pub mod xml;

pub use error::ShowFileError;
pub use show::{ShowConfig, Slide};

mod error {
    use std::path::PathBuf;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ShowFileError {
        #[error("failed to access show file {}", .path.display())]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("malformed show document")]
        Xml(#[from] quick_xml::Error),
        #[error("malformed attribute in show document")]
        Attribute(#[from] quick_xml::events::attributes::AttrError),
        #[error("failed to write show document")]
        Write(#[from] std::io::Error),
        #[error("show document is not valid UTF-8")]
        Encoding(#[from] std::string::FromUtf8Error),
        #[error("show document is missing the <{0}> element")]
        MissingElement(&'static str),
        #[error("<{element}> is missing the `{attribute}` attribute")]
        MissingAttribute {
            element: &'static str,
            attribute: &'static str,
        },
        #[error("`{attribute}` on <{element}> is not a valid number: {value:?}")]
        InvalidNumber {
            element: &'static str,
            attribute: &'static str,
            value: String,
        },
        #[error("effect duration must be at least one second (slide {slide})")]
        InvalidEffectDuration { slide: usize },
        #[error("legacy show file, line {line}: {reason}")]
        Legacy { line: usize, reason: String },
    }
}

/// Animation used when a slide is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EffectKind {
    WipeLeft,
    WipeRight,
    WipeUp,
    WipeDown,
    Cross,
    #[default]
    None,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        EffectKind::WipeLeft,
        EffectKind::WipeRight,
        EffectKind::WipeUp,
        EffectKind::WipeDown,
        EffectKind::Cross,
        EffectKind::None,
    ];

    /// Name used in persisted show files.
    pub const fn as_str(self) -> &'static str {
        match self {
            EffectKind::WipeLeft => "WipeLeft",
            EffectKind::WipeRight => "WipeRight",
            EffectKind::WipeUp => "WipeUp",
            EffectKind::WipeDown => "WipeDown",
            EffectKind::Cross => "Cross",
            EffectKind::None => "None",
        }
    }

    /// Persisted names are matched case-sensitively; anything unknown plays as `None`.
    pub fn from_persisted(raw: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .unwrap_or(EffectKind::None)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEffect(pub String);

impl fmt::Display for UnknownEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = EffectKind::ALL.iter().map(|kind| kind.as_str()).collect();
        write!(
            f,
            "unknown effect {:?} (expected one of {})",
            self.0,
            names.join(", ")
        )
    }
}

impl std::error::Error for UnknownEffect {}

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    /// Strict parse for user input: accepts persisted names and kebab-case
    /// (`wipe-left`), ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == wanted)
            .ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

/// Effect kind plus how long the animation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlideEffect {
    kind: EffectKind,
    duration_secs: NonZeroU32,
}

impl SlideEffect {
    pub const fn new(kind: EffectKind, duration_secs: NonZeroU32) -> Self {
        Self {
            kind,
            duration_secs,
        }
    }

    /// Returns `None` for a zero duration.
    pub fn from_secs(kind: EffectKind, duration_secs: u32) -> Option<Self> {
        NonZeroU32::new(duration_secs).map(|secs| Self::new(kind, secs))
    }

    pub const fn kind(&self) -> EffectKind {
        self.kind
    }

    pub const fn duration_secs(&self) -> u32 {
        self.duration_secs.get()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs.get()))
    }
}

impl Default for SlideEffect {
    fn default() -> Self {
        Self::new(EffectKind::None, NonZeroU32::MIN)
    }
}

mod show {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Slide {
        pub image: PathBuf,
        pub effect: SlideEffect,
    }

    impl Slide {
        pub fn new(image: impl Into<PathBuf>, effect: SlideEffect) -> Self {
            Self {
                image: image.into(),
                effect,
            }
        }
    }

    /// Immutable description of a show. Each slide carries its own effect so
    /// the slide and effect lists can never drift apart.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ShowConfig {
        image_folder: Option<PathBuf>,
        slides: Vec<Slide>,
        audio_tracks: Vec<PathBuf>,
        manual_advance: bool,
        interval_secs: NonZeroU32,
    }

    impl ShowConfig {
        pub fn new(
            image_folder: Option<PathBuf>,
            slides: Vec<Slide>,
            audio_tracks: Vec<PathBuf>,
            manual_advance: bool,
            interval_secs: NonZeroU32,
        ) -> Self {
            Self {
                image_folder,
                slides,
                audio_tracks,
                manual_advance,
                interval_secs,
            }
        }

        /// Loads an XML show (`.xml`, any case) or a legacy line-format show.
        pub fn load(path: impl AsRef<Path>) -> Result<Self, ShowFileError> {
            let path = path.as_ref();
            if xml::has_xml_extension(path) {
                xml::read_file(path)
            } else {
                legacy::read_file(path)
            }
        }

        pub fn image_folder(&self) -> Option<&Path> {
            self.image_folder.as_deref()
        }

        pub fn slides(&self) -> &[Slide] {
            &self.slides
        }

        pub fn slide_count(&self) -> usize {
            self.slides.len()
        }

        pub fn is_empty(&self) -> bool {
            self.slides.is_empty()
        }

        pub fn effects(&self) -> impl Iterator<Item = SlideEffect> + '_ {
            self.slides.iter().map(|slide| slide.effect)
        }

        pub fn audio_tracks(&self) -> &[PathBuf] {
            &self.audio_tracks
        }

        pub fn manual_advance(&self) -> bool {
            self.manual_advance
        }

        pub fn interval_secs(&self) -> u32 {
            self.interval_secs.get()
        }

        pub fn interval(&self) -> Duration {
            Duration::from_secs(u64::from(self.interval_secs.get()))
        }
    }
}
