//! Line-oriented show format written by older versions of the editor.
//!
//! ```text
//! /photos            image folder, blank when unset
//! 2                  slide count
//! /photos/a.jpg
//! /photos/b.jpg
//! 1                  audio track count
//! /music/a.wav
//! false              manual advance
//! 5                  interval in seconds
//! ```
//!
//! The format stores no effects; every slide plays as an instant cut.

use std::fmt::Write as _;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::Lines;

use crate::{ShowConfig, ShowFileError, Slide, SlideEffect};

pub fn read_file(path: impl AsRef<Path>) -> Result<ShowConfig, ShowFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ShowFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_str(&text)
}

pub fn read_str(text: &str) -> Result<ShowConfig, ShowFileError> {
    let mut cursor = LineCursor::new(text);

    let folder = cursor.line("image folder")?.trim();
    let image_folder = (!folder.is_empty()).then(|| PathBuf::from(folder));

    let slide_count = cursor.count("slide count")?;
    let slides = (0..slide_count)
        .map(|_| {
            cursor
                .line("slide path")
                .map(|line| Slide::new(line.trim(), SlideEffect::default()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let track_count = cursor.count("audio track count")?;
    let audio_tracks = (0..track_count)
        .map(|_| cursor.line("audio track path").map(|line| PathBuf::from(line.trim())))
        .collect::<Result<Vec<_>, _>>()?;

    let manual_advance = cursor.line("manual advance flag")?.trim().eq_ignore_ascii_case("true");

    let interval = cursor.count("interval")?;
    let interval = match NonZeroU32::new(interval) {
        Some(interval) => interval,
        None if manual_advance => NonZeroU32::MIN,
        None => return Err(cursor.error("interval must be at least one second")),
    };

    Ok(ShowConfig::new(
        image_folder,
        slides,
        audio_tracks,
        manual_advance,
        interval,
    ))
}

pub fn write_string(show: &ShowConfig) -> String {
    let mut out = String::new();
    let folder = show
        .image_folder()
        .map(|folder| folder.to_string_lossy().into_owned())
        .unwrap_or_default();
    let _ = writeln!(out, "{folder}");
    let _ = writeln!(out, "{}", show.slide_count());
    for slide in show.slides() {
        let _ = writeln!(out, "{}", slide.image.display());
    }
    let _ = writeln!(out, "{}", show.audio_tracks().len());
    for track in show.audio_tracks() {
        let _ = writeln!(out, "{}", track.display());
    }
    let _ = writeln!(out, "{}", show.manual_advance());
    let _ = writeln!(out, "{}", show.interval_secs());
    out
}

struct LineCursor<'a> {
    lines: Lines<'a>,
    line_no: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line_no: 0,
        }
    }

    fn line(&mut self, what: &str) -> Result<&'a str, ShowFileError> {
        self.line_no += 1;
        self.lines
            .next()
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))
    }

    fn count(&mut self, what: &str) -> Result<u32, ShowFileError> {
        let raw = self.line(what)?;
        raw.trim()
            .parse()
            .map_err(|_| self.error(format!("{what} is not a number: {raw:?}")))
    }

    fn error(&self, reason: impl Into<String>) -> ShowFileError {
        ShowFileError::Legacy {
            line: self.line_no,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EffectKind;

    #[test]
    fn reads_every_audio_track() {
        let show = read_str("/photos\n2\na.jpg\nb.jpg\n3\none.wav\ntwo.wav\nthree.wav\nfalse\n4\n")
            .expect("valid legacy show");
        assert_eq!(show.image_folder(), Some(Path::new("/photos")));
        assert_eq!(show.slide_count(), 2);
        assert_eq!(show.audio_tracks().len(), 3);
        assert_eq!(show.audio_tracks()[2], PathBuf::from("three.wav"));
        assert!(!show.manual_advance());
        assert_eq!(show.interval_secs(), 4);
        assert!(show.effects().all(|effect| effect.kind() == EffectKind::None));
    }

    #[test]
    fn blank_folder_and_manual_mode() {
        let show = read_str("\n1\na.jpg\n0\nTRUE\n0\n").expect("valid legacy show");
        assert!(show.image_folder().is_none());
        assert!(show.manual_advance());
        assert_eq!(show.interval_secs(), 1);
    }

    #[test]
    fn truncated_file_reports_line() {
        let err = read_str("/photos\n3\na.jpg\n").unwrap_err();
        match err {
            ShowFileError::Legacy { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_interval_in_auto_mode_is_rejected() {
        let err = read_str("\n0\n0\nfalse\n0\n").unwrap_err();
        assert!(matches!(err, ShowFileError::Legacy { line: 5, .. }));
    }

    #[test]
    fn written_text_reads_back() {
        let show = read_str("/photos\n1\na.jpg\n1\none.wav\nfalse\n9\n").unwrap();
        assert_eq!(read_str(&write_string(&show)).unwrap(), show);
    }
}
