//! Assembling a show from media files on disk.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use show_model::{ShowConfig, Slide, SlideEffect};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::tasks::loader::decode_rgba8_apply_exif;

/// What a media file is used for in a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Slide,
    Audio,
}

impl MediaKind {
    /// Lowercase extensions, without the dot.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Slide => &["jpg", "jpeg", "png"],
            MediaKind::Audio => &["wav", "aiff", "aif"],
        }
    }

    /// Classifies `path` by extension, ignoring case.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [MediaKind::Slide, MediaKind::Audio]
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

/// Files of `kind` directly inside `folder`, sorted by path.
///
/// # Errors
/// Returns [`Error::BadFolder`] if `folder` is missing or not a directory.
pub fn scan_folder(folder: &Path, kind: MediaKind) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::BadFolder(folder.to_path_buf()));
    }
    let mut found: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(%path, error = %err, "skipping unreadable folder entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| MediaKind::of(path) == Some(kind))
        .collect();
    found.sort();
    Ok(found)
}

/// A slide left out of the finished show because its image would not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedSlide {
    pub path: PathBuf,
    pub reason: String,
}

/// A show under construction. Starts out manually advanced with a one
/// second interval.
#[derive(Debug, Clone)]
pub struct ShowDraft {
    image_folder: Option<PathBuf>,
    slides: Vec<Slide>,
    audio_tracks: Vec<PathBuf>,
    manual_advance: bool,
    interval_secs: NonZeroU32,
}

impl Default for ShowDraft {
    fn default() -> Self {
        Self {
            image_folder: None,
            slides: Vec::new(),
            audio_tracks: Vec::new(),
            manual_advance: true,
            interval_secs: NonZeroU32::MIN,
        }
    }
}

impl ShowDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft holding every slide image in `folder`, each with `effect`.
    pub fn from_folder(folder: &Path, effect: SlideEffect) -> Result<Self> {
        let mut draft = Self::new();
        draft.image_folder = Some(folder.to_path_buf());
        for path in scan_folder(folder, MediaKind::Slide)? {
            draft.add_slide(path, effect);
        }
        Ok(draft)
    }

    /// Adds `path` as a slide or an audio track depending on its kind.
    pub fn add(&mut self, path: impl Into<PathBuf>, effect: SlideEffect) -> Result<MediaKind> {
        let path = path.into();
        match MediaKind::of(&path) {
            Some(MediaKind::Slide) => {
                self.add_slide(path, effect);
                Ok(MediaKind::Slide)
            }
            Some(MediaKind::Audio) => {
                self.add_audio(path);
                Ok(MediaKind::Audio)
            }
            None => Err(Error::UnsupportedMedia(path)),
        }
    }

    pub fn add_slide(&mut self, path: impl Into<PathBuf>, effect: SlideEffect) -> &mut Self {
        self.slides.push(Slide::new(path, effect));
        self
    }

    pub fn add_audio(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.audio_tracks.push(path.into());
        self
    }

    /// Moves the slide at `from` so it ends up at `to`. Out-of-range indices are ignored.
    pub fn move_slide(&mut self, from: usize, to: usize) -> &mut Self {
        if from < self.slides.len() && to < self.slides.len() {
            let slide = self.slides.remove(from);
            self.slides.insert(to, slide);
        }
        self
    }

    pub fn remove_slide(&mut self, index: usize) -> Option<Slide> {
        (index < self.slides.len()).then(|| self.slides.remove(index))
    }

    pub fn set_effect(&mut self, index: usize, effect: SlideEffect) -> &mut Self {
        if let Some(slide) = self.slides.get_mut(index) {
            slide.effect = effect;
        }
        self
    }

    pub fn manual(&mut self) -> &mut Self {
        self.manual_advance = true;
        self
    }

    pub fn automatic(&mut self, interval_secs: NonZeroU32) -> &mut Self {
        self.manual_advance = false;
        self.interval_secs = interval_secs;
        self
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Decodes every slide image and builds the show from the ones that
    /// decode. The rest are reported, never stored.
    pub fn finish(self) -> (ShowConfig, Vec<ExcludedSlide>) {
        let mut kept = Vec::with_capacity(self.slides.len());
        let mut excluded = Vec::new();
        for slide in self.slides {
            match decode_rgba8_apply_exif(&slide.image) {
                Ok(_) => kept.push(slide),
                Err(err) => {
                    warn!(path = %slide.image.display(), error = %err, "excluding unreadable slide");
                    excluded.push(ExcludedSlide {
                        path: slide.image,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
        info!(
            slides = kept.len(),
            excluded = excluded.len(),
            tracks = self.audio_tracks.len(),
            "show assembled"
        );
        let show = ShowConfig::new(
            self.image_folder,
            kept,
            self.audio_tracks,
            self.manual_advance,
            self.interval_secs,
        );
        (show, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use show_model::EffectKind;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(MediaKind::of(Path::new("a/b.JPG")), Some(MediaKind::Slide));
        assert_eq!(MediaKind::of(Path::new("b.png")), Some(MediaKind::Slide));
        assert_eq!(MediaKind::of(Path::new("c.Aiff")), Some(MediaKind::Audio));
        assert_eq!(MediaKind::of(Path::new("d.wav")), Some(MediaKind::Audio));
        assert_eq!(MediaKind::of(Path::new("e.gif")), None);
        assert_eq!(MediaKind::of(Path::new("noext")), None);
    }

    #[cfg(unix)]
    #[test]
    fn scan_skips_entries_it_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let kept = touch(dir.path(), "a.jpg");
        std::os::unix::fs::symlink(dir.path().join("gone.jpg"), dir.path().join("b.jpg")).unwrap();
        let linked = dir.path().join("c.png");
        std::os::unix::fs::symlink(&kept, &linked).unwrap();

        let found = scan_folder(dir.path(), MediaKind::Slide).unwrap();
        assert_eq!(found, vec![kept, linked]);
    }

    #[test]
    fn scan_is_sorted_and_flat() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.jpg");
        touch(dir.path(), "a.PNG");
        touch(dir.path(), "song.wav");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "c.jpg");

        let slides = scan_folder(dir.path(), MediaKind::Slide).unwrap();
        assert_eq!(
            slides,
            vec![dir.path().join("a.PNG"), dir.path().join("b.jpg")]
        );
        let audio = scan_folder(dir.path(), MediaKind::Audio).unwrap();
        assert_eq!(audio, vec![dir.path().join("song.wav")]);
    }

    #[test]
    fn scan_rejects_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            scan_folder(&missing, MediaKind::Slide),
            Err(Error::BadFolder(path)) if path == missing
        ));
    }

    #[test]
    fn finish_excludes_undecodable_slides() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))
            .save(&good)
            .unwrap();
        let bad = touch(dir.path(), "bad.jpg");

        let wipe = SlideEffect::from_secs(EffectKind::WipeUp, 2).unwrap();
        let mut draft = ShowDraft::from_folder(dir.path(), wipe).unwrap();
        draft.add_audio("track.wav");
        assert_eq!(draft.slides().len(), 2);

        let (show, excluded) = draft.finish();
        assert_eq!(show.slide_count(), 1);
        assert_eq!(show.slides()[0].image, good);
        assert_eq!(show.slides()[0].effect, wipe);
        assert!(show.manual_advance());
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].path, bad);
    }

    #[test]
    fn add_routes_by_kind() {
        let mut draft = ShowDraft::new();
        assert_eq!(draft.add("one.jpeg", SlideEffect::default()).unwrap(), MediaKind::Slide);
        assert_eq!(draft.add("two.aif", SlideEffect::default()).unwrap(), MediaKind::Audio);
        assert!(matches!(
            draft.add("three.mp4", SlideEffect::default()),
            Err(Error::UnsupportedMedia(_))
        ));
        assert_eq!(draft.slides().len(), 1);
    }

    #[test]
    fn slides_can_be_reordered() {
        let mut draft = ShowDraft::new();
        draft
            .add_slide("a.jpg", SlideEffect::default())
            .add_slide("b.jpg", SlideEffect::default())
            .add_slide("c.jpg", SlideEffect::default())
            .move_slide(0, 2)
            .set_effect(0, SlideEffect::from_secs(EffectKind::Cross, 1).unwrap());
        let names: Vec<_> = draft.slides().iter().map(|s| s.image.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("b.jpg"),
                PathBuf::from("c.jpg"),
                PathBuf::from("a.jpg")
            ]
        );
        assert_eq!(draft.slides()[0].effect.kind(), EffectKind::Cross);
        assert!(draft.remove_slide(7).is_none());
    }
}
