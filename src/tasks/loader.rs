use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use show_model::ShowConfig;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{Error, Result};

// Decodes an image to RGBA8 and applies EXIF orientation if available.
// Orientation handling is best-effort; without metadata the image is kept as stored.
pub(crate) fn decode_rgba8_apply_exif(path: &Path) -> anyhow::Result<RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let img = img.to_rgba8();

    let orientation: u16 = read_orientation(path).unwrap_or(1);
    let img = match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        // transpose
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        // transverse
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    };
    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!(orientation = o, path = %path.display(), "exif orientation");
    Some(o)
}

/// Decodes one slide and stretches it onto the canvas.
pub fn decode_slide(path: &Path, canvas: (u32, u32)) -> Result<RgbaImage> {
    let img = decode_rgba8_apply_exif(path)
        .with_context(|| format!("decoding {}", path.display()))
        .map_err(|source| Error::SlideDecode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(fit_to_canvas(img, canvas))
}

fn fit_to_canvas(img: RgbaImage, (width, height): (u32, u32)) -> RgbaImage {
    if img.dimensions() == (width, height) {
        img
    } else {
        imageops::resize(&img, width, height, FilterType::CatmullRom)
    }
}

/// Slide images of a show, decoded and sized for the canvas. Index `i`
/// matches slide `i` of the show it was loaded from.
#[derive(Debug, Clone)]
pub struct SlideDeck {
    slides: Vec<Arc<RgbaImage>>,
    canvas: (u32, u32),
}

impl SlideDeck {
    /// Decodes every slide of `config` on the calling thread.
    pub fn load(config: &ShowConfig, canvas: (u32, u32)) -> Result<Self> {
        if config.is_empty() {
            return Err(Error::EmptyShow);
        }
        let slides = config
            .slides()
            .iter()
            .map(|slide| decode_slide(&slide.image, canvas).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        info!(count = slides.len(), "slide deck loaded");
        Ok(Self { slides, canvas })
    }

    /// Decodes slides on the blocking pool, at most `max_in_flight` at a time.
    pub async fn load_async(
        config: &ShowConfig,
        canvas: (u32, u32),
        max_in_flight: usize,
    ) -> Result<Self> {
        if config.is_empty() {
            return Err(Error::EmptyShow);
        }
        let max_in_flight = max_in_flight.max(1);
        let mut pending: Vec<(usize, PathBuf)> = config
            .slides()
            .iter()
            .enumerate()
            .map(|(index, slide)| (index, slide.image.clone()))
            .rev()
            .collect();
        let mut decoded: Vec<Option<Arc<RgbaImage>>> = vec![None; pending.len()];
        let mut tasks: JoinSet<(usize, Result<RgbaImage>)> = JoinSet::new();

        loop {
            while tasks.len() < max_in_flight {
                let Some((index, path)) = pending.pop() else {
                    break;
                };
                tasks.spawn_blocking(move || (index, decode_slide(&path, canvas)));
            }
            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (index, image) = joined
                .map_err(|err| Error::ConcurrencyFault(format!("slide decode task failed: {err}")))?;
            debug!(index, "slide decoded");
            decoded[index] = Some(Arc::new(image?));
        }

        let slides = decoded
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::ConcurrencyFault("slide decode result missing".into()))?;
        info!(count = slides.len(), "slide deck loaded");
        Ok(Self { slides, canvas })
    }

    /// Builds a deck from already decoded images, resizing any that do not
    /// match the canvas.
    pub fn from_images(images: Vec<RgbaImage>, canvas: (u32, u32)) -> Result<Self> {
        if images.is_empty() {
            return Err(Error::EmptyShow);
        }
        let slides = images
            .into_iter()
            .map(|img| Arc::new(fit_to_canvas(img, canvas)))
            .collect();
        Ok(Self { slides, canvas })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn canvas(&self) -> (u32, u32) {
        self.canvas
    }

    /// Panics when `index` is out of range; the scheduler only hands out
    /// indices reduced modulo [`SlideDeck::len`].
    pub fn get(&self, index: usize) -> &Arc<RgbaImage> {
        &self.slides[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use image::Rgba;
    use show_model::{Slide, SlideEffect};
    use std::num::NonZeroU32;

    // JPEG 2x1 with EXIF orientation 6 (rotate 90 CW), base64 encoded
    const ORIENT6_JPEG: &str = concat!(
        "/9j/4AAQSkZJRgABAQAAAQABAAD/4QAiRXhpZgAATU0AKgAAAAgAAQESAAMAAAABAAYAAAAAAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8UHRofHh0aHBwgJC4nICIsIxwcKDcpLDAxNDQ0Hyc5PTgyPC4zNDL/",
        "2wBDAQkJCQwLDBgNDRgyIRwhMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjL/wAARCAABAAIDASIAAhEBAxEB/8QAHwAAAQUBAQEBAQEAAAAAAAAAAAECAwQFBgcICQoL/8QAtRAAAgEDAwIEAwUFBAQAAAF9AQIDAAQRBRIhMUEGE1FhByJxFDKBkaEII0KxwRVS0fAkM2JyggkKFhcYGRolJicoKSo0NTY3ODk6Q0RFRkdISUpTVFVWV1hZWmNkZWZnaGlqc3R1dnd4eXqDhIWGh4iJipKTlJWWl5iZmqKjpKWmp6ipqrKztLW2t7i5usLDxMXGx8jJytLT1NXW19jZ2uHi4+Tl5ufo6erx8vP09fb3+Pn6/8QAHwEAAwEBAQEBAQEBAQAAAAAAAAECAwQFBgcICQoL/8QAtREAAgECBAQDBAcFBAQAAQJ3AAECAxEEBSExBhJBUQdhcRMiMoEIFEKRobHBCSMzUvAVYnLRChYkNOEl8RcYGRomJygpKjU2Nzg5OkNERUZHSElKU1RVVldYWVpjZGVmZ2hpanN0dXZ3eHl6goOEhYaHiImKkpOUlZaXmJmaoqOkpaanqKmqsrO0tba3uLm6wsPExcbHyMnK0tPU1dbX2Nna4uPk5ebn6Onq8vP09fb3+Pn6/9oADAMBAAIRAxEAPwDi6KKK+ZP3E//Z"
    );

    fn show_of(paths: &[PathBuf]) -> ShowConfig {
        let slides = paths
            .iter()
            .map(|path| Slide::new(path.clone(), SlideEffect::default()))
            .collect();
        ShowConfig::new(None, slides, Vec::new(), true, NonZeroU32::MIN)
    }

    fn write_png(dir: &Path, name: &str, w: u32, h: u32, px: [u8; 4]) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba(px)).save(&path).unwrap();
        path
    }

    #[test]
    fn applies_orientation_six() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(ORIENT6_JPEG)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orient6.jpg");
        std::fs::write(&path, &bytes).unwrap();
        let img = decode_rgba8_apply_exif(&path).unwrap();
        assert_eq!(img.dimensions(), (1, 2));
    }

    #[test]
    fn slides_are_stretched_to_the_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 30, 10, [255, 0, 0, 255]);
        let b = write_png(dir.path(), "b.png", 60, 40, [0, 255, 0, 255]);
        let deck = SlideDeck::load(&show_of(&[a, b]), (60, 40)).unwrap();
        assert_eq!(deck.len(), 2);
        assert_eq!(deck.get(0).dimensions(), (60, 40));
        assert_eq!(*deck.get(1).get_pixel(5, 5), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn undecodable_slide_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.jpg");
        std::fs::write(&bad, b"not a jpeg").unwrap();
        let err = SlideDeck::load(&show_of(&[bad.clone()]), (10, 10)).unwrap_err();
        match err {
            Error::SlideDecode { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_show_has_no_deck() {
        assert!(matches!(
            SlideDeck::load(&show_of(&[]), (10, 10)),
            Err(Error::EmptyShow)
        ));
        assert!(matches!(
            SlideDeck::from_images(Vec::new(), (10, 10)),
            Err(Error::EmptyShow)
        ));
    }

    #[tokio::test]
    async fn async_load_keeps_slide_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5u8)
            .map(|i| write_png(dir.path(), &format!("{i}.png"), 4, 4, [i, 0, 0, 255]))
            .collect();
        let deck = SlideDeck::load_async(&show_of(&paths), (4, 4), 2)
            .await
            .unwrap();
        for i in 0..5u8 {
            assert_eq!(deck.get(usize::from(i)).get_pixel(0, 0)[0], i);
        }
    }
}
