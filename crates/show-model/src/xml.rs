//! The authoritative XML show format.
//!
//! ```xml
//! <presentation imageFolder="/photos">
//!   <slideMaster timer="5">
//!     <slide id="0" image="/photos/a.jpg" effect="WipeLeft" effectTimer="2"/>
//!     <audio id="0" sound="/music/a.wav"/>
//!   </slideMaster>
//! </presentation>
//! ```
//!
//! `timer="0"` marks a manually advanced show.

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::{EffectKind, ShowConfig, ShowFileError, Slide, SlideEffect};

const PRESENTATION: &str = "presentation";
const SLIDE_MASTER: &str = "slideMaster";
const SLIDE: &str = "slide";
const AUDIO: &str = "audio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Document,
    Presentation,
    Master,
}

pub fn read_file(path: impl AsRef<Path>) -> Result<ShowConfig, ShowFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ShowFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_str(&text)
}

pub fn read_str(document: &str) -> Result<ShowConfig, ShowFileError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut scope = Scope::Document;
    let mut image_folder: Option<Option<PathBuf>> = None;
    let mut timer: Option<u32> = None;
    let mut slides = Vec::new();
    let mut audio_tracks = Vec::new();

    loop {
        let (element, has_children) = match reader.read_event()? {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::End(end) => {
                scope = match (scope, end.name().as_ref()) {
                    (Scope::Master, name) if name == SLIDE_MASTER.as_bytes() => {
                        Scope::Presentation
                    }
                    (Scope::Presentation, name) if name == PRESENTATION.as_bytes() => {
                        Scope::Document
                    }
                    (scope, _) => scope,
                };
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match (scope, element.name().as_ref()) {
            (Scope::Document, name)
                if name == PRESENTATION.as_bytes() && image_folder.is_none() =>
            {
                let folder = required(&element, PRESENTATION, "imageFolder")?;
                let folder = folder.trim();
                image_folder = Some((!folder.is_empty()).then(|| PathBuf::from(folder)));
                if has_children {
                    scope = Scope::Presentation;
                }
            }
            (Scope::Presentation, name) if name == SLIDE_MASTER.as_bytes() && timer.is_none() => {
                let raw = required(&element, SLIDE_MASTER, "timer")?;
                timer = Some(number(SLIDE_MASTER, "timer", &raw)?);
                if has_children {
                    scope = Scope::Master;
                }
            }
            (Scope::Master, name) if name == SLIDE.as_bytes() => {
                required(&element, SLIDE, "id")?;
                let image = required(&element, SLIDE, "image")?;
                let effect = required(&element, SLIDE, "effect")?;
                let raw_duration = required(&element, SLIDE, "effectTimer")?;
                let duration = number(SLIDE, "effectTimer", &raw_duration)?;
                let effect = SlideEffect::from_secs(EffectKind::from_persisted(&effect), duration)
                    .ok_or(ShowFileError::InvalidEffectDuration {
                        slide: slides.len(),
                    })?;
                slides.push(Slide::new(image, effect));
            }
            (Scope::Master, name) if name == AUDIO.as_bytes() => {
                required(&element, AUDIO, "id")?;
                audio_tracks.push(PathBuf::from(required(&element, AUDIO, "sound")?));
            }
            _ => {}
        }
    }

    let image_folder = image_folder.ok_or(ShowFileError::MissingElement(PRESENTATION))?;
    let timer = timer.ok_or(ShowFileError::MissingElement(SLIDE_MASTER))?;
    let (manual_advance, interval) = match NonZeroU32::new(timer) {
        Some(interval) => (false, interval),
        None => (true, NonZeroU32::MIN),
    };

    Ok(ShowConfig::new(
        image_folder,
        slides,
        audio_tracks,
        manual_advance,
        interval,
    ))
}

pub fn write_string(show: &ShowConfig) -> Result<String, ShowFileError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let folder = show
        .image_folder()
        .map(|folder| folder.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut presentation = BytesStart::new(PRESENTATION);
    presentation.push_attribute(("imageFolder", folder.as_str()));
    writer.write_event(Event::Start(presentation))?;

    let timer = if show.manual_advance() {
        0
    } else {
        show.interval_secs()
    };
    let mut master = BytesStart::new(SLIDE_MASTER);
    master.push_attribute(("timer", timer.to_string().as_str()));
    writer.write_event(Event::Start(master))?;

    for (id, slide) in show.slides().iter().enumerate() {
        let image = slide.image.to_string_lossy();
        let mut element = BytesStart::new(SLIDE);
        element.push_attribute(("id", id.to_string().as_str()));
        element.push_attribute(("image", image.as_ref()));
        element.push_attribute(("effect", slide.effect.kind().as_str()));
        element.push_attribute((
            "effectTimer",
            slide.effect.duration_secs().to_string().as_str(),
        ));
        writer.write_event(Event::Empty(element))?;
    }

    for (id, track) in show.audio_tracks().iter().enumerate() {
        let sound = track.to_string_lossy();
        let mut element = BytesStart::new(AUDIO);
        element.push_attribute(("id", id.to_string().as_str()));
        element.push_attribute(("sound", sound.as_ref()));
        writer.write_event(Event::Empty(element))?;
    }

    writer.write_event(Event::End(BytesEnd::new(SLIDE_MASTER)))?;
    writer.write_event(Event::End(BytesEnd::new(PRESENTATION)))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Saves `show`, appending `.xml` when the target lacks it. Returns the path written.
pub fn write_file(path: impl AsRef<Path>, show: &ShowConfig) -> Result<PathBuf, ShowFileError> {
    let path = path.as_ref();
    let target = if has_xml_extension(path) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".xml");
        PathBuf::from(name)
    };
    let document = write_string(show)?;
    fs::write(&target, document).map_err(|source| ShowFileError::Io {
        path: target.clone(),
        source,
    })?;
    Ok(target)
}

pub(crate) fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

fn required(
    element: &BytesStart<'_>,
    name: &'static str,
    attribute: &'static str,
) -> Result<String, ShowFileError> {
    match element.try_get_attribute(attribute)? {
        Some(value) => Ok(value.unescape_value()?.into_owned()),
        None => Err(ShowFileError::MissingAttribute {
            element: name,
            attribute,
        }),
    }
}

fn number(element: &'static str, attribute: &'static str, raw: &str) -> Result<u32, ShowFileError> {
    raw.trim()
        .parse()
        .map_err(|_| ShowFileError::InvalidNumber {
            element,
            attribute,
            value: raw.to_string(),
        })
}
