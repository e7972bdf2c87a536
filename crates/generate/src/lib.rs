//! Document generators.
//!
//! A [`Manuscript`] collects everything one work needs (metadata, normalized
//! chapters, cover, optional avatar, badge and images) and a [`Generator`] turns it
//! into a [`GeneratedDocument`]. [`EpubGenerator`] writes an e-book
//! container; [`PdfGenerator`] populates the book template, lays it out and
//! patches the document metadata.

mod assets;
mod epub;
pub mod error;
mod filename;
mod licensing;
mod media;
mod pdf;

pub use crate::epub::EpubGenerator;
use crate::error::Result;
pub use crate::filename::{document_filename, slug};
pub use crate::licensing::LicensingPolicy;
pub use crate::media::ImageFormat;
pub use crate::pdf::{PdfGenerator, PdfToolchain};
use tokio_util::sync::CancellationToken;
use wpd_normalize::ChapterTree;
use wpd_source::models::Work;

/// Fetched bytes for each image of one chapter, in tree order. `None` marks
/// an image that could not be fetched.
pub type ChapterImages = Vec<Option<Vec<u8>>>;

/// Everything a generator needs for one work.
#[derive(Debug, Clone)]
pub struct Manuscript {
    pub work: Work,
    /// Live chapters in work order.
    pub chapters: Vec<ChapterTree>,
    pub cover: Vec<u8>,
    pub avatar: Option<Vec<u8>>,
    /// Licensing badge, fetched ahead of time so the document carries no
    /// remote references of its own.
    pub badge: Option<Vec<u8>>,
    /// Per-chapter image bytes, parallel to `chapters`. `None` when images
    /// were not requested, in which case references stay external.
    pub images: Option<Vec<ChapterImages>>,
}

/// Where an image node should point once the document is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageSource<'a> {
    /// Images were not requested; keep the remote locator.
    External,
    Embedded(&'a [u8]),
    /// The fetch failed; leave the image out.
    Missing,
}

impl Manuscript {
    pub fn with_images(&self) -> bool {
        self.images.is_some()
    }

    pub(crate) fn image(&self, chapter: usize, index: usize) -> ImageSource<'_> {
        let Some(images) = &self.images else {
            return ImageSource::External;
        };
        match images.get(chapter).and_then(|c| c.get(index)) {
            Some(Some(bytes)) if !bytes.is_empty() => ImageSource::Embedded(bytes),
            _ => ImageSource::Missing,
        }
    }

    pub(crate) fn filename(&self, extension: &str) -> String {
        document_filename(&self.work.title, self.work.id, self.with_images(), extension)
    }
}

/// A finished document ready to be streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub filename: String,
}

/// Two-step contract shared by all output formats.
pub trait Generator: Send {
    /// Builds the document. Calling it again after success does nothing.
    ///
    /// `cancel` is checked between stages and reaches any external process,
    /// which is killed once it fires; compilation then fails with
    /// [`ErrorKind::Cancelled`](error::ErrorKind::Cancelled).
    fn compile(&mut self, cancel: &CancellationToken) -> Result<()>;
    /// Returns the compiled document, or
    /// [`ErrorKind::NotCompiled`](error::ErrorKind::NotCompiled) before
    /// [`compile`](Self::compile) has succeeded.
    fn dump(&self) -> Result<GeneratedDocument>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use time::macros::datetime;
    use wpd_source::models::{Author, Chapter, Language};

    pub fn work(copyright: u8) -> Work {
        Work {
            id: 372219540,
            title: "Ganesha's Tales".into(),
            create_date: datetime!(2024-08-14 16:01:58 UTC),
            modify_date: datetime!(2024-09-01 08:00:00 UTC),
            language: Language::new("English"),
            user: Author {
                username: "storyteller".into(),
                avatar: "https://img.example.com/useravatar/storyteller.128.jpg".into(),
                description: "Writes things.\nReads things.".into(),
            },
            description: "A short collection.\nOf tales.".into(),
            cover: "https://img.example.com/cover/1.jpg".into(),
            completed: true,
            tags: vec!["mythology".into(), "shortstory".into()],
            mature: false,
            url: "https://www.example.com/story/372219540".into(),
            parts: vec![Chapter::new(1458516761, "Ganesh")],
            is_paywalled: false,
            copyright,
        }
    }

    pub const CHAPTER_HTML: &str = r#"<p>Once upon a time.</p>
<p><img src="https://img.example.com/a.jpg"></p>
<p>Middle.</p>
<p><img src="https://img.example.com/b.jpg"></p>
<p><img src="https://img.example.com/c.jpg"></p>
<p>The end.</p>"#;

    pub fn manuscript(images: Option<Vec<ChapterImages>>) -> Manuscript {
        Manuscript {
            work: work(3),
            chapters: vec![wpd_normalize::normalize(1458516761, "Ganesh", CHAPTER_HTML)],
            cover: b"\x89PNG\r\n\x1a\ncover".to_vec(),
            avatar: Some(vec![0xFF, 0xD8, 0xFF, 0xE0]),
            badge: Some(b"\x89PNG\r\n\x1a\nbadge".to_vec()),
            images,
        }
    }

    /// Three parts with the middle one deleted. Only live chapters reach a
    /// manuscript.
    pub fn three_parts() -> Manuscript {
        let mut withdrawn = Chapter::new(2, "Withdrawn");
        withdrawn.deleted = true;
        let mut work = work(3);
        work.parts = vec![Chapter::new(1, "Ganesh"), withdrawn, Chapter::new(3, "Kartikeya")];
        Manuscript {
            work,
            chapters: vec![
                wpd_normalize::normalize(1, "Ganesh", "<p>The elephant-headed one.</p>"),
                wpd_normalize::normalize(3, "Kartikeya", "<p>The commander.</p>"),
            ],
            images: None,
            ..manuscript(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_sources() {
        let external = fixtures::manuscript(None);
        assert_eq!(external.image(0, 0), ImageSource::External);

        let resolved = fixtures::manuscript(Some(vec![vec![Some(b"a".to_vec()), None, Some(Vec::new())]]));
        assert_eq!(resolved.image(0, 0), ImageSource::Embedded(b"a"));
        assert_eq!(resolved.image(0, 1), ImageSource::Missing);
        assert_eq!(resolved.image(0, 2), ImageSource::Missing);
        assert_eq!(resolved.image(1, 0), ImageSource::Missing);
    }

    #[test]
    fn filename_marks_images() {
        assert_eq!(fixtures::manuscript(None).filename("epub"), "ganeshas-tales_372219540.epub");
        assert_eq!(fixtures::manuscript(Some(vec![])).filename("pdf"), "ganeshas-tales_372219540_images.pdf");
    }
}
