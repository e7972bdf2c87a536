//! EPUB 3 output built on `epub-builder`, followed by a pass over the
//! finished archive for the package metadata the builder has no setter for.

use crate::error::{ErrorKind, Result};
use crate::media::ImageFormat;
use crate::{GeneratedDocument, Generator, ImageSource, LicensingPolicy, Manuscript, assets};
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use exn::{OptionExt, ResultExt};
use std::fmt::Display;
use std::io::{Cursor, Read, Write};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use wpd_normalize::escape;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub(crate) const MEDIA_TYPE: &str = "application/epub+zip";
const PACKAGE_DOCUMENT: &str = "OEBPS/content.opf";
const GENERATOR: &str = concat!("wpd ", env!("CARGO_PKG_VERSION"));

/// `epub-builder` reports failures as a bare message.
fn builder<T, E: Display>(result: std::result::Result<T, E>) -> Result<T> {
    result.map_err(|err| {
        tracing::debug!(error = %err, "EPUB builder rejected the document");
        exn::Exn::new(ErrorKind::Archive)
    })
}

/// A resolved image, stored at `static/{chapter}/{position}.{ext}`.
struct Resource {
    href: String,
    media_type: &'static str,
    data: Vec<u8>,
}

/// One chapter document and the images it references.
struct Section {
    href: String,
    title: String,
    xhtml: String,
    images: Vec<Resource>,
}

/// Builds an EPUB from a [`Manuscript`].
pub struct EpubGenerator {
    manuscript: Manuscript,
    output: Option<Vec<u8>>,
}

impl EpubGenerator {
    pub fn new(manuscript: Manuscript) -> Self {
        Self { manuscript, output: None }
    }

    fn language(&self) -> &str {
        self.manuscript.work.language.tag()
    }

    /// Wraps body markup in an XHTML document linked to the builder's
    /// stylesheet.
    fn xhtml(&self, title: &str, body: &str) -> String {
        let lang = escape(self.language());
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" xml:lang=\"{lang}\" lang=\"{lang}\">\n<head>\n<meta charset=\"UTF-8\"/>\n<title>{}</title>\n<link rel=\"stylesheet\" type=\"text/css\" href=\"stylesheet.css\"/>\n</head>\n<body>\n{body}</body>\n</html>\n",
            escape(title)
        )
    }

    /// Chapters in work order, each named `{position}_{chapter id}.xhtml`.
    fn sections(&self) -> Vec<Section> {
        self.manuscript
            .chapters
            .iter()
            .enumerate()
            .map(|(cidx, tree)| {
                let mut images = Vec::new();
                let body = tree.to_html(|idx, image| match self.manuscript.image(cidx, idx) {
                    ImageSource::External => Some(image.src.clone()),
                    ImageSource::Missing => None,
                    ImageSource::Embedded(bytes) => {
                        let format = ImageFormat::sniff(bytes);
                        let href = format!("static/{cidx}/{idx}.{}", format.extension());
                        images.push(Resource { href: href.clone(), media_type: format.media_type(), data: bytes.to_vec() });
                        Some(href)
                    },
                });
                Section {
                    href: format!("{cidx}_{}.xhtml", tree.id),
                    title: tree.title.clone(),
                    xhtml: self.xhtml(&tree.title, &body),
                    images,
                }
            })
            .collect()
    }

    fn build(&self) -> Result<Vec<u8>> {
        let work = &self.manuscript.work;
        let mut book = builder(EpubBuilder::new(builder(ZipLibrary::new())?))?;
        book.epub_version(EpubVersion::V30);
        builder(book.metadata("title", work.title.as_str()))?;
        builder(book.metadata("toc_name", work.title.as_str()))?;
        builder(book.metadata("author", work.user.username.as_str()))?;
        builder(book.metadata("lang", self.language()))?;
        builder(book.metadata("description", work.description.as_str()))?;
        builder(book.metadata("generator", GENERATOR))?;
        for tag in &work.tags {
            builder(book.metadata("subject", tag.as_str()))?;
        }
        match LicensingPolicy::lookup(work.copyright) {
            Some(policy) => {
                builder(book.metadata("license", policy.statement_for(&work.user.username, work.published_year())))?;
            },
            None => tracing::debug!(copyright = work.copyright, "Unknown licensing policy; omitting rights"),
        }
        builder(book.stylesheet(assets::load("epub.css")?.as_bytes()))?;

        let cover = ImageFormat::sniff(&self.manuscript.cover);
        let cover_href = format!("cover.{}", cover.extension());
        builder(book.add_cover_image(&cover_href, self.manuscript.cover.as_slice(), cover.media_type()))?;
        let titlepage = self.xhtml(
            &work.title,
            &format!("<div class=\"cover\"><img src=\"{cover_href}\" alt=\"Cover\"/></div>\n"),
        );
        builder(book.add_content(
            EpubContent::new("titlepage.xhtml", titlepage.as_bytes()).reftype(ReferenceType::TitlePage),
        ))?;

        for section in self.sections() {
            for image in &section.images {
                builder(book.add_resource(&image.href, image.data.as_slice(), image.media_type))?;
            }
            builder(book.add_content(
                EpubContent::new(section.href.as_str(), section.xhtml.as_bytes())
                    .title(section.title.as_str())
                    .reftype(ReferenceType::Text),
            ))?;
        }

        let mut bytes = Vec::new();
        builder(book.generate(&mut bytes))?;
        self.annotate(&bytes)
    }

    /// Copies the archive entry by entry, keeping order and compression, and
    /// adds the `tags`, `mature` and `completed` metas to the package
    /// document.
    fn annotate(&self, epub: &[u8]) -> Result<Vec<u8>> {
        let work = &self.manuscript.work;
        let flag = |value: bool| if value { "1" } else { "0" };
        let metas: String = [
            ("tags", work.tags.join(", ")),
            ("mature", flag(work.mature).to_string()),
            ("completed", flag(work.completed).to_string()),
        ]
        .iter()
        .map(|(name, content)| format!("    <meta name=\"{name}\" content=\"{}\"/>\n", escape(content)))
        .collect();

        let mut archive = ZipArchive::new(Cursor::new(epub)).or_raise(|| ErrorKind::Archive)?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(epub.len())));
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).or_raise(|| ErrorKind::Archive)?;
            let name = entry.name().to_string();
            let options = SimpleFileOptions::default().compression_method(entry.compression());
            let mut data = Vec::new();
            entry.read_to_end(&mut data).or_raise(|| ErrorKind::Archive)?;
            if name == PACKAGE_DOCUMENT {
                let package = String::from_utf8(data).or_raise(|| ErrorKind::Archive)?;
                let at = package.find("</metadata>").ok_or_raise(|| ErrorKind::Archive)?;
                data = format!("{}{metas}{}", &package[..at], &package[at..]).into_bytes();
            }
            zip.start_file(name, options).or_raise(|| ErrorKind::Archive)?;
            zip.write_all(&data).or_raise(|| ErrorKind::Archive)?;
        }
        Ok(zip.finish().or_raise(|| ErrorKind::Archive)?.into_inner())
    }
}

impl Generator for EpubGenerator {
    #[instrument(skip_all, fields(work_id = self.manuscript.work.id, chapters = self.manuscript.chapters.len()))]
    fn compile(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.output.is_some() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let started = Instant::now();
        let bytes = self.build()?;
        tracing::debug!(
            size = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "EPUB compiled"
        );
        self.output = Some(bytes);
        Ok(())
    }

    fn dump(&self) -> Result<GeneratedDocument> {
        let bytes = self.output.clone().ok_or_raise(|| ErrorKind::NotCompiled)?;
        Ok(GeneratedDocument { bytes, media_type: MEDIA_TYPE, filename: self.manuscript.filename("epub") })
    }
}
