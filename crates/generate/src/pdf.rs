//! Paginated output: populate the book template, lay it out, patch metadata.

use crate::error::{ErrorKind, Result};
use crate::media::ImageFormat;
use crate::{GeneratedDocument, Generator, ImageSource, LicensingPolicy, Manuscript, assets};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use time::macros::format_description;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use upon::{Engine, Template, Value};
use wpd_normalize::truncate_bio;
use wpd_render::{CssVariables, DocumentMetadata, ExifTool, LayoutEngine, MetadataPatcher, Renderer, StyleConfig};

pub(crate) const MEDIA_TYPE: &str = "application/pdf";
const PRODUCER: &str = concat!("wpd ", env!("CARGO_PKG_VERSION"));

/// The external programs and the compiled template shared by every PDF
/// request. Built once at start-up.
pub struct PdfToolchain {
    layout: Arc<dyn LayoutEngine>,
    patcher: Arc<dyn MetadataPatcher>,
    engine: Engine<'static>,
    template: Template<'static>,
    bio_max_chars: usize,
}

impl PdfToolchain {
    pub fn new(layout: Arc<dyn LayoutEngine>, patcher: Arc<dyn MetadataPatcher>, bio_max_chars: usize) -> Result<Self> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        // Compile the template early so we can fail-fast in construction.
        let template = engine.compile(assets::load("book.html")?).or_raise(|| ErrorKind::Template)?;
        Ok(Self { layout, patcher, engine, template, bio_max_chars })
    }

    /// Finds Chrome and ExifTool on this system.
    pub fn discover(bio_max_chars: usize) -> Result<Self> {
        let styles = StyleConfig::new().with_builtin("book.css").or_raise(|| ErrorKind::Render)?;
        let renderer = Renderer::new(styles).or_raise(|| ErrorKind::Render)?;
        let exiftool = ExifTool::discover().or_raise(|| ErrorKind::Tagging)?;
        Self::new(Arc::new(renderer), Arc::new(exiftool), bio_max_chars)
    }
}

/// Builds a PDF from a [`Manuscript`] using a shared [`PdfToolchain`].
pub struct PdfGenerator {
    manuscript: Manuscript,
    toolchain: Arc<PdfToolchain>,
    output: Option<Vec<u8>>,
}

impl PdfGenerator {
    pub fn new(manuscript: Manuscript, toolchain: Arc<PdfToolchain>) -> Self {
        Self { manuscript, toolchain, output: None }
    }

    fn data_uri(bytes: &[u8]) -> String {
        format!("data:{};base64,{}", ImageFormat::sniff(bytes).media_type(), STANDARD.encode(bytes))
    }

    /// Chapter markup with resolved images inlined as data URIs.
    fn chapters(&self) -> Vec<Value> {
        self.manuscript
            .chapters
            .iter()
            .enumerate()
            .map(|(cidx, tree)| {
                let html = tree.to_html(|idx, image| match self.manuscript.image(cidx, idx) {
                    ImageSource::External => Some(image.src.clone()),
                    ImageSource::Embedded(bytes) => Some(Self::data_uri(bytes)),
                    ImageSource::Missing => None,
                });
                upon::value! {
                    id: tree.id.to_string(),
                    title: tree.title.as_str(),
                    html: html,
                }
            })
            .collect()
    }

    fn populate(&self) -> Result<String> {
        let work = &self.manuscript.work;
        let license = LicensingPolicy::lookup(work.copyright).ok_or_raise(|| ErrorKind::UnknownLicense(work.copyright))?;
        let bio = truncate_bio(&work.user.description, self.toolchain.bio_max_chars);
        let context = upon::value! {
            language: work.language.tag(),
            title: work.title.as_str(),
            author: work.user.username.as_str(),
            url: work.url.as_str(),
            cover: Self::data_uri(&self.manuscript.cover),
            avatar: embedded(&self.manuscript.avatar),
            license: upon::value! {
                name: license.name,
                statement: license.statement_for(&work.user.username, work.published_year()),
                freedoms: license.freedoms,
                printing: license.printing,
                badge: embedded(&self.manuscript.badge),
            },
            bio: Value::List(bio.lines().map(Value::from).collect()),
            chapters: Value::List(self.chapters()),
        };
        self.toolchain.template.render(&self.toolchain.engine, context).to_string().or_raise(|| ErrorKind::Template)
    }

    fn metadata(&self) -> Result<DocumentMetadata> {
        let work = &self.manuscript.work;
        let exif_date = format_description!(
            "[year]:[month]:[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
        );
        Ok(DocumentMetadata {
            title: work.title.clone(),
            author: work.user.username.clone(),
            subject: work.description.clone(),
            creation_date: work.create_date.format(exif_date).or_raise(|| ErrorKind::Tagging)?,
            modify_date: work.modify_date.format(exif_date).or_raise(|| ErrorKind::Tagging)?,
            keywords: work.tags.clone(),
            language: work.language.name.clone(),
            completed: work.completed,
            mature: work.mature,
            producer: PRODUCER.to_string(),
        })
    }
}

/// Optional image bytes as a data URI; empty bytes count as absent.
fn embedded(bytes: &Option<Vec<u8>>) -> Option<String> {
    bytes.as_deref().filter(|b| !b.is_empty()).map(PdfGenerator::data_uri)
}

/// Maps a failed external stage, keeping cancellation distinct from failure.
fn stage_failure(err: wpd_render::error::Error, kind: ErrorKind) -> crate::error::Error {
    match &*err {
        wpd_render::error::ErrorKind::Cancelled => err.raise(ErrorKind::Cancelled),
        _ => err.raise(kind),
    }
}

impl Generator for PdfGenerator {
    #[instrument(skip_all, fields(work_id = self.manuscript.work.id, chapters = self.manuscript.chapters.len()))]
    fn compile(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.output.is_some() {
            return Ok(());
        }
        let html = self.populate()?;
        let metadata = self.metadata()?;
        let variables: CssVariables =
            [("title", metadata.title.as_str()), ("author", metadata.author.as_str())].into_iter().collect();
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let rendered = self
            .toolchain
            .layout
            .render(&html, &variables, cancel)
            .map_err(|err| stage_failure(err, ErrorKind::Render))?;
        tracing::debug!(html_size = html.len(), pdf_size = rendered.len(), "Document laid out");
        if cancel.is_cancelled() {
            tracing::debug!("Cancelled after layout; skipping metadata patch");
            exn::bail!(ErrorKind::Cancelled);
        }
        let patched = self
            .toolchain
            .patcher
            .patch(&rendered, &metadata, cancel)
            .map_err(|err| stage_failure(err, ErrorKind::Tagging))?;
        self.output = Some(patched);
        Ok(())
    }

    fn dump(&self) -> Result<GeneratedDocument> {
        let bytes = self.output.clone().ok_or_raise(|| ErrorKind::NotCompiled)?;
        Ok(GeneratedDocument { bytes, media_type: MEDIA_TYPE, filename: self.manuscript.filename("pdf") })
    }
}

/// Custom [`upon`] extensions for the book template.
mod addons {
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Escapes strings for HTML text and attribute positions.
    fn escape_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => write!(f, "{}", wpd_normalize::escape(s))?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("escape", escape_formatter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::sync::Mutex;

    /// Returns the HTML it was given so tests can inspect it. With
    /// `cancels` set it also fires the token, as a client hanging up during
    /// layout would.
    #[derive(Default)]
    struct EchoLayout {
        variables: Mutex<Option<CssVariables>>,
        cancels: bool,
    }
    impl LayoutEngine for EchoLayout {
        fn render(
            &self,
            html: &str,
            variables: &CssVariables,
            cancel: &CancellationToken,
        ) -> wpd_render::error::Result<Vec<u8>> {
            *self.variables.lock().unwrap() = Some(variables.clone());
            if self.cancels {
                cancel.cancel();
            }
            Ok(html.as_bytes().to_vec())
        }
    }

    /// Behaves like a layout process killed by cancellation.
    struct KilledLayout;
    impl LayoutEngine for KilledLayout {
        fn render(&self, _: &str, _: &CssVariables, _: &CancellationToken) -> wpd_render::error::Result<Vec<u8>> {
            exn::bail!(wpd_render::error::ErrorKind::Cancelled);
        }
    }

    #[derive(Default)]
    struct RecordingPatcher {
        seen: Mutex<Option<DocumentMetadata>>,
        fail: bool,
    }
    impl MetadataPatcher for RecordingPatcher {
        fn patch(
            &self,
            pdf: &[u8],
            metadata: &DocumentMetadata,
            _: &CancellationToken,
        ) -> wpd_render::error::Result<Vec<u8>> {
            if self.fail {
                exn::bail!(wpd_render::error::ErrorKind::TaggingFailed(1));
            }
            *self.seen.lock().unwrap() = Some(metadata.clone());
            Ok(pdf.to_vec())
        }
    }

    fn toolchain(patcher: Arc<RecordingPatcher>, bio_max_chars: usize) -> Arc<PdfToolchain> {
        Arc::new(PdfToolchain::new(Arc::new(EchoLayout::default()), patcher, bio_max_chars).unwrap())
    }

    fn compiled_html(manuscript: Manuscript) -> String {
        let mut generator = PdfGenerator::new(manuscript, toolchain(Arc::default(), 400));
        generator.compile(&CancellationToken::new()).unwrap();
        String::from_utf8(generator.dump().unwrap().bytes).unwrap()
    }

    #[test]
    fn front_matter_is_populated() {
        let html = compiled_html(fixtures::manuscript(None));
        assert!(html.contains("<title>Ganesha&#39;s Tales</title>"));
        assert!(html.contains("© 2024 by storyteller. This work is licensed under a Creative Commons Attribution 4.0"));
        assert!(html.contains("id=\"copyright-badge\" src=\"data:image/png;base64,"));
        assert!(!html.contains("creativecommons.org"));
        assert!(html.contains("<img src=\"data:image/png;base64,"));
        assert!(html.contains("id=\"author-profile-picture\" src=\"data:image/jpeg;base64,"));
        assert!(html.contains("<p>Writes things.</p>"));
        assert!(html.contains("<a href=\"#1458516761\">Ganesh</a>"));
        assert!(html.contains("<h1 class=\"chapter-name\" id=\"1458516761\">Ganesh</h1>"));
    }

    #[test]
    fn missing_badge_is_left_out() {
        let mut manuscript = fixtures::manuscript(None);
        manuscript.badge = None;
        let html = compiled_html(manuscript);
        assert!(!html.contains("copyright-badge"));
        assert!(html.contains("Creative Commons Attribution 4.0"));
    }

    #[test]
    fn table_of_contents_skips_deleted_chapters() {
        let html = compiled_html(fixtures::three_parts());
        let first = html.find("<a href=\"#1\">Ganesh</a>").unwrap();
        let last = html.find("<a href=\"#3\">Kartikeya</a>").unwrap();
        assert!(first < last);
        assert!(!html.contains("href=\"#2\""));
        assert!(!html.contains("Withdrawn"));
        // Chapter bodies follow the same order.
        assert!(html.find("id=\"1\">Ganesh</h1>").unwrap() < html.find("id=\"3\">Kartikeya</h1>").unwrap());
    }

    #[test]
    fn bio_is_truncated_at_line_boundaries() {
        let mut generator = PdfGenerator::new(fixtures::manuscript(None), toolchain(Arc::default(), 20));
        generator.compile(&CancellationToken::new()).unwrap();
        let html = String::from_utf8(generator.dump().unwrap().bytes).unwrap();
        assert!(html.contains("<p>Writes things.</p>"));
        assert!(!html.contains("Reads things."));
    }

    #[test]
    fn missing_avatar_is_left_out() {
        let mut manuscript = fixtures::manuscript(None);
        manuscript.avatar = None;
        assert!(!compiled_html(manuscript).contains("author-profile-picture"));
    }

    #[test]
    fn failed_images_are_omitted() {
        let images = vec![vec![Some(vec![0xFF, 0xD8, 0xFF]), None, Some(b"GIF89a".to_vec())]];
        let html = compiled_html(fixtures::manuscript(Some(images)));
        let chapter = &html[html.find("<article").unwrap()..];
        assert_eq!(chapter.matches("<img").count(), 2);
        assert!(chapter.contains("src=\"data:image/jpeg;base64,/9j/\""));
        assert!(chapter.contains("src=\"data:image/gif;base64,"));
        assert!(!chapter.contains("img.example.com"));
    }

    #[test]
    fn metadata_is_patched_after_layout() {
        let patcher = Arc::new(RecordingPatcher::default());
        let mut generator = PdfGenerator::new(fixtures::manuscript(None), toolchain(patcher.clone(), 400));
        generator.compile(&CancellationToken::new()).unwrap();
        let document = generator.dump().unwrap();
        assert_eq!(document.media_type, "application/pdf");
        assert_eq!(document.filename, "ganeshas-tales_372219540.pdf");

        let metadata = patcher.seen.lock().unwrap().clone().unwrap();
        assert_eq!(metadata.title, "Ganesha's Tales");
        assert_eq!(metadata.author, "storyteller");
        assert_eq!(metadata.creation_date, "2024:08:14 16:01:58+00:00");
        assert_eq!(metadata.keywords, vec!["mythology", "shortstory"]);
        assert_eq!(metadata.language, "English");
        assert!(metadata.completed);
        assert!(!metadata.mature);
    }

    #[test]
    fn css_variables_carry_title_and_author() {
        let layout = Arc::new(EchoLayout::default());
        let toolchain = Arc::new(PdfToolchain::new(layout.clone(), Arc::new(RecordingPatcher::default()), 400).unwrap());
        PdfGenerator::new(fixtures::manuscript(None), toolchain).compile(&CancellationToken::new()).unwrap();
        let variables = layout.variables.lock().unwrap().clone().unwrap().to_string();
        assert!(variables.contains("--book-title: \"Ganesha's Tales\";"));
        assert!(variables.contains("--book-author: \"storyteller\";"));
    }

    #[test]
    fn patch_failure_fails_compilation() {
        let patcher = Arc::new(RecordingPatcher { fail: true, ..Default::default() });
        let mut generator = PdfGenerator::new(fixtures::manuscript(None), toolchain(patcher, 400));
        let err = generator.compile(&CancellationToken::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Tagging));
        assert!(matches!(&*generator.dump().unwrap_err(), ErrorKind::NotCompiled));
    }

    #[test]
    fn cancellation_during_layout_skips_the_patch() {
        let layout = Arc::new(EchoLayout { cancels: true, ..Default::default() });
        let patcher = Arc::new(RecordingPatcher::default());
        let toolchain = Arc::new(PdfToolchain::new(layout, patcher.clone(), 400).unwrap());
        let mut generator = PdfGenerator::new(fixtures::manuscript(None), toolchain);
        let cancel = CancellationToken::new();
        let err = generator.compile(&cancel).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(patcher.seen.lock().unwrap().is_none());
        assert!(matches!(&*generator.dump().unwrap_err(), ErrorKind::NotCompiled));
    }

    #[test]
    fn killed_layout_is_reported_as_cancelled() {
        let toolchain = Arc::new(PdfToolchain::new(Arc::new(KilledLayout), Arc::new(RecordingPatcher::default()), 400).unwrap());
        let mut generator = PdfGenerator::new(fixtures::manuscript(None), toolchain);
        let err = generator.compile(&CancellationToken::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
    }

    #[test]
    fn cancelled_before_layout() {
        let layout = Arc::new(EchoLayout::default());
        let toolchain = Arc::new(PdfToolchain::new(layout.clone(), Arc::new(RecordingPatcher::default()), 400).unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PdfGenerator::new(fixtures::manuscript(None), toolchain).compile(&cancel).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(layout.variables.lock().unwrap().is_none());
    }

    #[test]
    fn unknown_license_is_a_configuration_error() {
        let mut manuscript = fixtures::manuscript(None);
        manuscript.work.copyright = 0;
        let mut generator = PdfGenerator::new(manuscript, toolchain(Arc::default(), 400));
        let err = generator.compile(&CancellationToken::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownLicense(0)));
    }
}
