//! CSS style management for rendered documents.
//!
//! Styles are assembled through [`StyleConfig`]'s builder API, combining
//! compile-time embedded builtins with raw CSS content. Builtins are loaded
//! when added so a missing name fails at start-up rather than per render.

mod assets;
pub(crate) mod variables;

pub use self::variables::CssVariables;
use crate::error::Result;
use crate::style::assets::Builtins;
use std::borrow::Cow;
use std::io::Write;

/// An ordered collection of CSS stylesheets to inject into rendered documents.
///
/// Styles are applied in insertion order; later styles override earlier ones.
///
/// ```rust
/// use wpd_render::StyleConfig;
/// # fn main() -> wpd_render::error::Result<()> {
/// let styles = StyleConfig::new().with_builtin("book.css")?.with_content("p { text-indent: 0; }");
/// assert_eq!(styles.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct StyleConfig {
    styles: Vec<Cow<'static, [u8]>>,
}
impl StyleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all embedded builtin stylesheets (e.g. `"book.css"`).
    pub fn list_builtins() -> Vec<Cow<'static, str>> {
        Builtins::list()
    }

    /// Appends a builtin stylesheet by name.
    ///
    /// Returns [`ErrorKind::AssetNotFound`](crate::error::ErrorKind::AssetNotFound)
    /// if `name` does not match any embedded asset.
    pub fn with_builtin(mut self, name: impl AsRef<str>) -> Result<Self> {
        self.styles.push(Builtins::load(name)?);
        Ok(self)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.styles.push(Cow::Owned(content.into().into_bytes()));
        self
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Writes every stylesheet as its own `<style>` block.
    pub(crate) fn write_all_to(&self, w: &mut impl Write) -> std::io::Result<usize> {
        for style in &self.styles {
            w.write_all(b"<style>")?;
            w.write_all(style)?;
            w.write_all(b"</style>\n")?;
        }
        Ok(self.styles.len())
    }
}
