use crate::error::{ErrorKind, Result};
use crate::{LayoutEngine, Renderer, style::CssVariables};
use exn::ResultExt;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const HEAD_CLOSE: &[u8] = b"</head";

impl Renderer {
    /// Lays out `html` as a PDF and returns its bytes.
    #[instrument(skip_all, fields(html_size = html.len()))]
    pub fn render_pdf(&self, html: &str, variables: &CssVariables, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let workdir = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
        let input = workdir.path().join("book.html");
        let output = workdir.path().join("book.pdf");
        let mut file = std::fs::File::create(&input).or_raise(|| ErrorKind::Io)?;
        let blocks = self.write_with_styles(&mut file, html.as_bytes(), variables)?;
        file.flush().or_raise(|| ErrorKind::Io)?;
        drop(file);
        tracing::debug!(blocks, "Custom CSS stylesheets injected into HTML");
        self.chrome.print_to_pdf(workdir.path(), &input, &output, self.timeout, cancel)?;
        std::fs::read(&output).or_raise(|| ErrorKind::Io)
    }

    /// Copies `html` to `w` with the stylesheets spliced in before `</head>`.
    /// Documents without a head get their styles prepended.
    fn write_with_styles(&self, w: &mut impl Write, html: &[u8], variables: &CssVariables) -> Result<usize> {
        let position = html.windows(HEAD_CLOSE.len()).position(|window| window.eq_ignore_ascii_case(HEAD_CLOSE));
        if position.is_none() {
            tracing::warn!("Closing head tag not found; prepending stylesheets");
        }
        let (before, after) = html.split_at(position.unwrap_or(0));
        w.write_all(before).or_raise(|| ErrorKind::Io)?;
        let mut blocks = 0;
        if !variables.is_empty() {
            write!(w, "{variables}").or_raise(|| ErrorKind::Io)?;
            blocks += 1;
        }
        blocks += self.styles.write_all_to(w).or_raise(|| ErrorKind::Io)?;
        w.write_all(after).or_raise(|| ErrorKind::Io)?;
        Ok(blocks)
    }
}

impl LayoutEngine for Renderer {
    fn render(&self, html: &str, variables: &CssVariables, cancel: &CancellationToken) -> Result<Vec<u8>> {
        self.render_pdf(html, variables, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StyleConfig;
    use crate::chrome::Chrome;
    use std::path::PathBuf;
    use std::time::Duration;

    fn renderer() -> Renderer {
        Renderer {
            chrome: Chrome::Binary { path: PathBuf::from("chrome") },
            styles: StyleConfig::new().with_content("p{}"),
            timeout: Duration::from_secs(1),
        }
    }

    fn spliced(html: &str, variables: &CssVariables) -> String {
        let mut out = Vec::new();
        renderer().write_with_styles(&mut out, html.as_bytes(), variables).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn injects_before_the_closing_head() {
        let html = spliced("<html><head><title>x</title></HEAD><body></body></html>", &CssVariables::default());
        assert_eq!(html, "<html><head><title>x</title><style>p{}</style>\n</HEAD><body></body></html>");
    }

    #[test]
    fn variables_come_before_stylesheets() {
        let variables: CssVariables = [("title", "T")].into_iter().collect();
        let html = spliced("<head></head>", &variables);
        let vars_at = html.find("--book-title").unwrap();
        let style_at = html.find("p{}").unwrap();
        assert!(vars_at < style_at);
    }

    #[test]
    fn prepends_without_a_head() {
        let html = spliced("<p>bare</p>", &CssVariables::default());
        assert!(html.starts_with("<style>p{}</style>"));
        assert!(html.ends_with("<p>bare</p>"));
    }
}
