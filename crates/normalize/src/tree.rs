//! The canonical chapter representation and its serialization.

use std::fmt::Write;

/// One chapter's body after normalization.
///
/// Only the shapes below survive: paragraphs of (possibly emphasised) text,
/// images, and explicit breaks. Attributes other than `style` and image size
/// are gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterTree {
    pub id: u64,
    pub title: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Block {
    Paragraph { style: Option<String>, content: Vec<Inline> },
    Image(ImageRef),
    Break { style: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Inline {
    Text(String),
    Styled { emphasis: Emphasis, children: Vec<Inline> },
    LineBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emphasis {
    Bold,
    Italic,
    Underline,
    Strong,
    Emphasis,
}
impl Emphasis {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "b" => Self::Bold,
            "i" => Self::Italic,
            "u" => Self::Underline,
            "strong" => Self::Strong,
            "em" => Self::Emphasis,
            _ => return None,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Bold => "b",
            Self::Italic => "i",
            Self::Underline => "u",
            Self::Strong => "strong",
            Self::Emphasis => "em",
        }
    }
}

/// An image referenced by a chapter. `src` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub src: String,
    pub width: Option<String>,
    pub height: Option<String>,
    pub style: Option<String>,
}

impl ChapterTree {
    /// A chapter with no body, used when the archive lacks its markup.
    pub fn empty(id: u64, title: impl Into<String>) -> Self {
        Self { id, title: title.into(), blocks: Vec::new() }
    }

    /// Images in tree order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Image(image) => Some(image),
            _ => None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }

    /// Serializes the chapter as a heading followed by a body section.
    ///
    /// `resolve` is called with each image's position (in tree order) and
    /// returns the `src` to emit. Returning `None` omits the image together
    /// with the break that follows it. The output is well-formed XHTML.
    pub fn to_html(&self, resolve: impl FnMut(usize, &ImageRef) -> Option<String>) -> String {
        let mut out = String::new();
        out.push_str("<h1 class=\"chapter-name\" id=\"");
        escape_into(&mut out, &self.id.to_string(), true);
        out.push_str("\">");
        escape_into(&mut out, &self.title, false);
        out.push_str("</h1>\n<section class=\"chapter-body\">\n");
        out.push_str(&self.body_html(resolve));
        out.push_str("</section>\n");
        out
    }

    /// Serializes only the body blocks, one per line.
    pub fn body_html(&self, mut resolve: impl FnMut(usize, &ImageRef) -> Option<String>) -> String {
        let mut out = String::new();
        let mut image_index = 0;
        let mut skip_break = false;
        for block in &self.blocks {
            match block {
                Block::Paragraph { style, content } => {
                    skip_break = false;
                    out.push_str("<p");
                    push_style(&mut out, style.as_deref());
                    out.push('>');
                    for inline in content {
                        inline_into(&mut out, inline);
                    }
                    out.push_str("</p>\n");
                },
                Block::Image(image) => {
                    let src = resolve(image_index, image);
                    image_index += 1;
                    let Some(src) = src else {
                        skip_break = true;
                        continue;
                    };
                    skip_break = false;
                    out.push_str("<img src=\"");
                    escape_into(&mut out, &src, true);
                    out.push('"');
                    for (name, value) in [("width", &image.width), ("height", &image.height)] {
                        if let Some(value) = value {
                            let _ = write!(out, " {name}=\"");
                            escape_into(&mut out, value, true);
                            out.push('"');
                        }
                    }
                    push_style(&mut out, image.style.as_deref());
                    out.push_str(" alt=\"\"/>\n");
                },
                Block::Break { style } => {
                    if std::mem::take(&mut skip_break) {
                        continue;
                    }
                    out.push_str("<br");
                    push_style(&mut out, style.as_deref());
                    out.push_str("/>\n");
                },
            }
        }
        out
    }
}

fn push_style(out: &mut String, style: Option<&str>) {
    if let Some(style) = style {
        out.push_str(" style=\"");
        escape_into(out, style, true);
        out.push('"');
    }
}

fn inline_into(out: &mut String, inline: &Inline) {
    match inline {
        Inline::Text(text) => escape_into(out, text, false),
        Inline::LineBreak => out.push_str("<br/>"),
        Inline::Styled { emphasis, children } => {
            let _ = write!(out, "<{}>", emphasis.tag());
            for child in children {
                inline_into(out, child);
            }
            let _ = write!(out, "</{}>", emphasis.tag());
        },
    }
}

/// XML-escapes `text` onto `out`. Quotes are only escaped inside attributes.
pub fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text, true);
    out
}
