//! Rebuilds one chapter's raw markup into a [`ChapterTree`].

use crate::consts::{BODY_SELECTOR, DISCARDED_TAGS, HEIGHT_ATTRS, WIDTH_ATTRS, WRAPPER_TAGS};
use crate::tree::{Block, ChapterTree, Emphasis, ImageRef, Inline};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use tracing::instrument;

/// A child of an element, without naming the underlying tree node type.
#[derive(Clone, Copy)]
enum Piece<'a> {
    Text(&'a str),
    Element(ElementRef<'a>),
}
impl<'a> Piece<'a> {
    fn children_of(element: ElementRef<'a>) -> Vec<Piece<'a>> {
        element
            .children()
            .filter_map(|node| match node.value() {
                Node::Text(text) => Some(Piece::Text(&**text)),
                Node::Element(_) => ElementRef::wrap(node).map(Piece::Element),
                _ => None,
            })
            .collect()
    }

    fn is_break(&self) -> bool {
        matches!(self, Piece::Element(el) if el.value().name() == "br")
    }

    fn is_wrapper(&self) -> bool {
        matches!(self, Piece::Element(el) if WRAPPER_TAGS.contains(&el.value().name()))
    }

    fn is_blank(&self) -> bool {
        matches!(self, Piece::Text(text) if text.trim().is_empty())
    }
}

/// Inline content or an image lifted out of it.
enum Segment {
    Inline(Inline),
    Image(ImageRef),
}

/// Normalizes one chapter's raw markup.
///
/// Deterministic: identical input always yields an identical tree, and
/// normalizing the serialized body of a tree yields the same blocks again.
#[instrument(skip(raw), fields(raw_size = raw.len()))]
pub fn normalize(chapter_id: u64, title: &str, raw: &str) -> ChapterTree {
    let document = Html::parse_document(raw);
    let mut blocks = Vec::new();
    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        sequence(&mut blocks, &Piece::children_of(body));
    }
    tracing::trace!(blocks = blocks.len(), "Normalized chapter");
    ChapterTree { id: chapter_id, title: title.to_string(), blocks }
}

/// Processes a run of block-level siblings.
fn sequence(blocks: &mut Vec<Block>, children: &[Piece<'_>]) {
    for (index, piece) in children.iter().enumerate() {
        match *piece {
            Piece::Text(text) => {
                if !text.trim().is_empty() {
                    push_paragraph(blocks, None, vec![Inline::Text(text.to_string())]);
                }
            },
            Piece::Element(element) => block(blocks, element, &children[index + 1..]),
        }
    }
}

fn block(blocks: &mut Vec<Block>, element: ElementRef<'_>, following: &[Piece<'_>]) {
    let name = element.value().name();
    match name {
        "img" => {
            if let Some(image) = image_ref(element) {
                push_image(blocks, image);
            }
        },
        "br" => {
            if !is_redundant_break(following) {
                push_break(blocks, style_of(element));
            }
        },
        _ if DISCARDED_TAGS.contains(&name) => {},
        _ if WRAPPER_TAGS.contains(&name) => {
            let children = Piece::children_of(element);
            if children.iter().any(Piece::is_wrapper) {
                // A container of paragraphs rather than a paragraph itself.
                sequence(blocks, &children);
            } else {
                wrapper(blocks, element);
            }
        },
        _ => {
            // Inline content outside any wrapper gets a wrapper of its own.
            let mut segments = Vec::new();
            segment(Piece::Element(element), &[], &mut segments);
            emit(blocks, None, segments);
        },
    }
}

fn wrapper(blocks: &mut Vec<Block>, element: ElementRef<'_>) {
    let style = style_of(element);
    let mut segments = Vec::new();
    segment_children(element, &mut segments);
    emit(blocks, style, segments);
}

/// Turns segments into blocks: runs of inline content become one paragraph,
/// each image becomes an image block followed by a break.
fn emit(blocks: &mut Vec<Block>, style: Option<String>, segments: Vec<Segment>) {
    let mut run = Vec::new();
    for segment in segments {
        match segment {
            Segment::Inline(inline) => push_inline(&mut run, inline),
            Segment::Image(mut image) => {
                push_paragraph(blocks, style.clone(), std::mem::take(&mut run));
                if image.style.is_none() {
                    image.style = style.clone();
                }
                push_image(blocks, image);
            },
        }
    }
    push_paragraph(blocks, style, run);
}

fn segment_children(element: ElementRef<'_>, out: &mut Vec<Segment>) {
    let children = Piece::children_of(element);
    for (index, piece) in children.iter().enumerate() {
        segment(*piece, &children[index + 1..], out);
    }
}

fn segment(piece: Piece<'_>, following: &[Piece<'_>], out: &mut Vec<Segment>) {
    let element = match piece {
        Piece::Text(text) => {
            if !text.is_empty() {
                out.push(Segment::Inline(Inline::Text(text.to_string())));
            }
            return;
        },
        Piece::Element(element) => element,
    };
    let name = element.value().name();
    if let Some(emphasis) = Emphasis::from_tag(name) {
        let mut inner = Vec::new();
        segment_children(element, &mut inner);
        wrap_emphasis(emphasis, inner, out);
        return;
    }
    match name {
        "br" => {
            if !is_redundant_break(following) {
                out.push(Segment::Inline(Inline::LineBreak));
            }
        },
        "img" => {
            if let Some(image) = image_ref(element) {
                out.push(Segment::Image(image));
            }
        },
        _ if DISCARDED_TAGS.contains(&name) => {},
        // Anything else (spans, links, fonts) is flattened into its content.
        _ => segment_children(element, out),
    }
}

/// Wraps each run of inline segments in `emphasis`; images pass through so
/// they can still be lifted out of the paragraph.
fn wrap_emphasis(emphasis: Emphasis, inner: Vec<Segment>, out: &mut Vec<Segment>) {
    let mut run = Vec::new();
    let flush = |run: &mut Vec<Inline>, out: &mut Vec<Segment>| {
        if has_text(run) {
            out.push(Segment::Inline(Inline::Styled { emphasis, children: std::mem::take(run) }));
        } else {
            // Emphasised whitespace is still whitespace.
            out.extend(run.drain(..).map(Segment::Inline));
        }
    };
    for segment in inner {
        match segment {
            Segment::Inline(inline) => push_inline(&mut run, inline),
            Segment::Image(image) => {
                flush(&mut run, out);
                out.push(Segment::Image(image));
            },
        }
    }
    flush(&mut run, out);
}

/// A break is redundant when nothing but further breaks (or blank text)
/// follows it.
fn is_redundant_break(following: &[Piece<'_>]) -> bool {
    following.iter().all(|p| p.is_break() || p.is_blank())
}

fn image_ref(element: ElementRef<'_>) -> Option<ImageRef> {
    let src = element.value().attr("src").map(str::trim).filter(|s| !s.is_empty())?;
    let first_of = |attrs: &[&str]| {
        attrs.iter().find_map(|a| element.value().attr(a)).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
    };
    Some(ImageRef {
        src: src.to_string(),
        width: first_of(WIDTH_ATTRS),
        height: first_of(HEIGHT_ATTRS),
        style: style_of(element),
    })
}

fn style_of(element: ElementRef<'_>) -> Option<String> {
    element.value().attr("style").map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Appends inline content, merging adjacent text so that serializing and
/// re-parsing cannot change the tree.
fn push_inline(run: &mut Vec<Inline>, inline: Inline) {
    match (run.last_mut(), inline) {
        (Some(Inline::Text(previous)), Inline::Text(text)) => previous.push_str(&text),
        (_, inline) => run.push(inline),
    }
}

fn has_text(content: &[Inline]) -> bool {
    content.iter().any(|inline| match inline {
        Inline::Text(text) => !text.trim().is_empty(),
        Inline::Styled { children, .. } => has_text(children),
        Inline::LineBreak => false,
    })
}

fn push_paragraph(blocks: &mut Vec<Block>, style: Option<String>, mut content: Vec<Inline>) {
    // Line breaks at the edges of a paragraph render as nothing.
    while matches!(content.last(), Some(Inline::LineBreak)) {
        content.pop();
    }
    while matches!(content.first(), Some(Inline::LineBreak)) {
        content.remove(0);
    }
    if has_text(&content) {
        blocks.push(Block::Paragraph { style, content });
    }
}

fn push_image(blocks: &mut Vec<Block>, image: ImageRef) {
    let style = image.style.clone();
    blocks.push(Block::Image(image));
    blocks.push(Block::Break { style });
}

fn push_break(blocks: &mut Vec<Block>, style: Option<String>) {
    // Consecutive breaks collapse into one.
    if !matches!(blocks.last(), Some(Block::Break { .. })) {
        blocks.push(Block::Break { style });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn paragraph(text: &str) -> Block {
        Block::Paragraph { style: None, content: vec![Inline::Text(text.into())] }
    }

    #[test]
    fn keeps_paragraph_style_and_emphasis() {
        let tree = normalize(
            1,
            "One",
            r#"<p data-p-id="abc" style="text-align:center;">Hello <b>bold</b> and <i>italic</i></p>"#,
        );
        assert_eq!(
            tree.blocks,
            vec![Block::Paragraph {
                style: Some("text-align:center;".into()),
                content: vec![
                    Inline::Text("Hello ".into()),
                    Inline::Styled { emphasis: Emphasis::Bold, children: vec![Inline::Text("bold".into())] },
                    Inline::Text(" and ".into()),
                    Inline::Styled { emphasis: Emphasis::Italic, children: vec![Inline::Text("italic".into())] },
                ],
            }]
        );
    }

    #[test]
    fn lifts_images_out_of_paragraphs() {
        let tree = normalize(
            1,
            "One",
            r#"<p style="text-align:left;">Before<img src="https://img.test/a.jpg" data-original-width="640" data-original-height="480">After</p>"#,
        );
        let style = Some("text-align:left;".to_string());
        assert_eq!(
            tree.blocks,
            vec![
                Block::Paragraph { style: style.clone(), content: vec![Inline::Text("Before".into())] },
                Block::Image(ImageRef {
                    src: "https://img.test/a.jpg".into(),
                    width: Some("640".into()),
                    height: Some("480".into()),
                    style: style.clone(),
                }),
                Block::Break { style: style.clone() },
                Block::Paragraph { style, content: vec![Inline::Text("After".into())] },
            ]
        );
    }

    #[rstest]
    #[case::only_breaks("<p><br><br></p>")]
    #[case::single_break("<p><br/></p>")]
    #[case::blank_text("<p>   </p>")]
    #[case::breaks_and_blank("<p> <br> \n<br></p>")]
    fn childless_wrappers_are_dropped(#[case] raw: &str) {
        assert!(normalize(1, "One", raw).blocks.is_empty());
    }

    #[test]
    fn trailing_breaks_are_dropped_but_inner_ones_kept() {
        let tree = normalize(1, "One", "<p>line one<br>line two<br><br></p>");
        assert_eq!(
            tree.blocks,
            vec![Block::Paragraph {
                style: None,
                content: vec![Inline::Text("line one".into()), Inline::LineBreak, Inline::Text("line two".into())],
            }]
        );
    }

    #[test]
    fn images_without_source_are_dropped() {
        let tree = normalize(1, "One", r#"<p><img src=""><img></p><p>text</p>"#);
        assert_eq!(tree.blocks, vec![paragraph("text")]);
    }

    #[test]
    fn unknown_tags_are_flattened() {
        let tree = normalize(1, "One", r#"<p><span class="x">a<a href="https://x.test">b</a></span>c<script>evil()</script></p>"#);
        assert_eq!(tree.blocks, vec![paragraph("abc")]);
    }

    #[test]
    fn images_inside_emphasis_are_lifted() {
        let tree = normalize(1, "One", r#"<p><b>x<img src="https://img.test/b.png">y</b></p>"#);
        assert_eq!(tree.image_count(), 1);
        assert!(matches!(tree.blocks[0], Block::Paragraph { .. }));
        assert!(matches!(tree.blocks[1], Block::Image(_)));
        assert!(matches!(tree.blocks[2], Block::Break { .. }));
        assert!(matches!(tree.blocks[3], Block::Paragraph { .. }));
    }

    #[test]
    fn nested_wrappers_keep_their_paragraphs() {
        let tree = normalize(1, "One", "<div><p>a</p><p>b</p></div>");
        assert_eq!(tree.blocks, vec![paragraph("a"), paragraph("b")]);
    }

    #[test]
    fn order_matches_source() {
        let tree = normalize(1, "One", "<p>first</p><p>second</p><p>third</p>");
        assert_eq!(tree.blocks, vec![paragraph("first"), paragraph("second"), paragraph("third")]);
    }

    const RICH: &str = r#"
        <p data-p-id="1" style="text-align:center;"><b>Chapter</b> <u>One</u></p>
        <p data-p-id="2"><img src="https://img.test/1.jpg" data-original-width="10" data-original-height="20"></p>
        <p data-p-id="3">Fish &amp; chips<br>and <strong>more &lt;tags&gt;</strong><br></p>
        <p data-p-id="4"><br></p>
        <p data-p-id="5"><em>End</em><img src="https://img.test/2.jpg"></p>
    "#;

    #[test]
    fn normalizing_twice_is_identical() {
        assert_eq!(normalize(9, "Rich", RICH), normalize(9, "Rich", RICH));
    }

    #[test]
    fn normalizing_serialized_output_is_a_fixed_point() {
        let tree = normalize(9, "Rich", RICH);
        let again = normalize(9, "Rich", &tree.body_html(|_, image| Some(image.src.clone())));
        assert_eq!(tree, again);
    }

    #[test]
    fn every_image_has_a_source() {
        let raw = r#"<p><img src=" "><img src="https://img.test/ok.jpg"><img></p>"#;
        let tree = normalize(1, "One", raw);
        assert_eq!(tree.image_count(), 1);
        assert!(tree.images().all(|image| !image.src.is_empty()));
    }
}
