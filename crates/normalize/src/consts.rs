use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(BODY_SELECTOR, "body");

/// Elements whose children are processed as one paragraph-level wrapper.
pub(crate) const WRAPPER_TAGS: &[&str] =
    &["p", "div", "blockquote", "center", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "li"];
/// Elements that never carry renderable text.
pub(crate) const DISCARDED_TAGS: &[&str] = &["script", "style", "noscript", "template", "iframe", "object", "video", "audio"];
/// Source attributes carrying an image's intrinsic size, most specific first.
pub(crate) const WIDTH_ATTRS: &[&str] = &["data-original-width", "width"];
pub(crate) const HEIGHT_ATTRS: &[&str] = &["data-original-height", "height"];
