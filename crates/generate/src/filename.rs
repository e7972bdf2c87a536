use rslug::slugify;

/// Various quotation marks: '"''""„"`«»‹›
const QUOTATION_MARKS: [char; 13] = [
    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
    '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
];

/// Converts `text` to a URL-safe slug. Quotation marks are stripped first so
/// `"Hello"` does not become `-hello-`.
pub fn slug(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !QUOTATION_MARKS.contains(c)).collect();
    slugify!(&stripped)
}

/// `{slug}_{id}{_images}.{extension}`
pub fn document_filename(title: &str, id: u64, with_images: bool, extension: &str) -> String {
    let images = if with_images { "_images" } else { "" };
    format!("{}_{id}{images}.{}", slug(title), extension.trim_matches('.'))
}
