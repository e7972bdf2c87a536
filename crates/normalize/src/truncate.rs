//! Biography truncation at line boundaries.

use memchr::memchr_iter;

/// Keeps whole lines of `text` while the running character count stays under
/// `max_chars`. The first line that would reach the cap is dropped along with
/// everything after it, so the result never ends mid-line.
///
/// Empty lines are skipped and kept lines are joined with `'\n'`, which counts
/// towards the cap.
///
/// ```rust
/// use wpd_normalize::truncate_bio;
/// assert_eq!(truncate_bio("one\n\ntwo\nthree", 8), "one\ntwo");
/// assert_eq!(truncate_bio("a line that is too long", 5), "");
/// ```
pub fn truncate_bio(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for line in lines(text).filter(|line| !line.trim().is_empty()) {
        let separator = usize::from(!out.is_empty());
        let next = count + separator + line.chars().count();
        if next >= max_chars {
            break;
        }
        if separator == 1 {
            out.push('\n');
        }
        out.push_str(line);
        count = next;
    }
    out
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    memchr_iter(b'\n', bytes)
        .chain(std::iter::once(bytes.len()))
        .map(move |end| {
            // '\n' is ASCII, so both ends sit on char boundaries.
            let line = &text[start..end];
            start = end + 1;
            line.strip_suffix('\r').unwrap_or(line)
        })
}
