//! CSS custom properties for rendered documents.
//!
//! [`CssVariables`] renders as a `<style>` block setting `:root` custom
//! properties prefixed with `--book-`, so page rules can print the title or
//! author in running headers without touching the template.

use rslug::slugify;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A set of CSS custom properties injected as `:root` variables.
///
/// Each entry becomes `--book-{key}: "{value}"`. Values are escaped per the
/// [CSS string token grammar][grammar].
///
/// [grammar]: https://www.w3.org/TR/css-syntax-3/#consume-string-token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssVariables {
    variables: BTreeMap<String, String>,
}

impl CssVariables {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CssVariables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let variables = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { variables }
    }
}
impl Display for CssVariables {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "<style>\n:root {{")?;
        for (key, value) in &self.variables {
            writeln!(f, "    --book-{}: \"{}\";", slugify!(key), css_escape_string(value))?;
        }
        writeln!(f, "}}\n</style>")
    }
}

fn css_escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\a "),
            '\r' => out.push_str("\\d "),
            '\x0C' => out.push_str("\\c "),
            '\0' => out.push_str("\\fffd "),
            // A literal closing tag would end the surrounding <style> block.
            '<' => out.push_str("\\3c "),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sorted_root_properties() {
        let vars: CssVariables = [("title", "A \"Quoted\" Tale"), ("author", "someone")].into_iter().collect();
        assert_eq!(
            vars.to_string(),
            "<style>\n:root {\n    --book-author: \"someone\";\n    --book-title: \"A \\\"Quoted\\\" Tale\";\n}\n</style>\n"
        );
    }

    #[test]
    fn escapes_markup_and_newlines() {
        assert_eq!(css_escape_string("a</style>\nb"), "a\\3c /style>\\a b");
    }
}
