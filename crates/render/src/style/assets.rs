//! Stylesheets embedded into the binary at compile time.

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use rust_embed::Embed;
use std::borrow::Cow;

#[derive(Embed)]
#[folder = "../../assets/styles/"]
pub(crate) struct Builtins;
impl Builtins {
    pub(crate) fn load(name: impl AsRef<str>) -> Result<Cow<'static, [u8]>> {
        Self::get(name.as_ref()).map(|f| f.data).ok_or_raise(|| ErrorKind::AssetNotFound(Self::identifier(name)))
    }

    pub(crate) fn list() -> Vec<Cow<'static, str>> {
        Self::iter().filter(|f| f.ends_with(".css")).collect()
    }

    fn identifier(name: impl AsRef<str>) -> String {
        format!("builtin:{}", name.as_ref().trim().trim_start_matches("builtin:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_load_book_style() {
        let css = Builtins::load("book.css").unwrap();
        assert!(!css.is_empty());
    }

    #[test]
    fn list_includes_book() {
        assert!(Builtins::list().iter().any(|s| s == "book.css"));
    }
}
