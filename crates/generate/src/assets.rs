//! Templates and stylesheets embedded into the binary at compile time.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "../../assets/templates/"]
struct Templates;

pub(crate) fn load(name: &str) -> Result<String> {
    let file = Templates::get(name).ok_or_raise(|| ErrorKind::Template)?;
    String::from_utf8(file.data.into_owned()).or_raise(|| ErrorKind::Template)
}
