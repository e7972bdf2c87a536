//! Chapter markup normalization.
//!
//! Raw chapter HTML from the API carries arbitrary attributes, redundant
//! breaks, empty wrappers, and images nested inside paragraphs. [`normalize`]
//! rebuilds it into a [`ChapterTree`] holding only paragraphs, images and
//! breaks. Serializing a tree with [`ChapterTree::to_html`] and normalizing
//! the output again yields the same tree.

mod consts;
mod normalize;
mod tree;
mod truncate;

pub use crate::normalize::normalize;
pub use crate::tree::{Block, ChapterTree, Emphasis, ImageRef, Inline, escape, escape_into};
pub use crate::truncate::truncate_bio;
