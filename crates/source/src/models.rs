//! Shapes returned by the remote API, trimmed to the fields the downloader
//! requests. Everything here is immutable for the lifetime of one request.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use time::OffsetDateTime;

/// Fields requested for a work. Both the work and chapter-id lookups ask for
/// the same set so that either resolves to an identical [`Work`].
pub const WORK_FIELDS: &str = "tags,id,title,createDate,modifyDate,language(name),description,completed,mature,url,isPaywalled,user(username,avatar,description),parts(id,title,deleted),cover,copyright";

/// A complete story with its ordered chapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modify_date: OffsetDateTime,
    pub language: Language,
    pub user: Author,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mature: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub parts: Vec<Chapter>,
    #[serde(default)]
    pub is_paywalled: bool,
    /// Licensing policy identifier, see the generator's licensing table.
    #[serde(default)]
    pub copyright: u8,
}
impl Work {
    /// Chapters that should be compiled, paired with their index in
    /// [`Work::parts`] so that output order stays stable.
    pub fn live_chapters(&self) -> impl Iterator<Item = (usize, &Chapter)> {
        self.parts.iter().enumerate().filter(|(_, c)| !c.deleted)
    }

    pub fn published_year(&self) -> i32 {
        self.create_date.year()
    }
}

/// One addressable part of a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub title: String,
    /// Deleted chapters keep their slot in the list but are never compiled.
    #[serde(default)]
    pub deleted: bool,
}
impl Chapter {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self { id, title: title.into(), deleted: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    /// Free-text biography.
    #[serde(default)]
    pub description: String,
}
impl Author {
    /// Avatar URL upgraded to the largest variant. The API hands out the
    /// 128px thumbnail by default.
    pub fn avatar_full_size(&self) -> String {
        self.avatar.replacen(".128.", ".512.", 1)
    }
}

/// Language information for a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Display name (e.g., "English")
    pub name: String,
}
impl Language {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// ISO 639-1 code for the display name, if known.
    ///
    /// ```
    /// use wpd_source::models::Language;
    /// assert_eq!(Language::new("English").iso_code(), Some("en"));
    /// assert_eq!(Language::new("Klingon").iso_code(), None);
    /// ```
    pub fn iso_code(&self) -> Option<&'static str> {
        LANGUAGES.get(self.name.as_str()).copied()
    }

    /// ISO code when known, falling back to the display name.
    pub fn tag(&self) -> &str {
        self.iso_code().unwrap_or(&self.name)
    }
}

/// Languages offered by the remote site's language picker.
static LANGUAGES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("English", "en"),
        ("Français", "fr"),
        ("Italiano", "it"),
        ("Deutsch", "de"),
        ("Español", "es"),
        ("Português", "pt"),
        ("Català", "ca"),
        ("Tagalog", "tl"),
        ("Bahasa Indonesia", "id"),
        ("Bahasa Melayu", "ms"),
        ("Nederlands", "nl"),
        ("Polski", "pl"),
        ("Русский", "ru"),
        ("Română", "ro"),
        ("Türkçe", "tr"),
        ("Tiếng Việt", "vi"),
        ("Čeština", "cs"),
        ("Ελληνικά", "el"),
        ("Magyar", "hu"),
        ("Svenska", "sv"),
        ("Dansk", "da"),
        ("Norsk", "no"),
        ("Suomi", "fi"),
        ("Українська", "uk"),
        ("العربية", "ar"),
        ("فارسی", "fa"),
        ("עברית", "he"),
        ("हिन्दी", "hi"),
        ("ไทย", "th"),
        ("日本語", "ja"),
        ("한국어", "ko"),
        ("简体中文", "zh"),
        ("繁體中文", "zh"),
    ])
});

/// A user-curated list of works, used for batch downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingList {
    pub id: u64,
    pub name: String,
    /// Member work ids in declared order.
    pub works: Vec<u64>,
}

#[derive(Deserialize)]
pub(crate) struct RawReadingList {
    #[serde(deserialize_with = "flexible_id")]
    id: u64,
    name: String,
    #[serde(default)]
    stories: Vec<RawListEntry>,
}
#[derive(Deserialize)]
struct RawListEntry {
    #[serde(deserialize_with = "flexible_id")]
    id: u64,
}
impl From<RawReadingList> for ReadingList {
    fn from(raw: RawReadingList) -> Self {
        Self { id: raw.id, name: raw.name, works: raw.stories.into_iter().map(|s| s.id).collect() }
    }
}

/// Response of a chapter-id lookup: the owning work and its id.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChapterLookup {
    #[serde(deserialize_with = "flexible_id")]
    pub group_id: u64,
    pub group: Work,
}

/// Error body the API attaches to most `400` responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub error_code: Option<u32>,
    /// The older text endpoint uses `code` instead.
    #[serde(default)]
    pub code: Option<u32>,
}
impl ApiError {
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn code(&self) -> Option<u32> {
        self.error_code.or(self.code)
    }
}

/// Identifiers arrive as JSON strings for works and as numbers for chapters.
fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }
    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_work_with_string_id() {
        let json = fixtures::work_json(372219540, &[(1458516761, "Ganesh")]);
        let work: Work = serde_json::from_value(json).unwrap();
        assert_eq!(work.id, 372219540);
        assert_eq!(work.parts, vec![Chapter::new(1458516761, "Ganesh")]);
        assert_eq!(work.published_year(), 2024);
        assert_eq!(work.language.tag(), "en");
        assert_eq!(work.copyright, 3);
    }

    #[test]
    fn live_chapters_skip_deleted_but_keep_indices() {
        let mut json = fixtures::work_json(1, &[(10, "One"), (11, "Two"), (12, "Three")]);
        json["parts"][1]["deleted"] = serde_json::Value::Bool(true);
        let work: Work = serde_json::from_value(json).unwrap();
        let live: Vec<_> = work.live_chapters().map(|(idx, c)| (idx, c.id)).collect();
        assert_eq!(live, vec![(0, 10), (2, 12)]);
    }

    #[test]
    fn avatar_is_upgraded() {
        let author = Author {
            username: "a".into(),
            avatar: "https://img.example.com/useravatar/a.128.jpg".into(),
            description: String::new(),
        };
        assert_eq!(author.avatar_full_size(), "https://img.example.com/useravatar/a.512.jpg");
    }

    #[test]
    fn unknown_language_falls_back_to_name() {
        assert_eq!(Language::new("Klingon").tag(), "Klingon");
    }

    #[test]
    fn reading_list_keeps_order() {
        let raw: RawReadingList = serde_json::from_str(r#"{"id":"77","name":"Faves","stories":[{"id":"3"},{"id":1},{"id":"2"}]}"#).unwrap();
        let list = ReadingList::from(raw);
        assert_eq!(list.works, vec![3, 1, 2]);
    }

    #[test]
    fn api_error_reads_either_code_field() {
        assert_eq!(ApiError::parse(br#"{"error_code":1017}"#).code(), Some(1017));
        assert_eq!(ApiError::parse(br#"{"code":463}"#).code(), Some(463));
        assert_eq!(ApiError::parse(b"not json").code(), None);
    }
}
