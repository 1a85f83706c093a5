//! The stored form of a song document.
//!
//! Persistence lives outside this crate. This is only the record shape it
//! exchanges: the source text plus a few fields copied out of the song
//! metadata so lists can be shown without parsing every document.

use serde::{Deserialize, Serialize};

use crate::error::SheetError;
use crate::metadata::MetaKey;
use crate::parser::parse;
use crate::song::Song;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorttitle: Option<String>,
    pub chord_pro: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord_pro_draft: Option<String>,
    #[serde(default)]
    pub deployed: bool,
}

impl SongRecord {
    /// Build a record from source text. The text must parse.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, SheetError> {
        let source = source.into();
        let song = parse(&source)?;
        let mut record = Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: String::new(),
            artist: None,
            sorttitle: None,
            chord_pro: source,
            chord_pro_draft: None,
            deployed: false,
        };
        record.copy_metadata(&song);
        Ok(record)
    }

    fn copy_metadata(&mut self, song: &Song) {
        let get = |key| song.metadata.get(key).map(|v| v.trim().to_string());
        self.title = get(MetaKey::Title).unwrap_or_default();
        self.artist = get(MetaKey::Artist);
        self.sorttitle = get(MetaKey::SortTitle);
    }

    /// Parse the published text.
    pub fn song(&self) -> Result<Song, SheetError> {
        parse(&self.chord_pro)
    }

    /// Text an editor should open: the draft when there is one.
    pub fn working_text(&self) -> &str {
        self.chord_pro_draft.as_deref().unwrap_or(&self.chord_pro)
    }

    /// Store a draft. Drafts may be unparsable.
    pub fn save_draft(&mut self, text: impl Into<String>) {
        self.chord_pro_draft = Some(text.into());
    }

    /// Promote the draft to the published text once it parses.
    pub fn publish_draft(&mut self) -> Result<(), SheetError> {
        let draft = match self.chord_pro_draft.take() {
            Some(draft) => draft,
            None => return Ok(()),
        };
        match parse(&draft) {
            Ok(song) => {
                self.copy_metadata(&song);
                self.chord_pro = draft;
                Ok(())
            }
            Err(e) => {
                self.chord_pro_draft = Some(draft);
                Err(e)
            }
        }
    }

    /// Key used to order song lists.
    pub fn sort_key(&self) -> &str {
        self.sorttitle.as_deref().unwrap_or(&self.title)
    }
}
