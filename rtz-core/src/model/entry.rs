use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::block::BlockId;
use crate::model::token::Token;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TranslationEntry {
    pub id: BlockId,

    pub context: ContextTag,

    #[serde(default)]
    pub source_tokens: Vec<Token>,

    #[serde(default)]
    pub target_tokens: Vec<Token>,

    #[serde(default)]
    pub status: EntryStatus,

    #[serde(default)]
    pub notes: String,
}

impl TranslationEntry {
    pub fn new(id: BlockId, context: ContextTag, source_tokens: Vec<Token>) -> Self {
        TranslationEntry {
            id,
            context,
            source_tokens,
            target_tokens: Vec::new(),
            status: EntryStatus::Untranslated,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Untranslated,
    InProgress,
    Completed,
    NeedsReview,
}

impl EntryStatus {
    fn rank(self) -> u8 {
        match self {
            EntryStatus::Untranslated => 0,
            EntryStatus::InProgress => 1,
            EntryStatus::Completed => 2,
            EntryStatus::NeedsReview => 3,
        }
    }

    /// Status only moves forward, except that a flagged entry may go back to work.
    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        next.rank() >= self.rank()
            || (self == EntryStatus::NeedsReview && next == EntryStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Untranslated => "untranslated",
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Completed => "completed",
            EntryStatus::NeedsReview => "needs_review",
        }
    }

    /// Accepts the spreadsheet spellings (`COMPLETED`, `PENDING`, ...).
    pub fn parse(s: &str) -> Option<EntryStatus> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "untranslated" | "pending" | "" => Some(EntryStatus::Untranslated),
            "in_progress" => Some(EntryStatus::InProgress),
            "completed" | "done" => Some(EntryStatus::Completed),
            "needs_review" => Some(EntryStatus::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    Tutorial,
    #[default]
    Dialog,
    Combat,
    Menu,
    CardInfo,
}

impl ContextTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextTag::Tutorial => "tutorial",
            ContextTag::Dialog => "dialog",
            ContextTag::Combat => "combat",
            ContextTag::Menu => "menu",
            ContextTag::CardInfo => "card_info",
        }
    }

    pub fn parse(s: &str) -> Option<ContextTag> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "tutorial" => Some(ContextTag::Tutorial),
            "dialog" | "dialogue" => Some(ContextTag::Dialog),
            "combat" | "combat_tutorial" | "battle" => Some(ContextTag::Combat),
            "menu" | "title_screen" => Some(ContextTag::Menu),
            "card_info" | "card_game" => Some(ContextTag::CardInfo),
            _ => None,
        }
    }

    /// Guess from the container file name first, then from the text itself.
    pub fn infer(container_name: &str, text: &str) -> ContextTag {
        let name = container_name.to_ascii_lowercase();

        if name.contains("tuto") {
            return ContextTag::Tutorial;
        }
        if ["menu", "title", "option", "setting"].iter().any(|k| name.contains(k)) {
            return ContextTag::Menu;
        }
        if name.contains("fight") || name.contains("battle") {
            return ContextTag::Combat;
        }
        if name.contains("card") {
            return ContextTag::CardInfo;
        }

        if text.contains("アタック") && text.contains("ガード") {
            ContextTag::Combat
        } else if text.contains("カード") {
            ContextTag::CardInfo
        } else {
            ContextTag::Dialog
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
