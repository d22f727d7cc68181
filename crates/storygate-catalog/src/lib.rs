//! # storygate-catalog
//!
//! Static story content keyed by progress level.
//!
//! The catalog is immutable, process-wide configuration: loaded once,
//! read-only thereafter. Levels are sparse — any level without an entry
//! resolves to a fixed terminal part, so `part()` is total and has no
//! failure mode. Built-in content ships with the binary; a TOML file can
//! override it at startup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Callback tag carried by every advance button.
pub const CONTINUE_CALLBACK: &str = "continue_story";

/// Errors from parsing catalog content.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The TOML source failed to parse.
    #[error("invalid catalog TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two parts declared the same level.
    #[error("duplicate story level: {0}")]
    DuplicateLevel(u32),

    /// Levels start at 1; 0 is not addressable.
    #[error("story level must be positive")]
    ZeroLevel,
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// An inline button attached to a story part.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoryButton {
    /// Button label shown to the reader.
    pub label: String,
    /// Action tag delivered back when the button is pressed.
    #[serde(default = "default_callback")]
    pub callback: String,
}

fn default_callback() -> String {
    CONTINUE_CALLBACK.to_string()
}

/// One part of the story.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoryPart {
    /// Narrative text.
    pub text: String,
    /// Optional photo reference sent with the text.
    #[serde(default)]
    pub photo: Option<String>,
    /// Optional audio reference sent as a separate message.
    #[serde(default)]
    pub audio: Option<String>,
    /// Optional advance button.
    #[serde(default)]
    pub button: Option<StoryButton>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable mapping from progress level to story content.
#[derive(Debug, Clone)]
pub struct StoryCatalog {
    parts: BTreeMap<u32, StoryPart>,
    terminal: StoryPart,
}

/// TOML file shape: a list of `[[part]]` tables plus an optional
/// `[terminal]` override.
#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    part: Vec<PartEntry>,
    #[serde(default)]
    terminal: Option<StoryPart>,
}

#[derive(Deserialize)]
struct PartEntry {
    level: u32,
    #[serde(flatten)]
    part: StoryPart,
}

impl StoryCatalog {
    /// The built-in story content: parts 1, 2, 3 and 35.
    ///
    /// Part 1 deliberately carries no button — getting past it is
    /// referral-gated, not button-gated.
    pub fn builtin() -> Self {
        let mut parts = BTreeMap::new();

        parts.insert(
            1,
            StoryPart {
                text: concat!(
                    "Earlier readers loved this story, and now it has reached you.\n\n",
                    "But even good stories need a push to spread.\n\n",
                    "Invite two friends and the real narrative begins. As soon as \
                     they join, the plot starts. I did my honest best writing it \u{2764}\u{fe0f}"
                )
                .to_string(),
                photo: None,
                audio: None,
                button: None,
            },
        );

        parts.insert(
            2,
            StoryPart {
                text: concat!(
                    "Thank you for inviting your friends!\n\n",
                    "The real story begins now.\n\n",
                    "Press 'Next' to continue."
                )
                .to_string(),
                photo: None,
                audio: None,
                button: Some(StoryButton {
                    label: "Next".to_string(),
                    callback: CONTINUE_CALLBACK.to_string(),
                }),
            },
        );

        parts.insert(
            3,
            StoryPart {
                text: concat!(
                    "There is a song attached below for full immersion. I would \
                     put it on if I were you.\n\n",
                    "Let the endless story begin!\n\n",
                    "Mary and Jerry are the two leads of this tale. Picture them \
                     yourself \u{2014} that will be better than any sketch I could give.\n\n",
                    "Right now a great distance separates them. I cannot even \
                     promise this will be a story of happy love.\n\n",
                    "So: this morning Jerry opened his mailbox and found a sealed \
                     envelope..."
                )
                .to_string(),
                photo: Some("photo1.jpg".to_string()),
                audio: Some("Spring.mp3".to_string()),
                button: Some(StoryButton {
                    label: "Read on".to_string(),
                    callback: CONTINUE_CALLBACK.to_string(),
                }),
            },
        );

        parts.insert(
            35,
            StoryPart {
                text: concat!(
                    "As promised at the very start \u{2014} this story is endless.\n\n",
                    "But it means nothing without readers. If enough people are \
                     interested, the next chapters will appear right here, daily.\n\n",
                    "So share the link to this bot with everyone you know. You \
                     would be helping enormously \u{2764}\u{fe0f}"
                )
                .to_string(),
                photo: None,
                audio: None,
                button: None,
            },
        );

        Self {
            parts,
            terminal: Self::default_terminal(),
        }
    }

    fn default_terminal() -> StoryPart {
        StoryPart {
            text: "The story has ended.".to_string(),
            photo: None,
            audio: None,
            button: None,
        }
    }

    /// Parse a catalog from TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;

        let mut parts = BTreeMap::new();
        for entry in file.part {
            if entry.level == 0 {
                return Err(CatalogError::ZeroLevel);
            }
            if parts.insert(entry.level, entry.part).is_some() {
                return Err(CatalogError::DuplicateLevel(entry.level));
            }
        }

        Ok(Self {
            parts,
            terminal: file.terminal.unwrap_or_else(Self::default_terminal),
        })
    }

    /// Load a catalog from a TOML file, falling back to the built-in
    /// content when the file is missing or invalid.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(source) => match Self::from_toml_str(&source) {
                Ok(catalog) => {
                    info!(path = %path.display(), levels = catalog.parts.len(), "story catalog loaded");
                    catalog
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid story file, using built-in content");
                    Self::builtin()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no story file, using built-in content");
                Self::builtin()
            }
        }
    }

    /// Look up the part for a level.
    ///
    /// Any level absent from the table resolves to the terminal part.
    pub fn part(&self, level: u32) -> &StoryPart {
        self.parts.get(&level).unwrap_or(&self.terminal)
    }

    /// Whether a level has a real entry (as opposed to the terminal
    /// fallback).
    pub fn contains(&self, level: u32) -> bool {
        self.parts.contains_key(&level)
    }

    /// The terminal fallback part.
    pub fn terminal(&self) -> &StoryPart {
        &self.terminal
    }

    /// Number of defined levels.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the catalog defines no levels at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Default for StoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── tests ────────────────────────────────────────────────────────────
