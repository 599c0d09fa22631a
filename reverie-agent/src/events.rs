//! What a character perceives on a tick.
//!
//! The simulation hands the agent a list of perceptions, nearest first.
//! Each one becomes an event node; the character's own conversation also
//! becomes a chat node carrying the transcript.

use reverie_core::Triple;

/// Something the character noticed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Perception {
    /// An event in the world, possibly the character's own action.
    Event {
        /// Compact summary.
        triple: Triple,
        /// Natural-language statement.
        description: String,
        /// Text to embed instead of the description.
        embedding_key: Option<String>,
    },
    /// The character's own ongoing conversation. The transcript is taken
    /// from the character's scratch state at ingestion time.
    Chat {
        /// `(character, "chat with", counterpart)`.
        triple: Triple,
        /// e.g. `"Isabella Rodriguez is conversing with Klaus Mueller"`.
        description: String,
    },
}

impl Perception {
    /// An event described by `description`.
    #[must_use]
    pub fn event(triple: Triple, description: impl Into<String>) -> Self {
        Self::Event {
            triple,
            description: description.into(),
            embedding_key: None,
        }
    }

    /// An object or person doing nothing, e.g. `"bed is idle"`.
    #[must_use]
    pub fn idle(subject: &str) -> Self {
        Self::event(Triple::new(subject, "is", "idle"), format!("{subject} is idle"))
    }

    /// `character`'s conversation with `counterpart`.
    #[must_use]
    pub fn chat(character: &str, counterpart: &str) -> Self {
        Self::Chat {
            triple: Triple::new(character, "chat with", counterpart),
            description: format!("{character} is conversing with {counterpart}"),
        }
    }

    /// Embed `key` instead of the description.
    #[must_use]
    pub fn with_embedding_key(self, key: impl Into<String>) -> Self {
        match self {
            Self::Event { triple, description, .. } => Self::Event {
                triple,
                description,
                embedding_key: Some(key.into()),
            },
            chat @ Self::Chat { .. } => chat,
        }
    }

    /// The perception's triple.
    #[must_use]
    pub fn triple(&self) -> &Triple {
        match self {
            Self::Event { triple, .. } | Self::Chat { triple, .. } => triple,
        }
    }

    /// The perception's description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Event { description, .. } | Self::Chat { description, .. } => description,
        }
    }

    /// The text whose embedding is stored.
    #[must_use]
    pub fn embedding_key(&self) -> &str {
        match self {
            Self::Event {
                embedding_key: Some(key),
                ..
            } => key,
            _ => self.description(),
        }
    }
}
