//! The simulated character: its memory, its reflection budget, and the
//! short-term scratch state a tick reads.

use chrono::TimeDelta;

use reverie_core::persistence::{PersistenceEngine, SavedCharacter};
use reverie_core::error::Result;
use reverie_core::{MemoryStore, ReflectionCounter, ReverieConfig, SimTime, Utterance};

use crate::config::CharacterSheet;

/// Short-term state that is not part of long-term memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scratch {
    /// Simulation time of the current tick.
    pub curr_time: SimTime,
    /// Who the character is talking to.
    pub chatting_with: Option<String>,
    /// The ongoing conversation, in order.
    pub chat: Vec<Utterance>,
    /// When the ongoing conversation ends.
    pub chatting_end_time: Option<SimTime>,
}

impl Scratch {
    fn at(curr_time: SimTime) -> Self {
        Self {
            curr_time,
            chatting_with: None,
            chat: Vec::new(),
            chatting_end_time: None,
        }
    }
}

/// One character's memory and scratch state.
#[derive(Debug)]
pub struct Character {
    /// Name and identity.
    pub sheet: CharacterSheet,
    /// Long-term memory.
    pub store: MemoryStore,
    /// Importance budget until the next reflection.
    pub counter: ReflectionCounter,
    /// Short-term state.
    pub scratch: Scratch,
}

impl Character {
    /// A character with empty memory at `start`.
    #[must_use]
    pub fn new(sheet: CharacterSheet, config: &ReverieConfig, start: SimTime) -> Self {
        Self {
            sheet,
            store: MemoryStore::new(config.memory.embedding_dimensions),
            counter: ReflectionCounter::new(config.reflection.importance_threshold_max),
            scratch: Scratch::at(start),
        }
    }

    /// A character resumed from saved memory, with fresh scratch state.
    #[must_use]
    pub fn restore(sheet: CharacterSheet, saved: SavedCharacter, start: SimTime) -> Self {
        Self {
            sheet,
            store: saved.store,
            counter: saved.counter,
            scratch: Scratch::at(start),
        }
    }

    /// Load the character named in `sheet`, if it was saved before.
    ///
    /// # Errors
    ///
    /// Database or deserialization failures.
    pub fn load(persistence: &PersistenceEngine, sheet: CharacterSheet, start: SimTime) -> Result<Option<Self>> {
        Ok(persistence
            .load_character(&sheet.name)?
            .map(|saved| Self::restore(sheet, saved, start)))
    }

    /// Save memory and reflection counter under the character's name.
    ///
    /// # Errors
    ///
    /// Database or serialization failures.
    pub fn save(&self, persistence: &PersistenceEngine) -> Result<()> {
        persistence.save_character(&self.sheet.name, &self.store, &self.counter)
    }

    /// The character's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.sheet.name
    }

    /// Move to `now`. A conversation whose end time has been reached is
    /// closed.
    pub fn advance_to(&mut self, now: SimTime) {
        self.scratch.curr_time = now;
        if self.scratch.chatting_end_time.is_some_and(|end| now >= end) {
            self.scratch.chatting_with = None;
            self.scratch.chat.clear();
            self.scratch.chatting_end_time = None;
        }
    }

    /// Begin talking to `counterpart` until `end_time`.
    pub fn start_conversation(&mut self, counterpart: impl Into<String>, end_time: SimTime) {
        self.scratch.chatting_with = Some(counterpart.into());
        self.scratch.chat.clear();
        self.scratch.chatting_end_time = Some(end_time);
    }

    /// Append a line to the ongoing conversation.
    pub fn record_utterance(&mut self, speaker: impl Into<String>, text: impl Into<String>) {
        self.scratch.chat.push(Utterance::new(speaker, text));
    }

    /// Whether the ongoing conversation ends exactly one `step` from now.
    #[must_use]
    pub fn conversation_ends_after(&self, step: TimeDelta) -> bool {
        self.scratch
            .chatting_end_time
            .is_some_and(|end| self.scratch.curr_time + step == end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minute: u32, second: u32) -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(14, minute, second))
            .expect("valid time")
    }

    fn isabella() -> CharacterSheet {
        CharacterSheet {
            name: "Isabella Rodriguez".into(),
            identity: "Isabella runs Hobbs Cafe.".into(),
        }
    }

    #[test]
    fn new_character_starts_with_full_budget() {
        let character = Character::new(isabella(), &ReverieConfig::default(), at(0, 0));
        assert!(character.store.is_empty());
        assert_eq!(character.counter.accumulated_importance, 150);
        assert_eq!(character.scratch.curr_time, at(0, 0));
        assert_eq!(character.name(), "Isabella Rodriguez");
    }

    #[test]
    fn conversation_end_is_detected_one_step_ahead() {
        let mut character = Character::new(isabella(), &ReverieConfig::default(), at(0, 0));
        let step = TimeDelta::seconds(10);
        character.start_conversation("Klaus Mueller", at(1, 0));
        character.record_utterance("Isabella Rodriguez", "Coming to the party?");

        character.advance_to(at(0, 40));
        assert!(!character.conversation_ends_after(step));
        character.advance_to(at(0, 50));
        assert!(character.conversation_ends_after(step));
        assert_eq!(character.scratch.chat.len(), 1);

        character.advance_to(at(1, 0));
        assert!(character.scratch.chatting_with.is_none());
        assert!(character.scratch.chat.is_empty());
        assert!(!character.conversation_ends_after(step));
    }

    #[test]
    fn save_and_load_round_trip() {
        let persistence =
            PersistenceEngine::open_in_memory(&reverie_core::config::PersistenceConfig::default()).expect("db");
        let mut character = Character::new(isabella(), &ReverieConfig::default(), at(0, 0));
        character.counter.record(20);
        character.save(&persistence).expect("save");

        let loaded = Character::load(&persistence, isabella(), at(5, 0))
            .expect("load")
            .expect("saved before");
        assert_eq!(loaded.counter, character.counter);
        assert_eq!(loaded.scratch.curr_time, at(5, 0));

        let stranger = CharacterSheet {
            name: "Nobody".into(),
            identity: String::new(),
        };
        assert!(Character::load(&persistence, stranger, at(5, 0)).expect("load").is_none());
    }
}
