//! Conversation distillation.
//!
//! When a conversation ends, the transcript is turned into two thoughts: a
//! forward-looking planning note and a reflective memo. Both cite the
//! conversation's own chat node as their evidence.

use chrono::TimeDelta;
use tracing::info;

use crate::cognition::{CognitionService, compose_thought};
use crate::config::MemoryConfig;
use crate::error::{Result, ReverieError};
use crate::memory::MemoryStore;
use crate::types::{NodeId, SimTime, Utterance, format_transcript};

/// The two thoughts written for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistilledConversation {
    /// The planning note.
    pub planning: NodeId,
    /// The memo.
    pub memo: NodeId,
    /// The chat node both thoughts cite.
    pub chat: NodeId,
}

/// Turns finished conversations into thoughts.
#[derive(Debug, Clone)]
pub struct ConversationDistiller {
    thought_lifetime: TimeDelta,
}

impl ConversationDistiller {
    /// Build a distiller using the configured thought lifetime.
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            thought_lifetime: TimeDelta::days(config.thought_lifetime_days),
        }
    }

    /// Distill `transcript` of `character`'s conversation with
    /// `counterpart` into a planning thought and a memo thought.
    ///
    /// Both thoughts are written together or not at all.
    ///
    /// # Errors
    ///
    /// - [`ReverieError::NoConversation`] if the store has no chat node with
    ///   `counterpart`.
    /// - [`ReverieError::Cognition`] if any Cognition Service call fails.
    pub async fn distill<C: CognitionService>(
        &self,
        store: &mut MemoryStore,
        cognition: &C,
        character: &str,
        counterpart: &str,
        transcript: &[Utterance],
        now: SimTime,
    ) -> Result<DistilledConversation> {
        let chat = store
            .last_chat_with(counterpart)
            .map(|node| node.id)
            .ok_or_else(|| ReverieError::NoConversation(counterpart.to_string()))?;

        let text = format_transcript(transcript);
        let view: &MemoryStore = store;

        let planning = cognition.planning_thought(&text).await?;
        let planning = format!("For {character}'s planning: {planning}");
        let planning = compose_thought(view, cognition, now, self.thought_lifetime, &planning, vec![chat]).await?;

        let memo = cognition.memo_thought(&text).await?;
        let memo = format!("{character} {memo}");
        let memo = compose_thought(view, cognition, now, self.thought_lifetime, &memo, vec![chat]).await?;

        let ids = store.add_all(vec![planning, memo])?;
        let (planning, memo) = (ids[0], ids[1]);
        info!(
            character,
            counterpart,
            chat = %chat,
            utterances = transcript.len(),
            "Distilled conversation"
        );
        Ok(DistilledConversation { planning, memo, chat })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::CognitionService;
    use crate::error::CognitionError;
    use crate::memory::NewNode;
    use crate::rule_based::{CognitionOp, RuleBasedCognition};
    use crate::types::{NodeKind, Triple};
    use chrono::NaiveDate;

    const DIMS: usize = 16;

    fn t(minute: u32) -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(14, minute, 0))
            .expect("valid time")
    }

    fn transcript() -> Vec<Utterance> {
        vec![Utterance::new("A", "hi"), Utterance::new("B", "hello")]
    }

    async fn store_with_chat(cognition: &RuleBasedCognition) -> (MemoryStore, NodeId) {
        let mut store = MemoryStore::new(DIMS);
        let desc = "conversing about the party";
        let chat = store
            .add(NewNode::chat(
                t(0),
                Triple::new("A", "chat with", "B"),
                desc,
                3,
                cognition.embedding(desc).await.expect("embed"),
                transcript(),
            ))
            .expect("chat");
        (store, chat)
    }

    #[tokio::test]
    async fn writes_planning_and_memo_citing_the_chat() {
        let cognition = RuleBasedCognition::new(DIMS);
        let (mut store, chat) = store_with_chat(&cognition).await;
        let distiller = ConversationDistiller::new(&MemoryConfig {
            embedding_dimensions: DIMS,
            ..MemoryConfig::default()
        });

        let out = distiller
            .distill(&mut store, &cognition, "A", "B", &transcript(), t(5))
            .await
            .expect("distill");

        assert_eq!(out.chat, chat);
        assert_eq!(store.count(NodeKind::Thought), 2);
        for id in [out.planning, out.memo] {
            let node = store.get(id).expect("thought");
            assert_eq!(node.evidence, vec![chat]);
            assert_eq!(node.expiration, Some(t(5) + TimeDelta::days(30)));
        }
        assert!(
            store
                .get(out.planning)
                .expect("planning")
                .description
                .starts_with("For A's planning: ")
        );
        assert!(store.get(out.memo).expect("memo").description.starts_with("A "));
    }

    #[tokio::test]
    async fn no_prior_chat_is_an_error() {
        let cognition = RuleBasedCognition::new(DIMS);
        let mut store = MemoryStore::new(DIMS);
        let err = ConversationDistiller::new(&MemoryConfig::default())
            .distill(&mut store, &cognition, "A", "B", &transcript(), t(5))
            .await
            .expect_err("no chat");
        assert!(matches!(err, ReverieError::NoConversation(name) if name == "B"));
        assert_eq!(cognition.calls(CognitionOp::Planning), 0);
    }

    #[tokio::test]
    async fn memo_failure_writes_nothing() {
        let cognition = RuleBasedCognition::new(DIMS);
        let (mut store, _) = store_with_chat(&cognition).await;
        cognition.fail(CognitionOp::Memo, CognitionError::Timeout(500));

        let result = ConversationDistiller::new(&MemoryConfig::default())
            .distill(&mut store, &cognition, "A", "B", &transcript(), t(5))
            .await;
        assert!(matches!(
            result,
            Err(ReverieError::Cognition(CognitionError::Timeout(500)))
        ));
        assert_eq!(store.count(NodeKind::Thought), 0);
    }
}
