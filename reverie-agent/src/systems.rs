//! Per-tick systems for one character.
//!
//! A tick runs, in order:
//!
//! | System        | Cognition calls                         | When                          |
//! |---------------|-----------------------------------------|-------------------------------|
//! | Perception    | poignancy + embedding per new node       | Every tick                    |
//! | Recall        | none (keyword index)                    | Every new event               |
//! | Reflection    | focal points, insights, thought scoring | Importance budget exhausted   |
//! | Distillation  | planning + memo thoughts                | Conversation ends next step   |

use std::collections::HashSet;
use std::time::Instant;

use chrono::TimeDelta;
use tracing::{debug, info};

use reverie_core::cognition::{CognitionService, PoignancyKind, embed_cached, score_poignancy};
use reverie_core::error::Result;
use reverie_core::{
    ConversationDistiller, DistilledConversation, NewNode, NodeId, NodeKind, ReflectionEngine, ReflectionOutcome,
    SimTime,
};

use crate::character::Character;
use crate::config::{AgentConfig, PerceptionConfig, TickTimings};
use crate::events::Perception;

/// What the reflect step did.
#[derive(Debug, Clone, Default)]
pub struct ReflectStep {
    /// The reflection pass, if the trigger fired.
    pub reflection: Option<ReflectionOutcome>,
    /// The distilled conversation, if one ended.
    pub distilled: Option<DistilledConversation>,
}

/// Memories a newly perceived event brings to mind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recollection {
    /// The perceived event.
    pub event: NodeId,
    /// Earlier events sharing a keyword with it, newest first.
    pub events: Vec<NodeId>,
    /// Thoughts sharing a keyword with it, newest first.
    pub thoughts: Vec<NodeId>,
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Nodes written by perception, in order.
    pub perceived: Vec<NodeId>,
    /// What each perceived event brought to mind.
    pub recalled: Vec<Recollection>,
    /// Reflection and distillation results.
    pub reflect: ReflectStep,
    /// Time spent per phase.
    pub timings: TickTimings,
}

/// The engines a character's tick runs through.
#[derive(Debug, Clone)]
pub struct CharacterSystems {
    perception: PerceptionConfig,
    reflection: ReflectionEngine,
    distiller: ConversationDistiller,
}

impl CharacterSystems {
    /// Build the systems from configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            perception: config.perception.clone(),
            reflection: ReflectionEngine::new(&config.core),
            distiller: ConversationDistiller::new(&config.core.memory),
        }
    }

    fn step(&self) -> TimeDelta {
        TimeDelta::seconds(self.perception.step_seconds)
    }

    /// Ingest up to `bandwidth` perceptions, skipping any whose triple is
    /// among the `retention` most recent events. Each written event's
    /// importance is charged to the reflection counter.
    ///
    /// A chat perception also writes a chat node holding the current
    /// transcript, ahead of its event node.
    ///
    /// # Errors
    ///
    /// Cognition or store failures. Nodes written before the failure stay.
    pub async fn perceive<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
        perceptions: &[Perception],
    ) -> Result<Vec<NodeId>> {
        let now = character.scratch.curr_time;
        let mut recent: HashSet<_> = character
            .store
            .latest_event_triples(self.perception.retention)
            .into_iter()
            .collect();

        let mut written = Vec::new();
        for perception in perceptions.iter().take(self.perception.bandwidth) {
            let triple = perception.triple();
            if !recent.insert(triple.clone()) {
                debug!(character = character.name(), %triple, "Already perceived");
                continue;
            }

            let key = perception.embedding_key();
            let embedding = embed_cached(&character.store, cognition, key).await?;

            if let Perception::Chat { description, .. } = perception {
                let importance = score_poignancy(cognition, PoignancyKind::Chat, description).await?;
                let chat = NewNode::chat(
                    now,
                    triple.clone(),
                    description.clone(),
                    importance,
                    embedding.clone(),
                    character.scratch.chat.clone(),
                );
                written.push(character.store.add(chat)?);
            }

            let description = perception.description();
            let importance = score_poignancy(cognition, PoignancyKind::Event, description).await?;
            let event = NewNode::event(now, triple.clone(), description, importance, embedding)
                .with_embedding_key(key);
            written.push(character.store.add(event)?);
            character.counter.record(importance);
        }

        if !written.is_empty() {
            debug!(
                character = character.name(),
                written = written.len(),
                budget = character.counter.accumulated_importance,
                "Perceptions ingested"
            );
        }
        Ok(written)
    }

    /// Associative recall for the events among `perceived`: the events and
    /// thoughts whose keywords overlap the event's triple. Chat nodes and
    /// unknown ids are skipped.
    #[must_use]
    pub fn recall(&self, character: &Character, perceived: &[NodeId]) -> Vec<Recollection> {
        let store = &character.store;
        perceived
            .iter()
            .filter_map(|id| store.get(*id).ok())
            .filter(|node| node.kind == NodeKind::Event)
            .map(|node| {
                let others = |kind: NodeKind| {
                    store
                        .related(&[kind], &node.triple)
                        .into_iter()
                        .map(|n| n.id)
                        .filter(|id| *id != node.id)
                        .collect::<Vec<_>>()
                };
                Recollection {
                    event: node.id,
                    events: others(NodeKind::Event),
                    thoughts: others(NodeKind::Thought),
                }
            })
            .collect()
    }

    /// Reflect if the importance budget is exhausted, then distill the
    /// conversation if it ends on the next step.
    ///
    /// # Errors
    ///
    /// A failed reflection pass or distillation. The failing stage leaves
    /// the store untouched.
    pub async fn reflect<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
    ) -> Result<ReflectStep> {
        let (step, _) = self.reflect_timed(character, cognition).await?;
        Ok(step)
    }

    /// The reflect step with `(reflect_us, distill_us)` timings.
    async fn reflect_timed<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
    ) -> Result<(ReflectStep, (u64, u64))> {
        let start = Instant::now();
        let reflection = self.run_reflection(character, cognition).await?;
        let reflect_us = elapsed_us(start);

        let start = Instant::now();
        let distilled = self.distill_if_ending(character, cognition).await?;
        let distill_us = elapsed_us(start);

        Ok((ReflectStep { reflection, distilled }, (reflect_us, distill_us)))
    }

    async fn run_reflection<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
    ) -> Result<Option<ReflectionOutcome>> {
        let now = character.scratch.curr_time;
        self.reflection
            .reflect(&mut character.store, &mut character.counter, cognition, now)
            .await
    }

    async fn distill_if_ending<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
    ) -> Result<Option<DistilledConversation>> {
        if !character.conversation_ends_after(self.step()) {
            return Ok(None);
        }
        let Some(counterpart) = character.scratch.chatting_with.clone() else {
            return Ok(None);
        };
        let distilled = self
            .distiller
            .distill(
                &mut character.store,
                cognition,
                &character.sheet.name,
                &counterpart,
                &character.scratch.chat,
                character.scratch.curr_time,
            )
            .await?;
        Ok(Some(distilled))
    }

    /// Advance to `now`, perceive, recall, then reflect.
    ///
    /// # Errors
    ///
    /// See [`Self::perceive`] and [`Self::reflect`].
    pub async fn tick<C: CognitionService>(
        &self,
        character: &mut Character,
        cognition: &C,
        now: SimTime,
        perceptions: &[Perception],
    ) -> Result<TickReport> {
        character.advance_to(now);

        let start = Instant::now();
        let perceived = self.perceive(character, cognition, perceptions).await?;
        let recalled = self.recall(character, &perceived);
        let perceive_us = elapsed_us(start);

        let (reflect, (reflect_us, distill_us)) = self.reflect_timed(character, cognition).await?;
        let timings = TickTimings {
            perceive_us,
            reflect_us,
            distill_us,
        };
        if reflect.reflection.is_some() || reflect.distilled.is_some() {
            info!(
                character = character.name(),
                %now,
                thoughts = reflect.reflection.as_ref().map_or(0, |r| r.thoughts.len()),
                distilled = reflect.distilled.is_some(),
                elapsed_us = timings.total_us(),
                "Tick wrote thoughts"
            );
        }
        Ok(TickReport {
            perceived,
            recalled,
            reflect,
            timings,
        })
    }
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}
