//! # reverie-agent: Per-Character Orchestration for Reverie
//!
//! Drives one simulated character's memory through the simulation loop,
//! on top of the engine-agnostic `reverie-core` library.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Simulation loop               │
//! │  ┌───────────────────────────────────┐  │
//! │  │        reverie-agent              │  │
//! │  │  ┌─────────────┐ ┌─────────────┐ │  │
//! │  │  │  Character  │ │   Systems   │ │  │
//! │  │  └──────┬──────┘ └──────┬──────┘ │  │
//! │  │         │               │         │  │
//! │  │         ▼               ▼         │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │      reverie-core       │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │      reverie-llm        │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `character`: memory store, reflection counter and scratch state
//! - `config`: character sheet, perception tuning, tick timings
//! - `events`: perceptions handed in by the simulation
//! - `systems`: perceive, recall, reflect and tick
//! - `spatial`: read-only spatial memory tree

pub mod character;
pub mod config;
pub mod events;
pub mod spatial;
pub mod systems;

pub use character::{Character, Scratch};
pub use config::{AgentConfig, CharacterSheet};
pub use events::Perception;
pub use spatial::SpatialIndex;
pub use systems::{CharacterSystems, Recollection, TickReport};
