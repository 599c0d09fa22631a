//! Prompt templates for Reverie cognition requests.
//!
//! Every prompt is a versioned, testable artifact. The built-in templates
//! below can be overridden by a directory of TOML files, one per
//! [`PromptId`].

/// Persona framing shared by every prompt.
pub const PERSONA_SYSTEM: &str = r"You are helping simulate {persona_name}, a character in a small town.
{persona_identity}

RULES:
- Answer only from the information given.
- Your response must be a single valid JSON object and nothing else.";

/// Focal points over recent statements (Tier 2).
pub const FOCAL_POINTS_USER: &str = r#"{statements}
Given only the information above, what are the {count} most salient high-level questions we can answer about the subjects in the statements?

Return JSON:
{{"focal_points": ["question 1", "question 2", ...]}}"#;

/// Insights with evidence indices over numbered statements (Tier 2).
pub const INSIGHTS_USER: &str = r#"Statements about {persona_name}:
{statements}
What {count} high-level insights can you infer from the above statements?
Cite the statements each insight is based on by their numbers.

Return JSON mapping each insight to the list of statement numbers it relies on:
{{"insight one": [0, 3], "insight two": [1]}}"#;

/// Subject/predicate/object summary of a description (Tier 1).
pub const EVENT_TRIPLE_USER: &str = r#"Summarize the following action as a (subject, predicate, object) triple.
The subject is usually the person acting.

Action: {description}

Return JSON:
{{"subject": "...", "predicate": "...", "object": "..."}}"#;

/// Poignancy of an event or thought (Tier 1).
pub const EVENT_POIGNANCY_USER: &str = r#"On the scale of 1 to 10, where 1 is purely mundane (e.g., brushing teeth, making bed) and 10 is extremely poignant (e.g., a break up, college acceptance), rate the likely poignancy of the following piece of memory for {persona_name}.

Memory: {description}

Return JSON:
{{"poignancy": <integer 1-10>}}"#;

/// Poignancy of a conversation (Tier 1).
pub const CHAT_POIGNANCY_USER: &str = r#"On the scale of 1 to 10, where 1 is purely mundane (e.g., routine morning greetings) and 10 is extremely poignant (e.g., a conversation about breaking up, a fight), rate the likely poignancy of the following conversation for {persona_name}.

Conversation: {description}

Return JSON:
{{"poignancy": <integer 1-10>}}"#;

/// What to remember from a conversation for planning (Tier 2).
pub const PLANNING_THOUGHT_USER: &str = r#"[Conversation]
{transcript}
Write down if there is anything from the conversation that {persona_name} needs to remember for their planning, from {persona_name}'s perspective, in a full sentence.

Return JSON (the sentence should not start with the name):
{{"thought": "..."}}"#;

/// What was interesting about a conversation (Tier 2).
pub const MEMO_THOUGHT_USER: &str = r#"[Conversation]
{transcript}
Write down if there is anything from the conversation that {persona_name} might have found interesting, from {persona_name}'s perspective, in a full sentence.

Return JSON (the sentence should continue after the name, e.g. "found it interesting that ..."):
{{"thought": "..."}}"#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value, then unescapes `{{` and
/// `}}` into literal braces.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result.replace("{{", "{").replace("}}", "}")
}

// ---------------------------------------------------------------------------
// PromptEngine: Versioned TOML Template Loader
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmTier};

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Focal points to reflect on.
    FocalPoints,
    /// Insights citing numbered statements.
    Insights,
    /// (subject, predicate, object) extraction.
    EventTriple,
    /// Poignancy of an event or thought.
    EventPoignancy,
    /// Poignancy of a conversation.
    ChatPoignancy,
    /// Planning note after a conversation.
    PlanningThought,
    /// Memo after a conversation.
    MemoThought,
}

impl PromptId {
    /// Returns the TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::FocalPoints => "focal_points.toml",
            Self::Insights => "insights.toml",
            Self::EventTriple => "event_triple.toml",
            Self::EventPoignancy => "event_poignancy.toml",
            Self::ChatPoignancy => "chat_poignancy.toml",
            Self::PlanningThought => "planning_thought.toml",
            Self::MemoThought => "memo_thought.toml",
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[
            Self::FocalPoints,
            Self::Insights,
            Self::EventTriple,
            Self::EventPoignancy,
            Self::ChatPoignancy,
            Self::PlanningThought,
            Self::MemoThought,
        ]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FocalPoints => "focal_points",
            Self::Insights => "insights",
            Self::EventTriple => "event_triple",
            Self::EventPoignancy => "event_poignancy",
            Self::ChatPoignancy => "chat_poignancy",
            Self::PlanningThought => "planning_thought",
            Self::MemoThought => "memo_thought",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focal_points" => Ok(Self::FocalPoints),
            "insights" => Ok(Self::Insights),
            "event_triple" => Ok(Self::EventTriple),
            "event_poignancy" => Ok(Self::EventPoignancy),
            "chat_poignancy" => Ok(Self::ChatPoignancy),
            "planning_thought" => Ok(Self::PlanningThought),
            "memo_thought" => Ok(Self::MemoThought),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    tier: u8,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    system: Option<String>,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Prompt version string (e.g., "1.0").
    pub version: String,
    /// Model tier the prompt runs on.
    pub tier: LlmTier,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt template (contains `{key}` placeholders).
    pub system: String,
    /// User prompt template (contains `{key}` placeholders).
    pub user: String,
}

impl PromptTemplate {
    fn builtin(tier: LlmTier, max_tokens: u32, temperature: f32, user: &str) -> Self {
        Self {
            version: "builtin".into(),
            tier,
            max_tokens,
            temperature,
            system: PERSONA_SYSTEM.into(),
            user: user.into(),
        }
    }
}

/// Engine that loads versioned TOML prompt templates and renders them.
///
/// # Example
///
/// ```no_run
/// use reverie_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::builtin();
/// let request = engine
///     .request(PromptId::EventPoignancy, &[
///         ("persona_name", "Isabella Rodriguez"),
///         ("description", "Isabella is planning a party"),
///     ])
///     .expect("built-in template");
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl PromptEngine {
    /// Create a `PromptEngine` pre-loaded with the built-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        use LlmTier::{LargeModel, SmallLocal};

        let templates = HashMap::from([
            (PromptId::FocalPoints, PromptTemplate::builtin(LargeModel, 200, 0.5, FOCAL_POINTS_USER)),
            (PromptId::Insights, PromptTemplate::builtin(LargeModel, 400, 0.5, INSIGHTS_USER)),
            (PromptId::EventTriple, PromptTemplate::builtin(SmallLocal, 60, 0.0, EVENT_TRIPLE_USER)),
            (PromptId::EventPoignancy, PromptTemplate::builtin(SmallLocal, 20, 0.0, EVENT_POIGNANCY_USER)),
            (PromptId::ChatPoignancy, PromptTemplate::builtin(SmallLocal, 20, 0.0, CHAT_POIGNANCY_USER)),
            (PromptId::PlanningThought, PromptTemplate::builtin(LargeModel, 120, 0.7, PLANNING_THOUGHT_USER)),
            (PromptId::MemoThought, PromptTemplate::builtin(LargeModel, 120, 0.7, MEMO_THOUGHT_USER)),
        ]);
        Self { templates }
    }

    /// The built-in templates, with any TOML files in `dir` taking
    /// precedence. Unknown files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if a matching file cannot be read
    /// or parsed.
    pub fn with_overrides(dir: impl AsRef<Path>) -> Result<Self, LlmError> {
        let mut engine = Self::builtin();
        engine.templates.extend(Self::load_directory(dir.as_ref())?);
        Ok(engine)
    }

    /// Load prompt templates from a directory of TOML files only.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if a file cannot be parsed or no
    /// template was found.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, LlmError> {
        let dir = dir.as_ref();
        let templates = Self::load_directory(dir)?;
        if templates.is_empty() {
            return Err(LlmError::ConfigError(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            )));
        }
        Ok(Self { templates })
    }

    fn load_directory(dir: &Path) -> Result<HashMap<PromptId, PromptTemplate>, LlmError> {
        let mut templates = HashMap::new();
        for id in PromptId::all() {
            let path: PathBuf = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                LlmError::ConfigError(format!("failed to read {}: {e}", path.display()))
            })?;
            let parsed: TomlPromptFile = toml::from_str(&content).map_err(|e| {
                LlmError::ConfigError(format!("failed to parse {}: {e}", path.display()))
            })?;

            let d = parsed.prompt;
            templates.insert(*id, PromptTemplate {
                version: d.version,
                tier: LlmTier::from_level(d.tier),
                max_tokens: d.max_tokens,
                temperature: d.temperature,
                system: d.system.unwrap_or_else(|| PERSONA_SYSTEM.to_string()),
                user: d.user,
            });
        }
        Ok(templates)
    }

    /// Get a loaded prompt template by ID.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render both system and user prompts for a given ID.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the prompt ID is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String), LlmError> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt template '{id}' not loaded")))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Render a prompt into a ready-to-send request using the template's
    /// tier, token budget and temperature.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the prompt ID is not loaded.
    pub fn request(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<LlmRequest, LlmError> {
        let (system, user) = self.render(id, vars)?;
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt template '{id}' not loaded")))?;
        Ok(LlmRequest {
            system,
            user,
            tier: tpl.tier,
            max_tokens: tpl.max_tokens,
            temperature: tpl.temperature,
            json_mode: true,
            timeout_ms: 30_000,
        })
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// List all loaded prompt IDs.
    #[must_use]
    pub fn loaded_ids(&self) -> Vec<PromptId> {
        self.templates.keys().copied().collect()
    }
}
