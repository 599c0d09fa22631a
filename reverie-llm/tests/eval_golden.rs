//! Prompt Quality Evaluation: Golden Test Set.
//!
//! A curated set of prompt renderings with strings that must (and must
//! not) appear, so template edits that drop a variable or the JSON
//! instruction are caught offline.
//!
//! Run with `cargo test -p reverie-llm --test eval_golden`.

use reverie_llm::prompt::{self, PromptEngine, PromptId};

/// A golden test case for prompt evaluation.
struct GoldenCase {
    /// Human-readable name for the test case.
    name: &'static str,
    /// Which prompt to render.
    id: PromptId,
    /// Template variables to fill in.
    vars: Vec<(&'static str, &'static str)>,
    /// Strings that MUST appear in the rendered user prompt.
    prompt_must_contain: Vec<&'static str>,
    /// Strings that MUST NOT appear in the rendered user prompt.
    prompt_must_not_contain: Vec<&'static str>,
}

const ISABELLA: (&str, &str) = ("persona_name", "Isabella Rodriguez");
const ISABELLA_ISS: (&str, &str) = (
    "persona_identity",
    "Isabella Rodriguez is a cafe owner of Hobbs Cafe who loves to make people feel welcome.",
);

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        // ---------------------------------------------------------------
        // Reflection
        // ---------------------------------------------------------------
        GoldenCase {
            name: "focal_points_over_recent_statements",
            id: PromptId::FocalPoints,
            vars: vec![
                ISABELLA,
                ISABELLA_ISS,
                (
                    "statements",
                    "Isabella Rodriguez is planning a Valentine's Day party\nIsabella Rodriguez is decorating Hobbs Cafe",
                ),
                ("count", "3"),
            ],
            prompt_must_contain: vec!["Valentine's Day party", "3 most salient", "\"focal_points\""],
            prompt_must_not_contain: vec!["{statements}", "{count}", "{{"],
        },
        GoldenCase {
            name: "insights_cite_numbered_statements",
            id: PromptId::Insights,
            vars: vec![
                ISABELLA,
                ISABELLA_ISS,
                ("statements", "0. Isabella is baking\n1. Isabella is inviting Klaus\n"),
                ("count", "5"),
            ],
            prompt_must_contain: vec![
                "Statements about Isabella Rodriguez",
                "0. Isabella is baking",
                "What 5 high-level insights",
                "statement numbers",
            ],
            prompt_must_not_contain: vec!["{persona_name}", "{count}"],
        },
        // ---------------------------------------------------------------
        // Perception
        // ---------------------------------------------------------------
        GoldenCase {
            name: "triple_for_action",
            id: PromptId::EventTriple,
            vars: vec![ISABELLA, ISABELLA_ISS, ("description", "Isabella Rodriguez is brewing coffee")],
            prompt_must_contain: vec!["brewing coffee", "\"subject\"", "\"predicate\"", "\"object\""],
            prompt_must_not_contain: vec!["{description}"],
        },
        GoldenCase {
            name: "event_poignancy_mundane_anchor",
            id: PromptId::EventPoignancy,
            vars: vec![ISABELLA, ISABELLA_ISS, ("description", "Isabella Rodriguez is making her bed")],
            prompt_must_contain: vec!["brushing teeth", "college acceptance", "making her bed", "Isabella Rodriguez"],
            prompt_must_not_contain: vec!["{description}", "conversation"],
        },
        GoldenCase {
            name: "chat_poignancy_conversation_anchor",
            id: PromptId::ChatPoignancy,
            vars: vec![ISABELLA, ISABELLA_ISS, ("description", "Isabella Rodriguez is conversing with Klaus Mueller")],
            prompt_must_contain: vec!["routine morning greetings", "conversing with Klaus Mueller"],
            prompt_must_not_contain: vec!["{description}", "brushing teeth"],
        },
        // ---------------------------------------------------------------
        // Conversation
        // ---------------------------------------------------------------
        GoldenCase {
            name: "planning_thought_from_transcript",
            id: PromptId::PlanningThought,
            vars: vec![
                ISABELLA,
                ISABELLA_ISS,
                (
                    "transcript",
                    "Isabella Rodriguez: Will you come to the party?\nKlaus Mueller: Sure, at 5pm.",
                ),
            ],
            prompt_must_contain: vec!["[Conversation]", "at 5pm", "for their planning", "\"thought\""],
            prompt_must_not_contain: vec!["{transcript}"],
        },
        GoldenCase {
            name: "memo_thought_from_transcript",
            id: PromptId::MemoThought,
            vars: vec![
                ISABELLA,
                ISABELLA_ISS,
                ("transcript", "Klaus Mueller: I am writing about gentrification."),
            ],
            prompt_must_contain: vec!["gentrification", "might have found interesting"],
            prompt_must_not_contain: vec!["{transcript}", "{persona_name}"],
        },
    ]
}

// ---------------------------------------------------------------------------
// Offline Tests: Template Rendering Validation
// ---------------------------------------------------------------------------

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    let engine = PromptEngine::builtin();

    for case in golden_cases() {
        let (system, user) = engine.render(case.id, &case.vars).expect("builtin template");

        assert!(
            system.contains("Hobbs Cafe"),
            "Golden case '{}': system prompt must carry the persona identity",
            case.name
        );

        for needle in &case.prompt_must_contain {
            assert!(
                user.contains(needle),
                "Golden case '{}': rendered prompt must contain '{}' but doesn't.\nRendered:\n{}",
                case.name,
                needle,
                &user[..user.len().min(500)]
            );
        }

        for needle in &case.prompt_must_not_contain {
            assert!(
                !user.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{}' but does.\nRendered:\n{}",
                case.name,
                needle,
                &user[..user.len().min(500)]
            );
        }
    }
}

#[test]
fn golden_set_covers_every_prompt() {
    let cases = golden_cases();
    for id in PromptId::all() {
        assert!(
            cases.iter().any(|c| c.id == *id),
            "no golden case for prompt '{id}'"
        );
    }
}

#[test]
fn all_prompts_have_json_output_instruction() {
    let engine = PromptEngine::builtin();
    for id in PromptId::all() {
        let template = engine.get(*id).expect("builtin");
        assert!(
            template.user.contains("JSON"),
            "User prompt '{id}' must instruct the model to return JSON"
        );
    }
}

#[test]
fn system_prompt_has_persona_slots() {
    assert!(prompt::PERSONA_SYSTEM.contains("{persona_name}"));
    assert!(prompt::PERSONA_SYSTEM.contains("{persona_identity}"));
    assert!(prompt::PERSONA_SYSTEM.contains("JSON"));
}
