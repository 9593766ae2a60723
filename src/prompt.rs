use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use thiserror::Error;

use crate::message::Message;

/// How a downstream consumer blends toward a transition target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Scalar blend of prompt weights.
    Linear,
    /// Spherical blend, for consumers whose prompt state is a normalized
    /// embedding rather than a scalar.
    #[default]
    Slerp,
}

/// A prompt for instant application: text and weight replace whatever
/// the consumer currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptDirective {
    pub text: String,
    pub weight: f32,
}

/// Instruction to interpolate from the consumer's current prompt state
/// to a target over a fixed number of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionPlan {
    pub target_text: String,
    pub target_weight: f32,
    pub steps: u32,
    pub method: InterpolationMethod,
}

/// What [`PromptManager::inject_if_new`] hands downstream when the text
/// changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum PromptOutput {
    Instant(PromptDirective),
    Transition(TransitionPlan),
}

impl PromptOutput {
    /// Render as a structured bus message, so a stage can forward
    /// directives over a channel unchanged.
    pub fn to_message(&self) -> Message {
        let mut fields = Map::new();
        match self {
            PromptOutput::Instant(directive) => {
                fields.insert(
                    "prompts".into(),
                    json!([{ "text": directive.text, "weight": directive.weight }]),
                );
            }
            PromptOutput::Transition(plan) => {
                fields.insert(
                    "transition".into(),
                    json!({
                        "target_prompts": [{ "text": plan.target_text, "weight": plan.target_weight }],
                        "num_steps": plan.steps,
                        "method": plan.method,
                    }),
                );
            }
        }
        Message::Structured(fields)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PromptError {
    /// Weight must be a finite, non-negative scalar. Anything else is a
    /// caller bug and gets rejected rather than clamped.
    #[error("invalid prompt weight {0}")]
    InvalidWeight(f32),
}

/// Turns discrete model responses into deduplicated downstream
/// directives.
///
/// An output is produced only when the offered text differs from the
/// last text an output was produced for. The dedup key is the text
/// alone: re-offering identical text with a different weight stays
/// silent, and a weight change takes effect the next time the text
/// changes.
#[derive(Debug, Default)]
pub struct PromptManager {
    last_emitted: String,
}

impl PromptManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text the manager last produced an output for, if any.
    pub fn last_emitted(&self) -> Option<&str> {
        (!self.last_emitted.is_empty()).then_some(self.last_emitted.as_str())
    }

    /// Evaluate `text` against the last emitted value.
    ///
    /// Empty or repeated text produces nothing; absence of an answer is
    /// "no update", not an error. New text produces an instant directive
    /// when `steps` is zero, otherwise a transition plan of `steps`
    /// interpolation steps ending at the new text and weight, starting
    /// from whatever the consumer currently holds.
    pub fn inject_if_new(
        &mut self,
        text: &str,
        weight: f32,
        steps: u32,
        method: InterpolationMethod,
    ) -> Result<Option<PromptOutput>, PromptError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(PromptError::InvalidWeight(weight));
        }
        if text.is_empty() || text == self.last_emitted {
            return Ok(None);
        }

        self.last_emitted = text.to_string();
        let output = if steps == 0 {
            PromptOutput::Instant(PromptDirective {
                text: text.to_string(),
                weight,
            })
        } else {
            PromptOutput::Transition(TransitionPlan {
                target_text: text.to_string(),
                target_weight: weight,
                steps,
                method,
            })
        };
        Ok(Some(output))
    }
}
