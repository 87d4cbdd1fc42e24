use dbagent_types::{ConversationState, Validation};

use super::{StageOutput, StageRun};

#[derive(Debug, Clone)]
pub struct ClarifyInput {
    pub validation: Option<Validation>,
}

impl ClarifyInput {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            validation: state.validation.clone(),
        }
    }
}

pub(super) fn run(input: ClarifyInput) -> StageRun {
    let message = match input.validation {
        Some(ref v) => clarification_message(v),
        None => clarification_message(&Validation::default()),
    };
    StageRun::ok(StageOutput::Clarification(message))
}

/// Numbered questions when there are any, otherwise the missing items,
/// otherwise a generic request for detail.
pub fn clarification_message(validation: &Validation) -> String {
    let questions = &validation.clarification_questions;
    let missing = &validation.missing_data;
    if questions.is_empty() && missing.is_empty() {
        return "I need more information to proceed. Could you provide more details?".to_string();
    }

    let mut lines = vec!["I need some additional information to complete your request:".to_string()];
    if questions.is_empty() {
        lines.push(format!("Missing data: {}", missing.join(", ")));
    } else {
        lines.extend(
            questions
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {q}", i + 1)),
        );
    }
    lines.join("\n")
}
