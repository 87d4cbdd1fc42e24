use dbagent_types::{AgentError, Classification, ConversationState, OperationKind, Result};

use super::{Stage, StageContext, StageOutput, StageRun};
use crate::parse::ResponseFields;
use crate::prompts;

#[derive(Debug, Clone)]
pub struct ClassifyInput {
    pub user_query: String,
    /// Rendered recent conversation, oldest first.
    pub context: String,
}

impl ClassifyInput {
    pub fn from_state(state: &ConversationState, window: usize) -> Self {
        Self {
            user_query: state.user_query.clone(),
            context: state.conversation_context(window),
        }
    }
}

pub(super) async fn run(input: ClassifyInput, ctx: &StageContext) -> StageRun {
    match classify(&input, ctx).await {
        Ok(classification) => StageRun::ok(StageOutput::Classification(classification)),
        Err(e) => {
            tracing::warn!(error = %e, "Classification failed");
            StageRun::from_error(
                StageOutput::Classification(Classification::failed(e.to_string())),
                &e,
            )
        }
    }
}

async fn classify(input: &ClassifyInput, ctx: &StageContext) -> Result<Classification> {
    let schema = ctx.schema().await?;
    let response = ctx
        .reason(
            Stage::Classify,
            &prompts::classify_system(&schema, &input.context),
            &prompts::classify_user(&input.user_query),
        )
        .await?;
    parse_classification(&response)
}

/// Read `OPERATION / CONFIDENCE / REASONING`. An unrecognised operation is
/// UNKNOWN and a missing confidence is 0; a confidence that is present but
/// not a number is a parse error.
pub fn parse_classification(response: &str) -> Result<Classification> {
    let fields = ResponseFields::parse(response);

    let kind = fields
        .get("OPERATION")
        .and_then(OperationKind::from_token)
        .unwrap_or(OperationKind::Unknown);

    let confidence = match fields.get("CONFIDENCE").map(str::trim) {
        None | Some("") => 0.0,
        Some(raw) => {
            let (number, percent) = match raw.strip_suffix('%') {
                Some(n) => (n.trim(), true),
                None => (raw, false),
            };
            let value: f64 = number.parse().map_err(|_| AgentError::ParseError {
                stage: Stage::Classify.name().into(),
                message: format!("invalid confidence '{raw}'"),
            })?;
            if percent {
                value / 100.0
            } else {
                value
            }
        }
    };

    Ok(Classification::new(kind, confidence, fields.text("REASONING")))
}
