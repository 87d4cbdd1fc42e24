use dbagent_types::{AgentError, Classification, ConversationState, ErrorKind, Intent, Result};

use super::{Stage, StageContext, StageOutput, StageRun};
use crate::parse::ResponseFields;
use crate::prompts;

#[derive(Debug, Clone)]
pub struct IntentInput {
    pub user_query: String,
    pub classification: Option<Classification>,
}

impl IntentInput {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            user_query: state.user_query.clone(),
            classification: state.classification.clone(),
        }
    }
}

pub(super) async fn run(input: IntentInput, ctx: &StageContext) -> StageRun {
    let classification = match input.classification {
        Some(ref c) if c.error.is_none() => c,
        _ => {
            let skipped = AgentError::StageSkipped {
                stage: Stage::AnalyzeIntent.name().into(),
                reason: "Classification failed".into(),
            };
            return StageRun::failed(
                StageOutput::Intent(Intent::failed(skipped.to_string())),
                ErrorKind::StageSkipped,
            );
        }
    };

    match analyze(&input.user_query, classification, ctx).await {
        Ok(intent) => StageRun::ok(StageOutput::Intent(intent)),
        Err(e) => {
            tracing::warn!(error = %e, "Intent analysis failed");
            StageRun::from_error(StageOutput::Intent(Intent::failed(e.to_string())), &e)
        }
    }
}

async fn analyze(
    user_query: &str,
    classification: &Classification,
    ctx: &StageContext,
) -> Result<Intent> {
    let schema = ctx.schema().await?;
    let response = ctx
        .reason(
            Stage::AnalyzeIntent,
            &prompts::intent_system(
                &schema,
                classification.operation_kind,
                &classification.reasoning,
            ),
            &prompts::intent_user(user_query),
        )
        .await?;
    Ok(parse_intent(&response))
}

/// Read `INTENT / TABLES / COLUMNS / CONDITIONS`. Every field is optional.
pub fn parse_intent(response: &str) -> Intent {
    let fields = ResponseFields::parse(response);
    Intent {
        description: fields.text("INTENT"),
        tables_needed: fields.list("TABLES", ',').into_iter().collect(),
        columns_needed: fields.list("COLUMNS", ',').into_iter().collect(),
        conditions: fields.text("CONDITIONS"),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_context;
    use crate::testing::{markers, ScriptedReasoner};
    use dbagent_types::OperationKind;

    #[test]
    fn parses_all_fields() {
        let intent = parse_intent(
            "INTENT: count the users\nTABLES: users\nCOLUMNS: id, id\nCONDITIONS: is_active = 1",
        );
        assert_eq!(intent.description, "count the users");
        assert_eq!(intent.tables_needed.len(), 1);
        assert!(intent.tables_needed.contains("users"));
        assert_eq!(intent.columns_needed.len(), 1);
        assert_eq!(intent.conditions, "is_active = 1");
    }

    #[test]
    fn missing_and_none_fields_are_empty() {
        let intent = parse_intent("INTENT: list products\nCONDITIONS: none");
        assert!(intent.tables_needed.is_empty());
        assert!(intent.columns_needed.is_empty());
        assert_eq!(intent.conditions, "");
    }

    #[tokio::test]
    async fn skips_without_calling_reasoner_when_classification_failed() {
        let reasoner = ScriptedReasoner::new().on(markers::INTENT, "INTENT: x");
        let ctx = test_context(reasoner);
        let input = IntentInput {
            user_query: "q".into(),
            classification: Some(Classification::failed("timeout")),
        };
        let run = run(input, &ctx).await;
        assert_eq!(run.failure, Some(ErrorKind::StageSkipped));
        assert_eq!(run.output.error(), Some("Classification failed"));
    }

    #[tokio::test]
    async fn skips_when_classification_absent() {
        let ctx = test_context(ScriptedReasoner::new());
        let run = run(
            IntentInput {
                user_query: "q".into(),
                classification: None,
            },
            &ctx,
        )
        .await;
        assert_eq!(run.output.error(), Some("Classification failed"));
    }

    #[tokio::test]
    async fn prompt_carries_kind_guidance_and_reasoning() {
        let reasoner = std::sync::Arc::new(
            ScriptedReasoner::new().on(markers::INTENT, "INTENT: count\nTABLES: users"),
        );
        let ctx = StageContext {
            reasoner: reasoner.clone(),
            ..test_context(ScriptedReasoner::new())
        };
        let input = IntentInput {
            user_query: "How many users are there?".into(),
            classification: Some(Classification::new(
                OperationKind::Count,
                0.9,
                "asks for a number",
            )),
        };
        let run = run(input, &ctx).await;
        assert!(run.failure.is_none());

        let calls = reasoner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("- What to count"));
        assert!(calls[0].0.contains("Reasoning: asks for a number"));
        assert_eq!(calls[0].1, "Analyze: 'How many users are there?'");
    }

    #[tokio::test]
    async fn captures_capability_failure() {
        let ctx = test_context(ScriptedReasoner::new().fail_on(markers::INTENT, "HTTP 502"));
        let input = IntentInput {
            user_query: "q".into(),
            classification: Some(Classification::new(OperationKind::Select, 0.9, "r")),
        };
        let run = run(input, &ctx).await;
        assert_eq!(run.failure, Some(ErrorKind::CapabilityError));
        assert!(run.output.error().unwrap().contains("HTTP 502"));
    }
}
