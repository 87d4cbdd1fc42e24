use dbagent_types::{
    AgentError, ConversationState, ErrorKind, GeneratedQuery, Intent, OperationKind, Result,
    Validation,
};

use super::{Stage, StageContext, StageOutput, StageRun};
use crate::parse::strip_code_fences;
use crate::prompts;

#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub user_query: String,
    pub operation_kind: OperationKind,
    pub intent: Option<Intent>,
    pub validation: Option<Validation>,
}

impl GenerateInput {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            user_query: state.user_query.clone(),
            operation_kind: state.operation_kind(),
            intent: state.intent.clone(),
            validation: state.validation.clone(),
        }
    }
}

pub(super) async fn run(input: GenerateInput, ctx: &StageContext) -> StageRun {
    let kind = input.operation_kind;
    let intent = match (&input.validation, &input.intent) {
        (Some(v), Some(i)) if v.can_proceed && i.error.is_none() => i,
        _ => {
            return StageRun::failed(
                StageOutput::GeneratedQuery(GeneratedQuery::failed(kind, "Data validation failed")),
                ErrorKind::StageSkipped,
            );
        }
    };

    match generate(&input.user_query, kind, intent, ctx).await {
        Ok(query_text) => StageRun::ok(StageOutput::GeneratedQuery(GeneratedQuery {
            query_text,
            operation_kind: kind,
            error: None,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "SQL generation failed");
            StageRun::from_error(
                StageOutput::GeneratedQuery(GeneratedQuery::failed(
                    kind,
                    format!("SQL generation error: {e}"),
                )),
                &e,
            )
        }
    }
}

async fn generate(
    user_query: &str,
    kind: OperationKind,
    intent: &Intent,
    ctx: &StageContext,
) -> Result<String> {
    let schema = ctx.schema().await?;
    let response = ctx
        .reason(
            Stage::GenerateQuery,
            &prompts::generate_system(&schema, kind, intent, user_query),
            &prompts::generate_user(user_query),
        )
        .await?;
    let sql = strip_code_fences(&response);
    if sql.is_empty() {
        return Err(AgentError::ParseError {
            stage: Stage::GenerateQuery.name().into(),
            message: "empty statement".into(),
        });
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_context;
    use crate::testing::{markers, ScriptedReasoner};

    fn ready(kind: OperationKind) -> GenerateInput {
        GenerateInput {
            user_query: "How many users are there?".into(),
            operation_kind: kind,
            intent: Some(Intent {
                description: "count users".into(),
                tables_needed: ["users".to_string()].into_iter().collect(),
                ..Intent::default()
            }),
            validation: Some(Validation::from_completeness(true)),
        }
    }

    #[tokio::test]
    async fn strips_fences_from_statement() {
        let ctx = test_context(
            ScriptedReasoner::new().on(markers::GENERATE, "```sql\nSELECT COUNT(*) AS count FROM users;\n```"),
        );
        let run = run(ready(OperationKind::Count), &ctx).await;
        assert!(run.failure.is_none());
        match run.output {
            StageOutput::GeneratedQuery(q) => {
                assert_eq!(q.query_text, "SELECT COUNT(*) AS count FROM users;");
                assert_eq!(q.operation_kind, OperationKind::Count);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_when_validation_cannot_proceed() {
        let ctx = test_context(ScriptedReasoner::new().on(markers::GENERATE, "SELECT 1"));
        let mut input = ready(OperationKind::Select);
        input.validation = Some(Validation::from_completeness(false));
        let run = run(input, &ctx).await;
        assert_eq!(run.failure, Some(ErrorKind::StageSkipped));
        assert_eq!(run.output.error(), Some("Data validation failed"));
    }

    #[tokio::test]
    async fn empty_statement_is_error() {
        let ctx = test_context(ScriptedReasoner::new().on(markers::GENERATE, "```sql\n```"));
        let run = run(ready(OperationKind::Select), &ctx).await;
        assert_eq!(run.failure, Some(ErrorKind::ParseError));
        assert!(run
            .output
            .error()
            .unwrap()
            .starts_with("SQL generation error:"));
    }

    #[tokio::test]
    async fn capability_failure_is_captured() {
        let ctx = test_context(ScriptedReasoner::new().fail_on(markers::GENERATE, "quota"));
        let run = run(ready(OperationKind::Select), &ctx).await;
        assert_eq!(run.failure, Some(ErrorKind::CapabilityError));
        match run.output {
            StageOutput::GeneratedQuery(q) => {
                assert!(q.query_text.is_empty());
                assert!(q.error.unwrap().contains("quota"));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }
}
