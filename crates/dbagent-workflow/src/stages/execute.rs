use dbagent_types::{ConversationState, ErrorKind, ExecutionResult, GeneratedQuery};

use super::{StageContext, StageOutput, StageRun};

#[derive(Debug, Clone)]
pub struct ExecuteInput {
    pub generated_query: Option<GeneratedQuery>,
}

impl ExecuteInput {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            generated_query: state.generated_query.clone(),
        }
    }
}

pub(super) async fn run(input: ExecuteInput, ctx: &StageContext) -> StageRun {
    let query = match input.generated_query {
        Some(q) if q.error.is_none() => q,
        Some(q) => {
            return StageRun::failed(
                StageOutput::Execution(ExecutionResult::failed(
                    q.operation_kind,
                    "No valid SQL to execute",
                )),
                ErrorKind::StageSkipped,
            );
        }
        None => {
            return StageRun::failed(
                StageOutput::Execution(ExecutionResult::failed(
                    dbagent_types::OperationKind::Unknown,
                    "No valid SQL to execute",
                )),
                ErrorKind::StageSkipped,
            );
        }
    };

    let kind = query.operation_kind;
    if query.query_text.trim().is_empty() {
        return StageRun::failed(
            StageOutput::Execution(ExecutionResult::failed(kind, "No SQL query provided")),
            ErrorKind::StageSkipped,
        );
    }

    tracing::debug!(kind = %kind, sql = %query.query_text, "Executing statement");
    match ctx.execute(&query.query_text, kind).await {
        Ok(result) if result.success => StageRun::ok(StageOutput::Execution(result)),
        Ok(result) => StageRun::failed(StageOutput::Execution(result), ErrorKind::CapabilityError),
        Err(e) => {
            tracing::warn!(error = %e, "Execution failed");
            StageRun::from_error(
                StageOutput::Execution(ExecutionResult::failed(kind, e.to_string())),
                &e,
            )
        }
    }
}
