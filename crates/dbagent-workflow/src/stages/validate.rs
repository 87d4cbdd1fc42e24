use dbagent_types::{
    AgentError, Classification, ConversationState, ErrorKind, Intent, OperationKind, Result,
    Validation,
};

use super::{Stage, StageContext, StageOutput, StageRun};
use crate::parse::ResponseFields;
use crate::prompts;

// ---------------------------------------------------------------------------
// ValidationPolicy
// ---------------------------------------------------------------------------

/// How strictly a request is checked before any SQL is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    Read,
    Insert,
    Update,
    Delete,
}

/// Words that widen a request to the whole table.
const BROAD_WORDS: &[&str] = &["all", "every", "everything", "entire", "whole", "each", "any"];

/// Words that cannot be the value half of a `column value` pair.
const FILLER_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "from", "for", "with", "where", "and", "or", "are",
    "them", "it", "none", "null", "na", "n", "no", "not", "specified", "unspecified",
    "regardless", "records", "record", "rows", "row", "entries", "entry", "data", "table",
];

/// Words allowed between a column and its value (`name is John`).
const CONNECTORS: &[&str] = &["is", "equals", "equal", "to"];

/// SQL comparison syntax that restricts which rows match.
const COMPARISON: &str =
    r"(?i)(<>|!=|<=|>=|=|<|>|\blike\b|\bglob\b|\bin\s*\(|\bbetween\b|\bis\s+(not\s+)?null\b)";

impl ValidationPolicy {
    /// The policy for an operation kind. UNKNOWN has none.
    pub fn for_kind(kind: OperationKind) -> Option<Self> {
        match kind {
            OperationKind::Select | OperationKind::Count | OperationKind::Aggregate => {
                Some(ValidationPolicy::Read)
            }
            OperationKind::Insert => Some(ValidationPolicy::Insert),
            OperationKind::Update => Some(ValidationPolicy::Update),
            OperationKind::Delete => Some(ValidationPolicy::Delete),
            OperationKind::Unknown => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidationPolicy::Read => "READ",
            ValidationPolicy::Insert => "INSERT",
            ValidationPolicy::Update => "UPDATE",
            ValidationPolicy::Delete => "DELETE",
        }
    }

    /// Checks the capability's verdict cannot override.
    ///
    /// UPDATE and DELETE proceed only when the intent's conditions hold a row
    /// predicate: a comparison, or a schema column followed by a value.
    pub fn enforce(
        &self,
        validation: &mut Validation,
        intent: &Intent,
        user_query: &str,
        schema: &str,
    ) {
        let (missing, verb) = match self {
            ValidationPolicy::Read => return,
            ValidationPolicy::Insert => {
                if intent.tables_needed.is_empty() {
                    validation.require(
                        "Target table",
                        "Which table should the new record be added to?",
                    );
                }
                return;
            }
            ValidationPolicy::Update => ("Update conditions", "updated"),
            ValidationPolicy::Delete => ("Delete conditions", "deleted"),
        };

        let columns = known_columns(intent, schema);
        if has_row_predicate(&intent.conditions, &columns) {
            return;
        }
        let question = if is_tautology(&intent.conditions)
            || is_broad(user_query)
            || is_broad(&intent.conditions)
        {
            format!("That would affect every row. Which records exactly should be {verb}?")
        } else {
            format!(
                "Which records should be {verb}? Please give a specific condition, such as an id or a status."
            )
        };
        validation.require(missing, question);
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// `true` when `text` asks for all rows ("all", "every", "everything", ...).
pub fn is_broad(text: &str) -> bool {
    tokens(text)
        .iter()
        .any(|word| BROAD_WORDS.contains(&word.as_str()))
}

/// Column names from `  - name (TYPE)` schema lines plus the intent's columns.
fn known_columns(intent: &Intent, schema: &str) -> Vec<String> {
    let from_schema = schema.lines().filter_map(|line| {
        let rest = line.trim_start().strip_prefix("- ")?;
        let name = rest.split_whitespace().next()?;
        Some(name.to_lowercase())
    });
    intent
        .columns_needed
        .iter()
        .map(|c| c.to_lowercase())
        .chain(from_schema)
        .collect()
}

/// `true` when `conditions` restricts rows: a comparison that is not a
/// tautology, or a known column directly followed by a value.
pub fn has_row_predicate(conditions: &str, columns: &[String]) -> bool {
    if conditions.trim().is_empty() || is_tautology(conditions) {
        return false;
    }
    let compares = regex::Regex::new(COMPARISON)
        .map(|re| re.is_match(conditions))
        .unwrap_or(false);
    if compares {
        return true;
    }

    let words: Vec<String> = tokens(conditions)
        .into_iter()
        .filter(|w| !CONNECTORS.contains(&w.as_str()))
        .collect();
    words.windows(2).any(|pair| {
        let (column, value) = (&pair[0], &pair[1]);
        columns.contains(column)
            && !columns.contains(value)
            && !BROAD_WORDS.contains(&value.as_str())
            && !FILLER_WORDS.contains(&value.as_str())
    })
}

/// Conditions such as `1=1` or `TRUE` that match every row.
fn is_tautology(conditions: &str) -> bool {
    let compact: String = conditions
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let compact = compact.strip_prefix("where").unwrap_or(&compact);
    if compact == "true" {
        return true;
    }
    match compact.split_once('=') {
        Some((l, r)) => !l.is_empty() && l == r && !l.contains(['<', '>', '!']),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ValidateInput {
    pub user_query: String,
    pub classification: Option<Classification>,
    pub intent: Option<Intent>,
}

impl ValidateInput {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            user_query: state.user_query.clone(),
            classification: state.classification.clone(),
            intent: state.intent.clone(),
        }
    }
}

pub(super) async fn run(input: ValidateInput, ctx: &StageContext) -> StageRun {
    let (classification, intent) = match (&input.classification, &input.intent) {
        (Some(c), Some(i)) if c.error.is_none() && i.error.is_none() => (c, i),
        _ => {
            let skipped = AgentError::StageSkipped {
                stage: Stage::Validate.name().into(),
                reason: "Previous stage failed".into(),
            };
            return StageRun::failed(
                StageOutput::Validation(Validation::failed(skipped.to_string())),
                ErrorKind::StageSkipped,
            );
        }
    };

    let Some(policy) = ValidationPolicy::for_kind(classification.operation_kind) else {
        let mut validation = Validation::from_completeness(false);
        validation.require(
            "Operation type unclear",
            "What type of database operation do you want to perform?",
        );
        return StageRun::failed(
            StageOutput::Validation(validation),
            ErrorKind::ValidationFailure,
        );
    };

    match validate(policy, &input.user_query, intent, ctx).await {
        Ok((mut validation, schema)) => {
            policy.enforce(&mut validation, intent, &input.user_query, &schema);
            if validation.can_proceed {
                StageRun::ok(StageOutput::Validation(validation))
            } else {
                tracing::info!(
                    policy = policy.label(),
                    missing = ?validation.missing_data,
                    "Request incomplete"
                );
                StageRun::failed(
                    StageOutput::Validation(validation),
                    ErrorKind::ValidationFailure,
                )
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Validation failed");
            let mut validation = Validation::failed(e.to_string());
            validation
                .clarification_questions
                .push("Could you rephrase your request?".into());
            StageRun::from_error(StageOutput::Validation(validation), &e)
        }
    }
}

async fn validate(
    policy: ValidationPolicy,
    user_query: &str,
    intent: &Intent,
    ctx: &StageContext,
) -> Result<(Validation, String)> {
    let schema = ctx.schema().await?;
    let response = ctx
        .reason(
            Stage::Validate,
            &prompts::validation_system(policy, &schema, intent, user_query),
            &prompts::validation_user(policy, user_query),
        )
        .await?;
    Ok((parse_validation(&response), schema))
}

/// Read `IS_COMPLETE / MISSING_DATA / QUESTIONS / NOTES`. A missing verdict
/// counts as incomplete.
pub fn parse_validation(response: &str) -> Validation {
    let fields = ResponseFields::parse(response);
    Validation {
        missing_data: fields.list("MISSING_DATA", ','),
        clarification_questions: fields.list("QUESTIONS", '|'),
        notes: fields.text("NOTES"),
        ..Validation::from_completeness(fields.flag("IS_COMPLETE"))
    }
}
