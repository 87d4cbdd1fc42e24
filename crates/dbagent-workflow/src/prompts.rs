//! Prompt templates. Each stage asks for `KEY: value` lines that
//! [`ResponseFields`](crate::parse::ResponseFields) can read back.

use dbagent_types::{Intent, OperationKind};

use crate::stages::ValidationPolicy;

pub fn classify_system(schema: &str, context: &str) -> String {
    format!(
        "You classify natural-language database requests.

DATABASE SCHEMA:
{schema}

CONVERSATION CONTEXT:
{context}

OPERATION TYPES:
SELECT    - read or list data (\"show users\", \"find orders\")
COUNT     - count records (\"how many users\", \"number of products\")
AGGREGATE - calculations over numeric columns (\"average price\", \"total revenue\")
INSERT    - add new records (\"add a user\", \"create a product\")
UPDATE    - change existing records (\"change the price\", \"set status\")
DELETE    - remove records (\"delete user\", \"remove orders\")
UNKNOWN   - the operation cannot be determined

Match table and column names from the schema, tie calculation words to numeric
columns, and judge the primary intent. Answer UNKNOWN only when the request is
genuinely unclear.

Respond in exactly this format:
OPERATION: <operation type>
CONFIDENCE: <number between 0.0 and 1.0>
REASONING: <one sentence>"
    )
}

pub fn classify_user(query: &str) -> String {
    format!("Classify: '{query}'")
}

/// What the intent analysis should pin down for each kind.
pub fn operation_guidance(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Select => {
            "- Which columns to display\n- Which tables contain the data\n- Any filtering conditions\n- How tables relate"
        }
        OperationKind::Count => {
            "- What to count\n- Which table to count from\n- Any filtering conditions"
        }
        OperationKind::Aggregate => {
            "- Which numeric columns to calculate (SUM, AVG, etc.)\n- Which tables contain the data\n- Any grouping needed"
        }
        OperationKind::Insert => "- Which table to insert into\n- What data to insert",
        OperationKind::Update => {
            "- Which table to update\n- Which columns to modify\n- Which records to update"
        }
        OperationKind::Delete => "- Which table to delete from\n- Which records to delete",
        OperationKind::Unknown => "- What the user wants to accomplish",
    }
}

pub fn intent_system(schema: &str, kind: OperationKind, reasoning: &str) -> String {
    format!(
        "You analyze user intent for a {kind} database operation.

DATABASE SCHEMA:
{schema}

CLASSIFICATION:
Operation: {kind}
Reasoning: {reasoning}
Determine:
{guidance}

Respond in exactly this format:
INTENT: <what the user wants>
TABLES: <table names, comma-separated>
COLUMNS: <column names, comma-separated>
CONDITIONS: <filtering conditions, or none>",
        guidance = operation_guidance(kind),
    )
}

pub fn intent_user(query: &str) -> String {
    format!("Analyze: '{query}'")
}

fn intent_summary(intent: &Intent, query: &str) -> String {
    let join = |set: &std::collections::BTreeSet<String>| {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    format!(
        "- Intent: {}\n- Tables: {}\n- Columns: {}\n- Conditions: {}\n- Original query: {}",
        intent.description,
        join(&intent.tables_needed),
        join(&intent.columns_needed),
        if intent.conditions.is_empty() {
            "none"
        } else {
            intent.conditions.as_str()
        },
        query,
    )
}

pub fn validation_system(
    policy: ValidationPolicy,
    schema: &str,
    intent: &Intent,
    query: &str,
) -> String {
    let checks = match policy {
        ValidationPolicy::Read => {
            "For READ operations (SELECT/COUNT/AGGREGATE), check:
1. Is the target table clearly identified?
2. Is the requested data clear enough?
3. Are any filters clear enough?
Most read requests can proceed with minimal information."
        }
        ValidationPolicy::Insert => {
            "For INSERT operations, check:
1. Is the target table known?
2. Are values given for every required (NOT NULL, non-default) column?
3. Which required values must be asked for?"
        }
        ValidationPolicy::Update => {
            "For UPDATE operations, check:
1. Is it known WHICH records to update (WHERE conditions)?
2. Is it known WHAT the new values are?
3. Are the conditions specific enough to avoid touching too many records?
An UPDATE without a precise WHERE condition is unsafe and needs clarification."
        }
        ValidationPolicy::Delete => {
            "For DELETE operations, check:
1. Are there SPECIFIC conditions identifying the records to delete?
2. Are they precise enough to avoid deleting too much data?
3. Could this affect many records?
Broad deletions such as \"delete all\" or \"delete everything\" always need explicit clarification."
        }
    };
    format!(
        "You validate whether this {label} operation has enough information to run.

DATABASE SCHEMA:
{schema}

INTENT ANALYSIS:
{summary}

{checks}

Respond in exactly this format:
IS_COMPLETE: <true or false>
MISSING_DATA: <missing items, comma-separated, or none>
QUESTIONS: <questions for the user, separated by |, or none>
NOTES: <brief explanation>",
        label = policy.label(),
        summary = intent_summary(intent, query),
    )
}

pub fn validation_user(policy: ValidationPolicy, query: &str) -> String {
    format!("Validate {} operation for: {query}", policy.label())
}

pub fn generate_system(schema: &str, kind: OperationKind, intent: &Intent, query: &str) -> String {
    format!(
        "You are a SQL expert. Write ONE complete, executable SQLite statement.

DATABASE SCHEMA:
{schema}

INTENT ANALYSIS:
{summary}
- Operation: {kind}

Use subqueries or JOINs as needed so the request is served by a single statement.
For COUNT and AGGREGATE give result columns short aliases.
Return ONLY the SQL statement, with no explanation.",
        summary = intent_summary(intent, query),
    )
}

pub fn generate_user(query: &str) -> String {
    format!("Generate SQL for: {query}")
}
