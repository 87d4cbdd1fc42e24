use dbagent_types::ExecutionResult;
use serde_json::Value;

/// Render an execution result for the console.
///
/// Reads become a `col | col` table under a dash rule, writes become their
/// confirmation message, failures become `Error: ...`.
pub fn format_results(result: &ExecutionResult) -> String {
    if !result.success {
        return format!(
            "Error: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
    }

    if !result.operation_kind.is_read() {
        if result.message.is_empty() {
            return "Operation completed successfully.".to_string();
        }
        return result.message.clone();
    }

    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let headers: Vec<String> = if result.column_names.is_empty() {
        result.rows[0].keys().cloned().collect()
    } else {
        result.column_names.clone()
    };
    let header = headers.join(" | ");
    let mut lines = vec![header.clone(), "-".repeat(header.chars().count())];
    for row in &result.rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| row.get(h).map(cell).unwrap_or_default())
            .collect();
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbagent_types::{OperationKind, Row};
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn table_keeps_column_order() {
        let result = ExecutionResult::read(
            OperationKind::Select,
            vec!["name".into(), "age".into()],
            vec![
                row(&[("name", json!("John Doe")), ("age", json!(30))]),
                row(&[("name", json!("Jane Smith")), ("age", Value::Null)]),
            ],
        );
        assert_eq!(
            format_results(&result),
            "name | age\n----------\nJohn Doe | 30\nJane Smith | NULL"
        );
    }

    #[test]
    fn empty_read() {
        let result = ExecutionResult::read(OperationKind::Count, Vec::new(), Vec::new());
        assert_eq!(format_results(&result), "No results found.");
    }

    #[test]
    fn write_and_failure() {
        let write = ExecutionResult::write(OperationKind::Delete, 1);
        assert_eq!(
            format_results(&write),
            "DELETE executed successfully. 1 rows affected."
        );

        let failed = ExecutionResult::failed(OperationKind::Select, "Database error: boom");
        assert_eq!(format_results(&failed), "Error: Database error: boom");
    }
}
