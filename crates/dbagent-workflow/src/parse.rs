//! Line-prefix field parser shared by every stage.
//!
//! The reasoning capability is asked to answer in `KEY: value` lines. Models
//! decorate those lines with bullets, bold markers, or brackets, so each line
//! is cleaned before its key is read. Unknown lines are ignored and later
//! occurrences of a key replace earlier ones.

/// Values that mean "nothing here".
const EMPTY_MARKERS: &[&str] = &["", "none", "null", "n/a", "na", "-"];

#[derive(Debug, Default, Clone)]
pub struct ResponseFields {
    fields: Vec<(String, String)>,
}

impl ResponseFields {
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            let Some((key, value)) = split_field(line) else {
                continue;
            };
            fields.retain(|(k, _)| *k != key);
            fields.push((key, value));
        }
        Self { fields }
    }

    /// Raw value of `key`, if the response carried it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key`, empty when absent or an empty marker.
    pub fn text(&self, key: &str) -> String {
        match self.get(key) {
            Some(v) if !is_empty_marker(v) => v.to_string(),
            _ => String::new(),
        }
    }

    /// `key` split on `separator`, trimmed, with empty entries dropped.
    pub fn list(&self, key: &str, separator: char) -> Vec<String> {
        let value = self.text(key);
        value
            .split(separator)
            .map(|item| clean_item(item))
            .filter(|item| !is_empty_marker(item))
            .collect()
    }

    /// `true`, `yes`, or `1`, case-insensitively. Anything else is false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| {
                let v = v.trim_matches(|c: char| !c.is_ascii_alphanumeric());
                v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v == "1"
            })
            .unwrap_or(false)
    }
}

fn split_field(line: &str) -> Option<(String, String)> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '#' | '>' | '•') || c.is_whitespace());
    let (key, value) = line.split_once(':')?;
    let key = key.trim().trim_matches('*').trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic() || c == '_' || c == ' ') {
        return None;
    }
    let key = key.to_ascii_uppercase().replace(' ', "_");
    Some((key, clean_value(value)))
}

fn clean_value(value: &str) -> String {
    let value = value.trim().trim_matches('*').trim();
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    value.trim().to_string()
}

fn clean_item(item: &str) -> String {
    item.trim()
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '[' | ']'))
        .trim()
        .to_string()
}

pub fn is_empty_marker(value: &str) -> bool {
    let v = value.trim().trim_end_matches('.');
    EMPTY_MARKERS.iter().any(|m| v.eq_ignore_ascii_case(m))
}

/// Remove a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    let body = match body.split_once('\n') {
        Some((tag, rest)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        Some(_) => body,
        None => body
            .trim_start()
            .strip_prefix("sql")
            .or_else(|| body.trim_start().strip_prefix("SQL"))
            .unwrap_or(body),
    };
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_fields() {
        let f = ResponseFields::parse("OPERATION: COUNT\nCONFIDENCE: 0.9\nREASONING: asks how many");
        assert_eq!(f.get("OPERATION"), Some("COUNT"));
        assert_eq!(f.get("confidence"), Some("0.9"));
        assert_eq!(f.text("REASONING"), "asks how many");
    }

    #[test]
    fn tolerates_markdown_decoration() {
        let f = ResponseFields::parse(
            "Here you go:\n- **OPERATION:** [DELETE]\n* CONFIDENCE: 0.7\n## Reasoning: removal",
        );
        assert_eq!(f.get("OPERATION"), Some("DELETE"));
        assert_eq!(f.get("CONFIDENCE"), Some("0.7"));
        assert_eq!(f.get("REASONING"), Some("removal"));
    }

    #[test]
    fn value_keeps_inner_colons() {
        let f = ResponseFields::parse("CONDITIONS: created_at > '2024-01-01 10:00'");
        assert_eq!(f.text("CONDITIONS"), "created_at > '2024-01-01 10:00'");
    }

    #[test]
    fn later_occurrence_wins() {
        let f = ResponseFields::parse("NOTES: first\nNOTES: second");
        assert_eq!(f.text("NOTES"), "second");
    }

    #[test]
    fn lines_without_keys_are_ignored() {
        let f = ResponseFields::parse("SELECT id FROM users WHERE x = 1\n12:30 is the time");
        assert!(f.get("SELECT ID FROM USERS WHERE X = 1").is_none());
        assert!(f.get("12").is_none());
    }

    #[test]
    fn empty_markers_read_as_empty() {
        let f = ResponseFields::parse("CONDITIONS: None\nMISSING_DATA: null\nQUESTIONS: N/A");
        assert_eq!(f.text("CONDITIONS"), "");
        assert!(f.list("MISSING_DATA", ',').is_empty());
        assert!(f.list("QUESTIONS", '|').is_empty());
        assert_eq!(f.text("ABSENT"), "");
    }

    #[test]
    fn lists_split_and_trim() {
        let f = ResponseFields::parse(
            "TABLES: users, `orders` ,\nQUESTIONS: Which user? | What email?|",
        );
        assert_eq!(f.list("TABLES", ','), vec!["users", "orders"]);
        assert_eq!(f.list("QUESTIONS", '|'), vec!["Which user?", "What email?"]);
    }

    #[test]
    fn flags() {
        assert!(ResponseFields::parse("IS_COMPLETE: true").flag("IS_COMPLETE"));
        assert!(ResponseFields::parse("IS_COMPLETE: Yes.").flag("IS_COMPLETE"));
        assert!(ResponseFields::parse("IS_COMPLETE: 1").flag("IS_COMPLETE"));
        assert!(!ResponseFields::parse("IS_COMPLETE: false").flag("IS_COMPLETE"));
        assert!(!ResponseFields::parse("IS_COMPLETE: maybe").flag("IS_COMPLETE"));
        assert!(!ResponseFields::parse("").flag("IS_COMPLETE"));
    }

    #[test]
    fn strip_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT COUNT(*) FROM users;\n```"),
            "SELECT COUNT(*) FROM users;"
        );
        assert_eq!(strip_code_fences("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```sql SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fences("```sql\n```"), "");
    }
}
