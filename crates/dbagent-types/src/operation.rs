use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Select,
    Count,
    Aggregate,
    Insert,
    Update,
    Delete,
    Unknown,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Select,
        OperationKind::Count,
        OperationKind::Aggregate,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Select => "SELECT",
            OperationKind::Count => "COUNT",
            OperationKind::Aggregate => "AGGREGATE",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Unknown => "UNKNOWN",
        }
    }

    /// Parse an operation token, ignoring case and surrounding markup such as
    /// `**COUNT**` or `[DELETE]`. Returns `None` for anything outside the set.
    pub fn from_token(token: &str) -> Option<Self> {
        let cleaned = token
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_uppercase();
        Self::ALL.into_iter().find(|k| k.as_str() == cleaned)
    }

    /// SELECT, COUNT and AGGREGATE return rows; everything else reports affected rows.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            OperationKind::Select | OperationKind::Count | OperationKind::Aggregate
        )
    }

    pub fn safety_level(&self) -> SafetyLevel {
        match self {
            OperationKind::Select | OperationKind::Count | OperationKind::Aggregate => {
                SafetyLevel::Safe
            }
            OperationKind::Insert => SafetyLevel::Caution,
            OperationKind::Update | OperationKind::Delete => SafetyLevel::Dangerous,
            OperationKind::Unknown => SafetyLevel::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperationKind::Select => "Retrieve data from the database",
            OperationKind::Count => "Count records in the database",
            OperationKind::Aggregate => "Perform calculations on data",
            OperationKind::Insert => "Add new data to the database",
            OperationKind::Update => "Modify existing data",
            OperationKind::Delete => "Remove data from the database",
            OperationKind::Unknown => "Unknown operation type",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SafetyLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Dangerous,
    Unknown,
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafetyLevel::Safe => "SAFE",
            SafetyLevel::Caution => "CAUTION",
            SafetyLevel::Dangerous => "DANGEROUS",
            SafetyLevel::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}
