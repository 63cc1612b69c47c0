//! Translation of PostgreSQL column default expressions.
//!
//! Defaults arrive as raw text from `information_schema.columns.column_default`.
//! Translation is textual pattern matching over [`DEFAULT_RULES`]; the first
//! rule that matches decides the clause. Nothing is validated here: a default
//! SQLite cannot parse fails later, when the table is created.

/// Translated default for a destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    /// Sequence-backed column; becomes the table's auto-increment primary key.
    AutoIncrement,
    /// `DEFAULT <expr>` with the expression written verbatim.
    Value(String),
}

impl ColumnDefault {
    /// Column clause as written after the type.
    pub fn clause(&self) -> String {
        match self {
            ColumnDefault::AutoIncrement => "PRIMARY KEY AUTOINCREMENT".to_string(),
            ColumnDefault::Value(expr) => format!("DEFAULT {}", expr),
        }
    }

    /// Whether this default replaces the NOT NULL clause.
    pub fn is_primary_key(&self) -> bool {
        matches!(self, ColumnDefault::AutoIncrement)
    }
}

/// One entry of the ordered default-translation table.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRule {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<ColumnDefault>,
}

/// Rules in priority order. New dialect quirks are added here.
pub const DEFAULT_RULES: &[DefaultRule] = &[
    DefaultRule {
        name: "sequence",
        apply: sequence_default,
    },
    DefaultRule {
        name: "current_timestamp",
        apply: timestamp_default,
    },
    DefaultRule {
        name: "boolean",
        apply: boolean_default,
    },
    DefaultRule {
        name: "type_cast",
        apply: cast_default,
    },
];

/// Translate a PostgreSQL default expression.
pub fn translate_default(expr: &str) -> ColumnDefault {
    DEFAULT_RULES
        .iter()
        .find_map(|rule| (rule.apply)(expr))
        .unwrap_or_else(|| ColumnDefault::Value(expr.to_string()))
}

fn sequence_default(expr: &str) -> Option<ColumnDefault> {
    expr.starts_with("nextval").then_some(ColumnDefault::AutoIncrement)
}

fn timestamp_default(expr: &str) -> Option<ColumnDefault> {
    (expr.eq_ignore_ascii_case("CURRENT_TIMESTAMP") || expr.eq_ignore_ascii_case("now()"))
        .then(|| ColumnDefault::Value("CURRENT_TIMESTAMP".to_string()))
}

fn boolean_default(expr: &str) -> Option<ColumnDefault> {
    match expr {
        "true" => Some(ColumnDefault::Value("1".to_string())),
        "false" => Some(ColumnDefault::Value("0".to_string())),
        _ => None,
    }
}

// 'active'::character varying -> 'active'
fn cast_default(expr: &str) -> Option<ColumnDefault> {
    expr.split_once("::")
        .map(|(prefix, _)| ColumnDefault::Value(prefix.to_string()))
}
