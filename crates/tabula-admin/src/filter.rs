//! Table filters and their SQL conditions

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabula_core::{Result, SqlDialect, TabulaError, Value, escape_like};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "like")]
    Contains,
    #[serde(rename = "not like")]
    NotContains,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = "empty")]
    IsEmpty,
    #[serde(rename = "not empty")]
    IsNotEmpty,
    #[serde(rename = "in")]
    OneOf,
    #[serde(rename = "not in")]
    NotOneOf,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "<")]
    Less,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Contains,
        Operator::NotContains,
        Operator::Equals,
        Operator::NotEquals,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
        Operator::OneOf,
        Operator::NotOneOf,
        Operator::GreaterOrEqual,
        Operator::Greater,
        Operator::LessOrEqual,
        Operator::Less,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Contains => "like",
            Operator::NotContains => "not like",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::IsEmpty => "empty",
            Operator::IsNotEmpty => "not empty",
            Operator::OneOf => "in",
            Operator::NotOneOf => "not in",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
            Operator::LessOrEqual => "<=",
            Operator::Less => "<",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operator::Contains => "contains",
            Operator::NotContains => "does not contain",
            Operator::Equals => "is",
            Operator::NotEquals => "is not",
            Operator::IsEmpty => "is empty",
            Operator::IsNotEmpty => "is not empty",
            Operator::OneOf => "is one of",
            Operator::NotOneOf => "is not one of",
            Operator::GreaterOrEqual => "is greater than or equal to",
            Operator::Greater => "is greater than",
            Operator::LessOrEqual => "is less than or equal to",
            Operator::Less => "is less than",
        }
    }

    /// Operators that take no value
    pub fn is_emptiness_check(&self) -> bool {
        matches!(self, Operator::IsEmpty | Operator::IsNotEmpty)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.symbol() == wanted)
            .ok_or_else(|| TabulaError::Validation(format!("'{}' is not a valid operator", s)))
    }
}

/// A validated filter held by a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: Operator,
    pub value: String,
    /// Match the raw foreign key id instead of the referenced title
    pub force: bool,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Checks the operator's value requirement; column existence is the table's job
    pub fn validate(&self) -> Result<()> {
        if !self.operator.is_emptiness_check() && self.value.trim().is_empty() {
            return Err(TabulaError::Validation(format!(
                "A value is required for '{}' {}",
                self.column,
                self.operator.label()
            )));
        }
        Ok(())
    }

    /// Values of a set membership filter, split on newlines and commas
    pub fn in_values(&self) -> Vec<String> {
        self.value
            .split(['\n', '\r', ','])
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Loosely typed filter as submitted by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub force: bool,
}

impl FilterSpec {
    pub fn new(column: &str, operator: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
            force: false,
        }
    }

    pub fn to_filter(&self) -> Result<Filter> {
        let operator = self.operator.parse()?;
        let filter = Filter {
            column: self.column.clone(),
            operator,
            value: self.value.clone(),
            force: self.force,
        };
        filter.validate()?;
        Ok(filter)
    }
}

/// WHERE fragment for `filter` applied to the SQL expression `target`
pub fn filter_condition(
    dialect: SqlDialect,
    target: &str,
    filter: &Filter,
) -> (String, Vec<Value>) {
    let as_text = dialect.cast_to_text(target);
    match filter.operator {
        Operator::Contains | Operator::NotContains => {
            let keyword = if filter.operator == Operator::NotContains {
                "NOT LIKE"
            } else {
                "LIKE"
            };
            (
                format!("{} {} ? {}", as_text, keyword, dialect.like_escape_clause()),
                vec![Value::String(format!("%{}%", escape_like(filter.value.trim())))],
            )
        }
        Operator::IsEmpty => (format!("({} IS NULL OR {} = '')", target, as_text), vec![]),
        Operator::IsNotEmpty => (
            format!("({} IS NOT NULL AND {} != '')", target, as_text),
            vec![],
        ),
        Operator::OneOf | Operator::NotOneOf => {
            let values = filter.in_values();
            let negate = filter.operator == Operator::NotOneOf;
            if values.is_empty() {
                let always = if negate { "1 = 1" } else { "1 = 0" };
                return (always.to_string(), vec![]);
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            (
                format!(
                    "{} {} ({})",
                    target,
                    if negate { "NOT IN" } else { "IN" },
                    placeholders
                ),
                values.into_iter().map(Value::String).collect(),
            )
        }
        Operator::Equals
        | Operator::NotEquals
        | Operator::GreaterOrEqual
        | Operator::Greater
        | Operator::LessOrEqual
        | Operator::Less => (
            format!("{} {} ?", target, filter.operator.symbol()),
            vec![Value::String(filter.value.clone())],
        ),
    }
}
