//! User facing column types and their SQL spelling

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabula_core::{Result, SqlDialect, TabulaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XType {
    TextShort,
    TextLong,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Time,
    Year,
    Fk,
    Enum,
    Point,
}

impl XType {
    pub const ALL: [XType; 12] = [
        XType::TextShort,
        XType::TextLong,
        XType::Integer,
        XType::Decimal,
        XType::Boolean,
        XType::Date,
        XType::Datetime,
        XType::Time,
        XType::Year,
        XType::Fk,
        XType::Enum,
        XType::Point,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            XType::TextShort => "text_short",
            XType::TextLong => "text_long",
            XType::Integer => "integer",
            XType::Decimal => "decimal",
            XType::Boolean => "boolean",
            XType::Date => "date",
            XType::Datetime => "datetime",
            XType::Time => "time",
            XType::Year => "year",
            XType::Fk => "fk",
            XType::Enum => "enum",
            XType::Point => "point",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            XType::TextShort => "Text (short)",
            XType::TextLong => "Text (long)",
            XType::Integer => "Integer",
            XType::Decimal => "Decimal",
            XType::Boolean => "Boolean",
            XType::Date => "Date",
            XType::Datetime => "Date and time",
            XType::Time => "Time",
            XType::Year => "Year",
            XType::Fk => "Cross reference",
            XType::Enum => "Fixed list",
            XType::Point => "Point",
        }
    }

    /// Size used when the caller gives none
    pub fn default_size(&self) -> Option<&'static str> {
        match self {
            XType::TextShort => Some("150"),
            XType::Integer => Some("10"),
            XType::Decimal => Some("10,2"),
            XType::Year => Some("4"),
            _ => None,
        }
    }

    /// SQL type for a column of this kind.
    ///
    /// `size` is a length for text and integers, `precision,scale` for
    /// decimals, and a comma separated option list for enums.
    pub fn sql_definition(&self, size: Option<&str>, dialect: SqlDialect) -> Result<String> {
        let size = size
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.default_size());

        let sql = match self {
            XType::TextShort => format!("VARCHAR({})", numeric_size(size, "150")?),
            XType::TextLong => "TEXT".to_string(),
            XType::Integer => format!("INT({})", numeric_size(size, "10")?),
            XType::Decimal => {
                let spec = size.unwrap_or("10,2");
                let valid = spec
                    .split(',')
                    .all(|part| !part.trim().is_empty() && part.trim().chars().all(|c| c.is_ascii_digit()));
                if !valid {
                    return Err(TabulaError::Validation(format!(
                        "Invalid decimal size '{}', expected precision,scale",
                        spec
                    )));
                }
                format!("DECIMAL({})", spec.replace(' ', ""))
            }
            XType::Boolean => "TINYINT(1)".to_string(),
            XType::Date => "DATE".to_string(),
            XType::Datetime => "DATETIME".to_string(),
            XType::Time => "TIME".to_string(),
            XType::Year => format!("YEAR({})", numeric_size(size, "4")?),
            XType::Fk => match dialect {
                SqlDialect::MySql => "INT(10) UNSIGNED".to_string(),
                SqlDialect::Sqlite => "INT(10)".to_string(),
            },
            XType::Enum => {
                let options: Vec<String> = size
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(|o| dialect.quote_string(o.trim_matches('\'')))
                    .collect();
                if options.is_empty() {
                    return Err(TabulaError::Validation(
                        "An enum column needs at least one option".into(),
                    ));
                }
                format!("ENUM({})", options.join(","))
            }
            XType::Point => "POINT".to_string(),
        };
        Ok(sql)
    }
}

fn numeric_size<'a>(size: Option<&'a str>, fallback: &'a str) -> Result<&'a str> {
    let size = size.unwrap_or(fallback);
    if size.chars().all(|c| c.is_ascii_digit()) {
        Ok(size)
    } else {
        Err(TabulaError::Validation(format!("Invalid column size '{}'", size)))
    }
}

impl std::fmt::Display for XType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for XType {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        XType::ALL
            .into_iter()
            .find(|x| x.name() == s.trim())
            .ok_or_else(|| TabulaError::Validation(format!("Unknown column type '{}'", s)))
    }
}
