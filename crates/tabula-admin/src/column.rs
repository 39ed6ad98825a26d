//! Column metadata parsed from a raw description record

use crate::xtype::XType;
use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tabula_core::{ColumnDescription, KeyKind, Value};

static SIZED_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(varchar|char)\((\d+)\)").expect("valid regex"));

static PRECISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(decimal|numeric|float|double|real)\((\d+)(?:\s*,\s*(\d+))?\)")
        .expect("valid regex")
});

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(tinyint|smallint|mediumint|int|integer|bigint|year)\((\d+)\)")
        .expect("valid regex")
});

static OPTIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(enum|set)\((.*)\)").expect("valid regex"));

static BASE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)").expect("valid regex"));

static OPTION_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'((?:[^'\\]|\\.|'')*)'").expect("valid regex"));

const INTEGER_TYPES: [&str; 6] = ["tinyint", "smallint", "mediumint", "int", "integer", "bigint"];
const FRACTIONAL_TYPES: [&str; 5] = ["decimal", "numeric", "float", "double", "real"];
const TEXT_TYPES: [&str; 6] = ["varchar", "char", "text", "tinytext", "mediumtext", "longtext"];
const TIMESTAMP_SENTINELS: [&str; 3] = ["current_timestamp", "current_timestamp()", "now()"];

/// Parsed form of a SQL type string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedType {
    pub base: String,
    /// Length, `precision,scale`, or the quoted option list of an enum
    pub size: Option<String>,
    pub unsigned: bool,
}

/// Split a SQL type string into base type, size and unsigned flag.
/// The first matching pattern wins.
pub fn parse_type(raw: &str) -> ParsedType {
    let lowered = raw.trim().to_lowercase();
    let unsigned = lowered.split_whitespace().any(|word| word == "unsigned");

    if let Some(caps) = SIZED_TEXT_RE.captures(&lowered) {
        return ParsedType {
            base: caps[1].to_string(),
            size: Some(caps[2].to_string()),
            unsigned,
        };
    }
    if let Some(caps) = PRECISION_RE.captures(&lowered) {
        let size = match caps.get(3) {
            Some(scale) => format!("{},{}", &caps[2], scale.as_str()),
            None => caps[2].to_string(),
        };
        return ParsedType {
            base: caps[1].to_string(),
            size: Some(size),
            unsigned,
        };
    }
    if let Some(caps) = INTEGER_RE.captures(&lowered) {
        return ParsedType {
            base: caps[1].to_string(),
            size: Some(caps[2].to_string()),
            unsigned,
        };
    }
    // Options keep their original case
    if let Some(caps) = OPTIONS_RE.captures(raw.trim()) {
        return ParsedType {
            base: caps[1].to_lowercase(),
            size: Some(caps[2].to_string()),
            unsigned,
        };
    }
    ParsedType {
        base: BASE_WORD_RE
            .captures(&lowered)
            .map(|caps| caps[1].to_string())
            .unwrap_or(lowered.clone()),
        size: None,
        unsigned,
    }
}

/// "type_id" -> "Type Id"
pub fn titlecase(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    table: String,
    name: String,
    raw_type: String,
    base_type: String,
    size: Option<String>,
    unsigned: bool,
    nullable: bool,
    default: Option<String>,
    pk: bool,
    unique: bool,
    auto_increment: bool,
    references: Option<String>,
    comment: Option<String>,
}

impl Column {
    /// `foreign_keys` maps column names of `table` to the tables they reference
    pub fn from_description(
        table: &str,
        desc: &ColumnDescription,
        foreign_keys: &HashMap<String, String>,
    ) -> Self {
        let parsed = parse_type(&desc.column_type);
        Self {
            table: table.to_string(),
            name: desc.field.clone(),
            raw_type: desc.column_type.clone(),
            base_type: parsed.base,
            size: parsed.size,
            unsigned: parsed.unsigned,
            nullable: desc.nullable,
            default: desc.default.clone(),
            pk: desc.key == KeyKind::Primary,
            unique: desc.key == KeyKind::Unique,
            auto_increment: desc.extra.to_lowercase().contains("auto_increment"),
            references: foreign_keys.get(&desc.field).cloned(),
            comment: desc.comment.clone().filter(|c| !c.is_empty()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_type(&self) -> &str {
        &self.raw_type
    }

    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    pub fn size(&self) -> Option<&str> {
        self.size.as_deref()
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Raw default expression as reported by the engine
    pub fn default_expr(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_pk(&self) -> bool {
        self.pk
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn is_fk(&self) -> bool {
        self.references.is_some()
    }

    /// Name of the referenced table of a foreign key column
    pub fn references(&self) -> Option<&str> {
        self.references.as_deref()
    }

    /// Not nullable, without a default, and not filled in by the engine
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.auto_increment
    }

    /// `TINYINT(1)`, nothing else
    pub fn is_boolean(&self) -> bool {
        self.base_type == "tinyint" && self.size.as_deref() == Some("1")
    }

    pub fn is_integer(&self) -> bool {
        INTEGER_TYPES.contains(&self.base_type.as_str())
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || FRACTIONAL_TYPES.contains(&self.base_type.as_str())
    }

    pub fn is_text(&self) -> bool {
        TEXT_TYPES.contains(&self.base_type.as_str())
    }

    pub fn is_point(&self) -> bool {
        self.base_type == "point"
    }

    pub fn is_date(&self) -> bool {
        self.base_type == "date"
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self.base_type.as_str(), "datetime" | "timestamp")
    }

    pub fn is_time(&self) -> bool {
        self.base_type == "time"
    }

    pub fn is_year(&self) -> bool {
        self.base_type == "year"
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.base_type.as_str(), "enum" | "set")
    }

    /// Values allowed by an enum/set column
    pub fn options(&self) -> Vec<String> {
        if !self.is_enum() {
            return Vec::new();
        }
        let list = self.size.as_deref().unwrap_or_default();
        OPTION_ITEM_RE
            .captures_iter(list)
            .map(|caps| caps[1].replace("''", "'").replace("\\'", "'"))
            .collect()
    }

    /// `(precision, scale)` of a decimal column
    pub fn precision_scale(&self) -> Option<(u32, u32)> {
        let size = self.size.as_deref()?;
        let (precision, scale) = size.split_once(',')?;
        Some((precision.trim().parse().ok()?, scale.trim().parse().ok()?))
    }

    /// Default value for a fresh record. A current-timestamp default
    /// resolves to now, formatted for the column's type.
    pub fn default_value(&self) -> Value {
        let Some(default) = self.default.as_deref() else {
            return Value::Null;
        };
        if TIMESTAMP_SENTINELS.contains(&default.trim().to_lowercase().as_str()) {
            let now = Local::now().naive_local();
            return if self.is_date() {
                Value::Date(now.date())
            } else {
                Value::DateTime(now)
            };
        }
        if default.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        Value::String(default.to_string())
    }

    /// Human readable name
    pub fn title_name(&self) -> String {
        titlecase(&self.name)
    }

    pub fn xtype(&self) -> Option<XType> {
        if self.is_fk() {
            return Some(XType::Fk);
        }
        if self.is_boolean() {
            return Some(XType::Boolean);
        }
        let xtype = match self.base_type.as_str() {
            "varchar" | "char" => XType::TextShort,
            "text" | "tinytext" | "mediumtext" | "longtext" => XType::TextLong,
            "decimal" | "numeric" | "float" | "double" | "real" => XType::Decimal,
            "date" => XType::Date,
            "datetime" | "timestamp" => XType::Datetime,
            "time" => XType::Time,
            "year" => XType::Year,
            "enum" | "set" => XType::Enum,
            "point" => XType::Point,
            base if INTEGER_TYPES.contains(&base) => XType::Integer,
            _ => return None,
        };
        Some(xtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(field: &str, ty: &str) -> Column {
        Column::from_description("items", &ColumnDescription::new(field, ty), &HashMap::new())
    }

    #[test]
    fn test_parse_type_patterns() {
        let cases = [
            ("varchar(150)", "varchar", Some("150"), false),
            ("CHAR(2)", "char", Some("2"), false),
            ("decimal(10,2)", "decimal", Some("10,2"), false),
            ("double(8, 3) unsigned", "double", Some("8,3"), true),
            ("int(10) unsigned", "int", Some("10"), true),
            ("year(4)", "year", Some("4"), false),
            ("enum('Red','Green')", "enum", Some("'Red','Green'"), false),
            ("point", "point", None, false),
            ("integer", "integer", None, false),
            ("datetime(6)", "datetime", None, false),
        ];
        for (raw, base, size, unsigned) in cases {
            let parsed = parse_type(raw);
            assert_eq!(parsed.base, base, "{}", raw);
            assert_eq!(parsed.size.as_deref(), size, "{}", raw);
            assert_eq!(parsed.unsigned, unsigned, "{}", raw);
        }
    }

    #[test]
    fn test_required() {
        let mut desc = ColumnDescription::new("title", "varchar(150)");
        desc.nullable = false;
        let required = Column::from_description("items", &desc, &HashMap::new());
        assert!(required.is_required());

        desc.default = Some("untitled".into());
        assert!(!Column::from_description("items", &desc, &HashMap::new()).is_required());

        let mut id = ColumnDescription::new("id", "int(10) unsigned");
        id.nullable = false;
        id.key = KeyKind::Primary;
        id.extra = "auto_increment".into();
        let id = Column::from_description("items", &id, &HashMap::new());
        assert!(!id.is_required());
        assert!(id.is_pk());
        assert!(id.is_auto_increment());
    }

    #[test]
    fn test_boolean_is_tinyint_one_only() {
        assert!(column("active", "tinyint(1)").is_boolean());
        assert!(!column("level", "tinyint(4)").is_boolean());
        assert!(!column("flag", "int(1)").is_boolean());
        assert_eq!(column("active", "tinyint(1)").xtype(), Some(XType::Boolean));
    }

    #[test]
    fn test_foreign_key_detection() {
        let fks = HashMap::from([("type_id".to_string(), "types".to_string())]);
        let col = Column::from_description(
            "items",
            &ColumnDescription::new("type_id", "int(10) unsigned"),
            &fks,
        );
        assert!(col.is_fk());
        assert_eq!(col.references(), Some("types"));
        assert_eq!(col.xtype(), Some(XType::Fk));
        assert_eq!(col.title_name(), "Type Id");
        assert!(!column("type_id", "int(10)").is_fk());
    }

    #[test]
    fn test_enum_options() {
        let col = column("colour", "enum('Red','it''s','Blue')");
        assert!(col.is_enum());
        assert_eq!(col.options(), vec!["Red", "it's", "Blue"]);
        assert!(column("title", "varchar(5)").options().is_empty());
    }

    #[test]
    fn test_default_value() {
        let mut desc = ColumnDescription::new("created", "date");
        desc.default = Some("CURRENT_TIMESTAMP".into());
        let col = Column::from_description("items", &desc, &HashMap::new());
        assert_eq!(col.default_value(), Value::Date(Local::now().date_naive()));

        desc.column_type = "datetime".into();
        let col = Column::from_description("items", &desc, &HashMap::new());
        assert!(matches!(col.default_value(), Value::DateTime(_)));

        desc.default = Some("draft".into());
        let col = Column::from_description("items", &desc, &HashMap::new());
        assert_eq!(col.default_value(), Value::from("draft"));
        assert_eq!(column("x", "int").default_value(), Value::Null);
    }

    #[test]
    fn test_precision_and_categories() {
        let price = column("price", "decimal(8,2)");
        assert_eq!(price.precision_scale(), Some((8, 2)));
        assert!(price.is_numeric());
        assert!(column("title", "varchar(5)").is_text());
        assert!(column("location", "point").is_point());
        assert!(column("at", "timestamp").is_datetime());
        assert_eq!(column("blob", "blob").xtype(), None);
    }

    #[test]
    fn test_titlecase() {
        assert_eq!(titlecase("type_id"), "Type Id");
        assert_eq!(titlecase("title"), "Title");
        assert_eq!(titlecase("ID"), "ID");
    }
}
