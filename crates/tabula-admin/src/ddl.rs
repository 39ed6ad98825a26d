//! Facts pulled out of `CREATE TABLE` / `CREATE VIEW` text.
//!
//! Neither engine exposes foreign keys through the column description
//! records, so they are read back from the defining DDL. The patterns
//! accept backtick, double quote, bracket and bare identifiers, with an
//! optional schema prefix on the referenced table.

use regex::Regex;
use std::sync::LazyLock;

const IDENT: &str = r#"(?:`(?:[^`]|``)+`|"(?:[^"]|"")+"|\[[^\]]+\]|[A-Za-z0-9_$]+)"#;

static TABLE_FK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)(?:CONSTRAINT\s+(?P<name>{id})\s+)?FOREIGN\s+KEY\s*(?:{id}\s*)?\(\s*(?P<col>{id})\s*\)\s*REFERENCES\s+(?:{id}\s*\.\s*)?(?P<table>{id})\s*\(\s*(?P<ref>{id})\s*\)",
        id = IDENT
    ))
    .expect("valid regex")
});

static INLINE_FK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*(?P<col>{id})\s.*?\bREFERENCES\s+(?:{id}\s*\.\s*)?(?P<table>{id})\s*(?:\(\s*(?P<ref>{id})\s*\))?",
        id = IDENT
    ))
    .expect("valid regex")
});

static VIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:ALGORITHM\s*=\s*\w+\s+)?(?:DEFINER\s*=\s*\S+\s+)?(?:SQL\s+SECURITY\s+\w+\s+)?(?:TEMP(?:ORARY)?\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:{id}\s*\.\s*)?{id}\s*(?:\([^)]*\)\s*)?AS\b",
        id = IDENT
    ))
    .expect("valid regex")
});

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCOMMENT\s*=\s*'((?:[^'\\]|\\.|'')*)'").expect("valid regex")
});

const TABLE_CONSTRAINT_KEYWORDS: [&str; 8] = [
    "CONSTRAINT",
    "FOREIGN",
    "PRIMARY",
    "UNIQUE",
    "CHECK",
    "KEY",
    "INDEX",
    "FULLTEXT",
];

/// One `FOREIGN KEY` found in a table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    /// Constraint name, when the DDL names one
    pub constraint: Option<String>,
    pub column: String,
    pub referenced_table: String,
    /// Referenced column; `None` for an inline reference to the target's primary key
    pub referenced_column: Option<String>,
}

/// `(column, referenced_table)` pairs of every foreign key in `ddl`
pub fn extract_foreign_keys(ddl: &str) -> Vec<(String, String)> {
    extract_foreign_key_constraints(ddl)
        .into_iter()
        .map(|fk| (fk.column, fk.referenced_table))
        .collect()
}

pub fn extract_foreign_key_constraints(ddl: &str) -> Vec<ForeignKeyConstraint> {
    let mut found: Vec<ForeignKeyConstraint> = TABLE_FK_RE
        .captures_iter(ddl)
        .map(|caps| ForeignKeyConstraint {
            constraint: caps.name("name").map(|m| unquote(m.as_str())),
            column: unquote(&caps["col"]),
            referenced_table: unquote(&caps["table"]),
            referenced_column: Some(unquote(&caps["ref"])),
        })
        .collect();

    for definition in column_definitions(ddl) {
        let first_word = definition
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if TABLE_CONSTRAINT_KEYWORDS.contains(&first_word.as_str()) {
            continue;
        }
        let Some(caps) = INLINE_FK_RE.captures(definition) else {
            continue;
        };
        let column = unquote(&caps["col"]);
        if found.iter().any(|fk| fk.column == column) {
            continue;
        }
        found.push(ForeignKeyConstraint {
            constraint: None,
            column,
            referenced_table: unquote(&caps["table"]),
            referenced_column: caps.name("ref").map(|m| unquote(m.as_str())),
        });
    }

    found
}

pub fn is_view_definition(ddl: &str) -> bool {
    VIEW_RE.is_match(ddl)
}

/// The table level `COMMENT='...'` option, if any
pub fn table_comment(ddl: &str) -> Option<String> {
    COMMENT_RE
        .captures_iter(ddl)
        .last()
        .map(|caps| caps[1].replace("''", "'").replace("\\'", "'"))
}

/// Strip identifier quoting
pub fn unquote(identifier: &str) -> String {
    let s = identifier.trim();
    let mut chars = s.chars();
    match (chars.next(), chars.next_back()) {
        (Some('`'), Some('`')) => s[1..s.len() - 1].replace("``", "`"),
        (Some('"'), Some('"')) => s[1..s.len() - 1].replace("\"\"", "\""),
        (Some('['), Some(']')) => s[1..s.len() - 1].to_string(),
        _ => s.to_string(),
    }
}

/// Top level comma separated entries between the outermost parentheses
fn column_definitions(ddl: &str) -> Vec<&str> {
    let Some(open) = ddl.find('(') else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = open + 1;

    for (idx, ch) in ddl.char_indices().skip_while(|(i, _)| *i <= open) {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '`' | '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' if depth == 0 => {
                parts.push(&ddl[start..idx]);
                return parts;
            }
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&ddl[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const MYSQL_DDL: &str = indoc! {"
        CREATE TABLE `items` (
          `id` int(10) unsigned NOT NULL AUTO_INCREMENT,
          `title` varchar(150) NOT NULL,
          `type_id` int(10) unsigned NOT NULL,
          `owner_id` int(10) unsigned DEFAULT NULL,
          PRIMARY KEY (`id`),
          UNIQUE KEY `title` (`title`),
          KEY `type_id` (`type_id`),
          CONSTRAINT `items_ibfk_1` FOREIGN KEY (`type_id`) REFERENCES `types` (`id`),
          CONSTRAINT `items_ibfk_2` FOREIGN KEY (`owner_id`) REFERENCES `crm`.`people` (`id`) ON DELETE SET NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='Stock, it''s all here'
    "};

    #[test]
    fn test_mysql_constraints() {
        let fks = extract_foreign_key_constraints(MYSQL_DDL);
        assert_eq!(
            fks,
            vec![
                ForeignKeyConstraint {
                    constraint: Some("items_ibfk_1".into()),
                    column: "type_id".into(),
                    referenced_table: "types".into(),
                    referenced_column: Some("id".into()),
                },
                ForeignKeyConstraint {
                    constraint: Some("items_ibfk_2".into()),
                    column: "owner_id".into(),
                    referenced_table: "people".into(),
                    referenced_column: Some("id".into()),
                },
            ]
        );
        assert_eq!(
            extract_foreign_keys(MYSQL_DDL),
            vec![
                ("type_id".to_string(), "types".to_string()),
                ("owner_id".to_string(), "people".to_string()),
            ]
        );
    }

    #[test]
    fn test_sqlite_inline_and_table_references() {
        let ddl = indoc! {r#"
            CREATE TABLE "items" (
              "id" INTEGER PRIMARY KEY AUTOINCREMENT,
              "title" VARCHAR(150) NOT NULL,
              "type_id" INTEGER NOT NULL REFERENCES "types"("id"),
              parent INTEGER REFERENCES items,
              shop_id INTEGER,
              FOREIGN KEY (shop_id) REFERENCES [shops] ([id])
            )
        "#};
        let fks = extract_foreign_keys(ddl);
        assert_eq!(
            fks,
            vec![
                ("shop_id".to_string(), "shops".to_string()),
                ("type_id".to_string(), "types".to_string()),
                ("parent".to_string(), "items".to_string()),
            ]
        );
        let parent = extract_foreign_key_constraints(ddl)
            .into_iter()
            .find(|fk| fk.column == "parent")
            .unwrap();
        assert_eq!(parent.referenced_column, None);
    }

    #[test]
    fn test_no_foreign_keys() {
        assert!(extract_foreign_keys("CREATE TABLE t (id INT, note TEXT DEFAULT 'a, b')").is_empty());
        assert!(extract_foreign_keys("").is_empty());
    }

    #[test]
    fn test_view_detection() {
        assert!(is_view_definition(
            "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `v` AS select 1"
        ));
        assert!(is_view_definition("CREATE VIEW v AS SELECT * FROM items"));
        assert!(!is_view_definition(MYSQL_DDL));
        assert!(!is_view_definition("CREATE TABLE review (id INT)"));
        assert!(!is_view_definition("CREATE TABLE `view` (id INT)"));
        assert!(!is_view_definition("CREATE TABLE view_log (note VARCHAR(10) DEFAULT 'VIEW x AS y')"));
        assert!(is_view_definition("CREATE TEMP VIEW IF NOT EXISTS main.\"v\" (a, b) AS SELECT 1, 2"));
        assert!(is_view_definition("create or replace view `v`\nas select 1"));
    }

    #[test]
    fn test_table_comment() {
        assert_eq!(table_comment(MYSQL_DDL).as_deref(), Some("Stock, it's all here"));
        assert_eq!(table_comment("CREATE TABLE t (id INT)"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("`we``ird`"), "we`ird");
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote("[y]"), "y");
        assert_eq!(unquote("plain"), "plain");
    }
}
