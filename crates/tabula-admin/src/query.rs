//! SELECT statement builder

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabula_core::{Result, TabulaError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(TabulaError::Validation(format!("Invalid order direction '{}'", s))),
        }
    }
}

/// A statement with its positional parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Structured SELECT: projections, joins and ANDed conditions
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    projections: Vec<String>,
    from: String,
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<Value>,
    order_by: Option<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectQuery {
    /// `from` is an already quoted table reference, alias included
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    pub fn project(&mut self, expr: impl Into<String>) -> &mut Self {
        self.projections.push(expr.into());
        self
    }

    /// Add a `LEFT OUTER JOIN`; repeated joins are kept once
    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        let join = format!("LEFT OUTER JOIN {} ON {}", table, on);
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
        self
    }

    pub fn condition(&mut self, sql: impl Into<String>, params: Vec<Value>) -> &mut Self {
        self.conditions.push(sql.into());
        self.params.extend(params);
        self
    }

    pub fn order_by(&mut self, expr: impl Into<String>, direction: Direction) -> &mut Self {
        self.order_by = Some((expr.into(), direction));
        self
    }

    pub fn limit(&mut self, limit: u64, offset: Option<u64>) -> &mut Self {
        self.limit = Some(limit);
        self.offset = offset.filter(|o| *o > 0);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    fn from_clause(&self) -> String {
        let mut sql = format!(" FROM {}", self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }

    pub fn build(&self) -> CompiledQuery {
        let projections = if self.projections.is_empty() {
            "*".to_string()
        } else {
            self.projections.join(", ")
        };
        let mut sql = format!("SELECT {}{}", projections, self.from_clause());
        if let Some((expr, direction)) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {} {}", expr, direction.as_sql()));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        CompiledQuery::new(sql, self.params.clone())
    }

    /// Row count under the same joins and conditions, ignoring order and paging
    pub fn count(&self) -> CompiledQuery {
        CompiledQuery::new(
            format!("SELECT COUNT(*){}", self.from_clause()),
            self.params.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_full_select() {
        let mut query = SelectQuery::new("`items` AS `t`");
        query
            .project("`t`.`id`")
            .project("`t`.`title`")
            .left_join("`types` AS `f0`", "`f0`.`id` = `t`.`type_id`")
            .left_join("`types` AS `f0`", "`f0`.`id` = `t`.`type_id`")
            .condition("`f0`.`title` LIKE ?", vec![Value::from("%Ca%")])
            .condition("`t`.`id` > ?", vec![Value::from("1")])
            .order_by("`t`.`title`", Direction::Desc)
            .limit(10, Some(20));

        let compiled = query.build();
        assert_eq!(
            compiled.sql,
            "SELECT `t`.`id`, `t`.`title` FROM `items` AS `t` \
             LEFT OUTER JOIN `types` AS `f0` ON `f0`.`id` = `t`.`type_id` \
             WHERE `f0`.`title` LIKE ? AND `t`.`id` > ? \
             ORDER BY `t`.`title` DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(compiled.params, vec![Value::from("%Ca%"), Value::from("1")]);

        let count = query.count();
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) FROM `items` AS `t` \
             LEFT OUTER JOIN `types` AS `f0` ON `f0`.`id` = `t`.`type_id` \
             WHERE `f0`.`title` LIKE ? AND `t`.`id` > ?"
        );
    }

    #[test]
    fn test_first_page_has_no_offset() {
        let mut query = SelectQuery::new("`t`");
        query.limit(5, Some(0));
        assert_eq!(query.build().sql, "SELECT * FROM `t` LIMIT 5");
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Desc);
    }
}
