//! Uncompiled (JSON) leaf definitions, assembled into SQL at run time.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::interface::Interface;

/// SQL fragments of a JSON-defined leaf.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fragments {
    #[serde(default)]
    pub select: Vec<String>,

    #[serde(default)]
    pub from: Option<String>,

    /// Conditions, joined with AND.
    #[serde(default, rename = "where")]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub group_by: Vec<String>,

    /// Conditions, joined with AND.
    #[serde(default)]
    pub having: Vec<String>,

    #[serde(default)]
    pub order_by: Vec<String>,
}

/// A JSON leaf definition: fragments plus the same declarations a compiled
/// interface carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonDefinition {
    #[serde(flatten)]
    pub fragments: Fragments,

    #[serde(flatten)]
    pub interface: Interface,
}

impl Fragments {
    /// Assemble the statement.
    ///
    /// # Examples
    ///
    /// ```
    /// use termql::fragments::Fragments;
    ///
    /// let fragments = Fragments {
    ///     select: vec!["id".into(), "name".into()],
    ///     from: Some("users".into()),
    ///     conditions: vec!["active = 1".into()],
    ///     ..Default::default()
    /// };
    /// assert_eq!(
    ///     fragments.to_sql("users").unwrap(),
    ///     "SELECT id, name FROM users WHERE (active = 1)"
    /// );
    /// ```
    pub fn to_sql(&self, leaf: &str) -> Result<String> {
        if self.select.is_empty() {
            return Err(QueryError::Schema(format!(
                "json leaf '{}' has no select fragment",
                leaf
            )));
        }
        let mut sql = format!("SELECT {}", self.select.join(", "));
        if let Some(from) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conjunction(&self.conditions));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&conjunction(&self.having));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        Ok(sql)
    }

    /// Whether `field` is already produced by the select list, bare or aliased.
    pub fn selects(&self, field: &str) -> bool {
        self.select.iter().any(|item| {
            let item = item.trim();
            item == field
                || item.rsplit_once(" AS ").is_some_and(|(_, alias)| alias.trim().trim_matches('"') == field)
                || item.rsplit_once('.').is_some_and(|(_, column)| column == field)
        })
    }
}

fn conjunction(conditions: &[String]) -> String {
    conditions
        .iter()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}
