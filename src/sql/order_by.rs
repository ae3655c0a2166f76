//! ORDER BY clause generation.
//!
//! Column references may be namespaced by a join-alias chain, e.g.
//! `profile__bio` refers to column `bio` of the join aliased `profile`.
//! References are resolved against the base table or the supplied join
//! groups and quoted with the dialect's identifier escaper.

use crate::db::driver::{AnsiQuoting, EscapeIdentifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Separates a join-alias chain from the column name in a reference.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("Invalid sort direction: {other}")),
        }
    }
}

/// Turns the qualified column expressions of one spec into a single SQL term.
pub type OrderTransform = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// One sort key: the columns it covers, its direction and an optional transform.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct OrderSpec {
    pub columns: Vec<String>,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(skip)]
    pub transform: Option<OrderTransform>,
}

impl fmt::Debug for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSpec")
            .field("columns", &self.columns)
            .field("direction", &self.direction)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl OrderSpec {
    pub fn new<I, S>(columns: I, direction: SortDirection) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            direction,
            transform: None,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new([column.into()], SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new([column.into()], SortDirection::Desc)
    }

    /// Combine the resolved column expressions with `transform`, e.g. into
    /// `COALESCE(a, b)`.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

/// A joined table alias and the column it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub alias: String,
    pub column: String,
}

impl JoinDescriptor {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// Builds ORDER BY fragments with a given identifier escaper.
#[derive(Debug, Clone, Copy)]
pub struct OrderByBuilder<'a, E: EscapeIdentifier + ?Sized> {
    escaper: &'a E,
}

impl<'a, E: EscapeIdentifier + ?Sized> OrderByBuilder<'a, E> {
    pub fn new(escaper: &'a E) -> Self {
        Self { escaper }
    }

    /// Build the fragment, or an empty string when no spec resolves to a column.
    ///
    /// `join_groups` are searched group by group; the first descriptor whose
    /// alias equals a reference's chain wins. Passing `None` drops every
    /// namespaced reference; passing groups that do not contain the chain
    /// qualifies the full reference with `table` instead.
    pub fn build(
        &self,
        table: &str,
        specs: &[OrderSpec],
        join_groups: Option<&[Vec<JoinDescriptor>]>,
    ) -> String {
        let terms: Vec<String> = specs
            .iter()
            .filter_map(|spec| {
                let columns: Vec<String> = spec
                    .columns
                    .iter()
                    .filter_map(|reference| self.resolve(table, reference, join_groups))
                    .collect();
                if columns.is_empty() {
                    return None;
                }
                // Without a transform every column carries the direction itself
                Some(match &spec.transform {
                    Some(transform) => format!("{} {}", transform(&columns), spec.direction),
                    None => columns
                        .iter()
                        .map(|column| format!("{} {}", column, spec.direction))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            })
            .collect();

        if terms.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", terms.join(", "))
        }
    }

    fn resolve(
        &self,
        table: &str,
        reference: &str,
        join_groups: Option<&[Vec<JoinDescriptor>]>,
    ) -> Option<String> {
        let Some((chain, column)) = reference.rsplit_once(NAMESPACE_SEPARATOR) else {
            return Some(self.qualify(table, reference));
        };

        let groups = join_groups?;
        let joined = groups
            .iter()
            .flatten()
            .find(|join| join.alias == chain);

        Some(match joined {
            Some(join) => self.qualify(&join.alias, column),
            None => self.qualify(table, reference),
        })
    }

    fn qualify(&self, owner: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.escaper.escape_identifier(owner),
            self.escaper.escape_identifier(column)
        )
    }
}

/// Build an ORDER BY fragment with ANSI double-quote escaping.
pub fn build_order_by(
    table: &str,
    specs: &[OrderSpec],
    join_groups: Option<&[Vec<JoinDescriptor>]>,
) -> String {
    OrderByBuilder::new(&AnsiQuoting).build(table, specs, join_groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::BacktickQuoting;

    fn profile_joins() -> Vec<Vec<JoinDescriptor>> {
        vec![vec![JoinDescriptor::new("profile", "bio")]]
    }

    #[test]
    fn test_plain_column_qualified_with_table() {
        let sql = build_order_by("users", &[OrderSpec::asc("name")], None);
        assert_eq!(sql, r#"ORDER BY "users"."name" ASC"#);
    }

    #[test]
    fn test_namespaced_column_uses_join_alias() {
        let joins = profile_joins();
        let sql = build_order_by("users", &[OrderSpec::desc("profile__bio")], Some(joins.as_slice()));
        assert_eq!(sql, r#"ORDER BY "profile"."bio" DESC"#);
    }

    #[test]
    fn test_unknown_alias_falls_back_to_full_reference() {
        let joins = profile_joins();
        let sql = build_order_by("users", &[OrderSpec::asc("team__name")], Some(joins.as_slice()));
        assert_eq!(sql, r#"ORDER BY "users"."team__name" ASC"#);
    }

    #[test]
    fn test_namespaced_column_without_joins_is_dropped() {
        let sql = build_order_by(
            "users",
            &[OrderSpec::asc("profile__bio"), OrderSpec::desc("id")],
            None,
        );
        assert_eq!(sql, r#"ORDER BY "users"."id" DESC"#);
    }

    #[test]
    fn test_all_specs_dropped_yields_empty_string() {
        let sql = build_order_by(
            "users",
            &[OrderSpec::asc("profile__bio"), OrderSpec::new(Vec::<String>::new(), SortDirection::Asc)],
            None,
        );
        assert_eq!(sql, "");
        assert_eq!(build_order_by("users", &[], None), "");
    }

    #[test]
    fn test_empty_join_groups_still_fall_back() {
        let joins: Vec<Vec<JoinDescriptor>> = Vec::new();
        let sql = build_order_by("users", &[OrderSpec::asc("profile__bio")], Some(joins.as_slice()));
        assert_eq!(sql, r#"ORDER BY "users"."profile__bio" ASC"#);
    }

    #[test]
    fn test_groups_searched_in_order_first_match_wins() {
        let joins = vec![
            vec![JoinDescriptor::new("author", "id")],
            vec![
                JoinDescriptor::new("author__team", "name"),
                JoinDescriptor::new("author__team", "slug"),
            ],
        ];
        let sql = build_order_by(
            "posts",
            &[OrderSpec::asc("author__team__name"), OrderSpec::desc("author__id")],
            Some(joins.as_slice()),
        );
        assert_eq!(
            sql,
            r#"ORDER BY "author__team"."name" ASC, "author"."id" DESC"#
        );
    }

    #[test]
    fn test_multiple_columns_default_transform() {
        let sql = build_order_by(
            "users",
            &[OrderSpec::new(["last_name", "first_name"], SortDirection::Asc)],
            None,
        );
        assert_eq!(sql, r#"ORDER BY "users"."last_name" ASC, "users"."first_name" ASC"#);
    }

    #[test]
    fn test_multiple_columns_descending_applies_to_each() {
        let sql = build_order_by(
            "t",
            &[OrderSpec::new(["a", "b"], SortDirection::Desc)],
            None,
        );
        assert_eq!(sql, r#"ORDER BY "t"."a" DESC, "t"."b" DESC"#);
    }

    #[test]
    fn test_transform_receives_qualified_columns() {
        let joins = profile_joins();
        let spec = OrderSpec::new(["nickname", "profile__bio"], SortDirection::Desc)
            .with_transform(|cols| format!("COALESCE({})", cols.join(", ")));
        let sql = build_order_by("users", &[spec], Some(joins.as_slice()));
        assert_eq!(
            sql,
            r#"ORDER BY COALESCE("users"."nickname", "profile"."bio") DESC"#
        );
    }

    #[test]
    fn test_transform_skipped_when_nothing_resolves() {
        let spec = OrderSpec::asc("profile__bio").with_transform(|_| "RANDOM()".to_string());
        assert_eq!(build_order_by("users", &[spec], None), "");
    }

    #[test]
    fn test_builder_uses_given_escaper() {
        let sql = OrderByBuilder::new(&BacktickQuoting).build("users", &[OrderSpec::asc("name")], None);
        assert_eq!(sql, "ORDER BY `users`.`name` ASC");
    }

    #[test]
    fn test_deterministic_output() {
        let joins = profile_joins();
        let specs = [OrderSpec::asc("name"), OrderSpec::desc("profile__bio")];
        let first = build_order_by("users", &specs, Some(joins.as_slice()));
        let second = build_order_by("users", &specs, Some(joins.as_slice()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!(" ASC ".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_order_spec_deserialize() {
        let spec: OrderSpec =
            serde_json::from_str(r#"{"columns": ["profile__bio"], "direction": "DESC"}"#).unwrap();
        assert_eq!(spec.columns, vec!["profile__bio"]);
        assert_eq!(spec.direction, SortDirection::Desc);
        assert!(spec.transform.is_none());
    }
}
