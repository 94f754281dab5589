//! Builds parameterized SELECT, INSERT and UPDATE statements from a resolved entity.

use crate::config::{IncludeDirection, ResolvedEntity};
use serde_json::Value;
use std::collections::HashMap;

/// Column alias prefix for include subqueries, so they never collide with real columns.
pub const INCLUDE_ALIAS_PREFIX: &str = "_include_";

/// Describes one include for single-query reads: name, direction, related entity, our key column, their key column.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a ResolvedEntity,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// Equality filter on one column. More than one value means any-of.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub column: String,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Filter {
            column: column.into(),
            values: vec![value],
        }
    }
}

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast to the column type when one is known.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        entity
            .column(column)
            .and_then(|c| c.pg_type.as_deref())
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }
}

/// Column expression: custom enum (schema.typename) and numeric as col::text so sqlx returns String.
fn column_expr(prefix: Option<&str>, name: &str, pg_type: Option<&str>) -> String {
    let q = match prefix {
        Some(p) => format!("{}.{}", p, quoted(name)),
        None => quoted(name),
    };
    let pg_type = pg_type.unwrap_or("");
    if pg_type.contains('.') || pg_type == "numeric" {
        format!("{}::text", q)
    } else {
        q
    }
}

fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let expr = column_expr(None, &c.name, c.pg_type.as_deref());
            if expr.ends_with("::text") {
                format!("{} AS {}", expr, quoted(&c.name))
            } else {
                expr
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, filters: &[Filter], prefix: Option<&str>) -> String {
    let mut where_parts = Vec::new();
    for f in filters {
        if entity.column(&f.column).is_none() || f.values.is_empty() {
            continue;
        }
        let lhs = match prefix {
            Some(p) => format!("{}.{}", p, quoted(&f.column)),
            None => quoted(&f.column),
        };
        let placeholders: Vec<String> = f
            .values
            .iter()
            .map(|v| q.placeholder(entity, &f.column, v.clone()))
            .collect();
        if placeholders.len() == 1 {
            where_parts.push(format!("{} = {}", lhs, placeholders[0]));
        } else {
            where_parts.push(format!("{} IN ({})", lhs, placeholders.join(", ")));
        }
    }
    if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    }
}

/// SELECT by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let cols = select_column_list(entity);
    let ph = q.placeholder(entity, &entity.pk_column, id);
    q.sql = format!("SELECT {} FROM {} WHERE {} = {}", cols, table, quoted(&entity.pk_column), ph);
    q
}

/// SELECT list with includes in a single query: main table aliased as "main", each include as a
/// scalar subquery (json_agg for to_many, row_to_json for to_one) aliased with [`INCLUDE_ALIAS_PREFIX`].
pub fn select_list_with_includes(
    entity: &ResolvedEntity,
    filters: &[Filter],
    limit: Option<u32>,
    offset: Option<u32>,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    const MAIN_ALIAS: &str = "main";

    let mut select_parts: Vec<String> = entity
        .columns
        .iter()
        .map(|c| {
            format!(
                "{} AS {}",
                column_expr(Some(MAIN_ALIAS), &c.name, c.pg_type.as_deref()),
                quoted(&c.name)
            )
        })
        .collect();

    for inc in includes {
        let rel_table = qualified_table(&inc.related.schema_name, &inc.related.table_name);
        let rel_cols = select_column_list(inc.related);
        let sub_from = format!(
            "{} WHERE {} = {}.{}",
            rel_table,
            quoted(inc.their_key),
            MAIN_ALIAS,
            quoted(inc.our_key)
        );
        let subquery = match inc.direction {
            IncludeDirection::ToOne => format!(
                "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} LIMIT 1) sub)",
                rel_cols, sub_from
            ),
            IncludeDirection::ToMany => format!(
                "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {} ORDER BY {}) sub)",
                rel_cols,
                sub_from,
                quoted(&inc.related.pk_column)
            ),
        };
        select_parts.push(format!("{} AS {}", subquery, quoted(&format!("{}{}", INCLUDE_ALIAS_PREFIX, inc.name))));
    }

    let where_clause = where_clause(&mut q, entity, filters, Some(MAIN_ALIAS));
    let order_clause = format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(&entity.pk_column));

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}",
        select_parts.join(", "),
        table,
        MAIN_ALIAS,
        where_clause,
        order_clause,
        page_clause(limit, offset)
    );
    q
}

/// `LIMIT`/`OFFSET` suffix. The limit is clamped to 1000.
fn page_clause(limit: Option<u32>, offset: Option<u32>) -> String {
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n.min(1000))).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    format!("{}{}", limit_clause, offset_clause)
}

/// SELECT ... WHERE column IN ($1, $2, ...) ORDER BY pk, paged. Used for related rows of one parent.
pub fn select_by_column_in(
    entity: &ResolvedEntity,
    column_name: &str,
    values: &[Value],
    limit: Option<u32>,
    offset: Option<u32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let cols = select_column_list(entity);
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, table);
        return q;
    }
    let where_clause = where_clause(
        &mut q,
        entity,
        &[Filter {
            column: column_name.to_string(),
            values: values.to_vec(),
        }],
        None,
    );
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}{}",
        cols,
        table,
        where_clause,
        quoted(&entity.pk_column),
        page_clause(limit, offset)
    );
    q
}

/// INSERT: columns and placeholders from entity; values from body. Excludes PK unless `include_pk`.
/// Omits columns with DB default when body does not provide a value (so DB uses default).
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>, include_pk: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        if c.pk_type.is_some() && !include_pk {
            continue;
        }
        let val = body.get(&c.name).cloned();
        if val.is_none() && (c.has_default || c.nullable) {
            continue;
        }
        let ph = q.placeholder(entity, &c.name, val.unwrap_or(Value::Null));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE one column of the row with primary key `id`. Returns the row.
pub fn set_column_by_id(entity: &ResolvedEntity, column: &str, value: Value, id: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema_name, &entity.table_name);
    let value_ph = q.placeholder(entity, column, value);
    let id_ph = q.placeholder(entity, &entity.pk_column, id);
    let returning = select_column_list(entity);
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {} = {} RETURNING {}",
        table,
        quoted(column),
        value_ph,
        quoted(&entity.pk_column),
        id_ph,
        returning
    );
    q
}
