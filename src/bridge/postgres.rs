//! PostgreSQL bridge: resource reads and creates over a resolved model, one sqlx transaction per session.

use super::{AuthorizationMode, BridgeSession, PersistenceBridge, TransactionMode};
use crate::auth::Principal;
use crate::config::{IncludeDirection, IncludeSpec, PkType, ResolvedEntity, ResolvedModel};
use crate::document::{self, DocumentBuilder, Linkage, ResourceIdentifier};
use crate::error::BridgeError;
use crate::query::QueryParams;
use crate::route::Route;
use crate::sql::{self, Filter, IncludeSelect, PgBindValue, QueryBuf};
use crate::validation::AttributeValidator;
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_PAGE_LIMIT: u32 = 100;
const MAX_PAGE_LIMIT: u32 = 1000;

#[derive(Clone)]
pub struct PgBridge {
    pool: PgPool,
    model: Arc<ResolvedModel>,
}

impl PgBridge {
    pub fn new(pool: PgPool, model: Arc<ResolvedModel>) -> Self {
        PgBridge { pool, model }
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }
}

#[async_trait]
impl PersistenceBridge for PgBridge {
    async fn begin(&self, mode: TransactionMode) -> Result<Box<dyn BridgeSession>, BridgeError> {
        let mut tx = self.pool.begin().await?;
        if mode == TransactionMode::ReadOnly {
            sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        }
        Ok(Box::new(PgSession {
            tx,
            model: Arc::clone(&self.model),
        }))
    }

    async fn ping(&self) -> Result<(), BridgeError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// One open transaction. Dropped without commit, sqlx rolls it back.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
    model: Arc<ResolvedModel>,
}

#[async_trait]
impl BridgeSession for PgSession {
    async fn fetch(
        &mut self,
        route: &Route,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError> {
        let model = Arc::clone(&self.model);
        let route = decode_route(route)?;
        let entity = lookup(&model, route.entity())?;
        authorize_read(entity, principal)?;
        match &route {
            Route::Collection { .. } => self.fetch_collection(&model, entity, params, principal).await,
            Route::Resource { id, .. } => self.fetch_resource(&model, entity, id, params, principal).await,
            Route::NestedCollection { id, child, .. } => {
                self.fetch_related(&model, entity, id, child, params, principal).await
            }
            Route::Relationship { id, related, .. } => {
                self.fetch_linkage(&model, entity, id, related, params, principal).await
            }
        }
    }

    async fn create(
        &mut self,
        route: &Route,
        body: &str,
        principal: &Principal,
        authorization: AuthorizationMode,
    ) -> Result<Value, BridgeError> {
        let model = Arc::clone(&self.model);
        let route = decode_route(route)?;
        let entity = lookup(&model, route.entity())?;
        authorize_create(entity, principal, authorization)?;
        match &route {
            Route::Collection { .. } => {
                self.create_resource(&model, entity, body, principal, authorization).await
            }
            Route::Relationship { id, related, .. } => {
                self.add_to_relationship(&model, entity, id, related, body, principal, authorization)
                    .await
            }
            other => Err(BridgeError::BadRequest(format!(
                "resources cannot be created on {} routes",
                other.shape()
            ))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), BridgeError> {
        let PgSession { tx, .. } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BridgeError> {
        let PgSession { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

impl PgSession {
    async fn fetch_collection(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError> {
        let opts = read_options(entity, params)?;
        let selects = include_selects(model, &opts.includes, principal)?;
        let q = sql::select_list_with_includes(
            entity,
            &opts.filters,
            Some(opts.page.limit),
            Some(opts.page.offset),
            &selects,
        );
        let rows = self.fetch_all(&q).await?;
        let mut builder = DocumentBuilder::new(model);
        let data = rows
            .iter()
            .map(|row| builder.primary(entity, row, &opts.includes))
            .collect();
        Ok(builder.collection(data, Some(json!({ "self": format!("/{}", entity.path_segment) }))))
    }

    async fn fetch_resource(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &str,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError> {
        let opts = read_options(entity, params)?;
        let selects = include_selects(model, &opts.includes, principal)?;
        let key = parse_id(entity, id)?;
        let q = sql::select_list_with_includes(entity, &[Filter::eq(&entity.pk_column, key)], None, None, &selects);
        let row = self
            .fetch_all(&q)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(entity, id))?;
        let mut builder = DocumentBuilder::new(model);
        let data = builder.primary(entity, &row, &opts.includes);
        Ok(builder.single(data))
    }

    async fn fetch_related(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &str,
        name: &str,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError> {
        let link = link(entity, name)?;
        let related = lookup(model, &link.related_path_segment)?;
        authorize_read(related, principal)?;
        let page = page_options(params)?;
        let parent = self.fetch_by_id(entity, id).await?;
        let rows = self.related_rows(link, related, &parent, page).await?;
        let mut builder = DocumentBuilder::new(model);
        match link.direction {
            IncludeDirection::ToOne => {
                let data = rows
                    .first()
                    .map(|row| builder.primary(related, row, &[]))
                    .unwrap_or(Value::Null);
                Ok(builder.single(data))
            }
            IncludeDirection::ToMany => {
                let data = rows.iter().map(|row| builder.primary(related, row, &[])).collect();
                let links = json!({ "self": format!("/{}/{}/{}", entity.path_segment, id, name) });
                Ok(builder.collection(data, Some(links)))
            }
        }
    }

    async fn fetch_linkage(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &str,
        name: &str,
        params: &QueryParams,
        principal: &Principal,
    ) -> Result<Value, BridgeError> {
        let link = link(entity, name)?;
        let related = lookup(model, &link.related_path_segment)?;
        authorize_read(related, principal)?;
        let page = page_options(params)?;
        let parent = self.fetch_by_id(entity, id).await?;
        let rows = self.related_rows(link, related, &parent, page).await?;
        Ok(linkage_document(entity, id, link, related, &rows))
    }

    async fn create_resource(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        body: &str,
        principal: &Principal,
        authorization: AuthorizationMode,
    ) -> Result<Value, BridgeError> {
        let resource = document::decode_resource(body)?;
        if resource.type_ != entity.path_segment {
            return Err(BridgeError::Conflict(format!(
                "type '{}' does not match collection '{}'",
                resource.type_, entity.path_segment
            )));
        }

        let mut values: HashMap<String, Value> = HashMap::new();
        for (name, value) in resource.attributes {
            if name == entity.pk_column || entity.column(&name).is_none() {
                return Err(BridgeError::BadRequest(format!("unknown attribute '{}'", name)));
            }
            values.insert(name, value);
        }
        if let Some(id) = &resource.id {
            values.insert(entity.pk_column.clone(), parse_id(entity, id)?);
        }

        let mut to_many = Vec::new();
        for (name, linkage) in &resource.relationships {
            let link = entity
                .include(name)
                .ok_or_else(|| BridgeError::BadRequest(format!("unknown relationship '{}'", name)))?;
            let related = lookup(model, &link.related_path_segment)?;
            match (link.direction, linkage) {
                (IncludeDirection::ToOne, Linkage::ToOne(target)) => {
                    let key = match target {
                        Some(ident) => {
                            check_type(related, ident)?;
                            let row = self.fetch_by_id(related, &ident.id).await?;
                            row.get(&link.their_key_column).cloned().unwrap_or(Value::Null)
                        }
                        None => Value::Null,
                    };
                    values.insert(link.our_key_column.clone(), key);
                }
                (IncludeDirection::ToMany, Linkage::ToMany(targets)) => {
                    require_write_roles(related, principal, authorization)?;
                    to_many.push((link, related, targets));
                }
                _ => {
                    return Err(BridgeError::BadRequest(format!(
                        "linkage for '{}' has the wrong cardinality",
                        name
                    )))
                }
            }
        }

        AttributeValidator::validate(&values, &entity.validation)?;
        let include_pk = values.contains_key(&entity.pk_column);
        let q = sql::insert(entity, &values, include_pk);
        let row = self
            .fetch_optional(&q)
            .await?
            .ok_or_else(|| BridgeError::Internal("insert returned no row".into()))?;
        for (link, related, targets) in to_many {
            self.attach(link, related, &row, targets).await?;
        }

        let mut builder = DocumentBuilder::new(model);
        let data = builder.primary(entity, &row, &[]);
        Ok(builder.single(data))
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_to_relationship(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &str,
        name: &str,
        body: &str,
        principal: &Principal,
        authorization: AuthorizationMode,
    ) -> Result<Value, BridgeError> {
        let link = link(entity, name)?;
        if link.direction == IncludeDirection::ToOne {
            return Err(BridgeError::Forbidden(format!(
                "to-one relationship '{}' cannot be extended",
                name
            )));
        }
        let related = lookup(model, &link.related_path_segment)?;
        require_write_roles(related, principal, authorization)?;
        let targets = document::decode_identifiers(body)?;
        let parent = self.fetch_by_id(entity, id).await?;
        self.attach(link, related, &parent, &targets).await?;
        let rows = self.related_rows(link, related, &parent, Page::default()).await?;
        Ok(linkage_document(entity, id, link, related, &rows))
    }

    /// Point each target's foreign key at `parent`.
    async fn attach(
        &mut self,
        link: &IncludeSpec,
        related: &ResolvedEntity,
        parent: &Value,
        targets: &[ResourceIdentifier],
    ) -> Result<(), BridgeError> {
        let key = parent.get(&link.our_key_column).cloned().unwrap_or(Value::Null);
        for ident in targets {
            check_type(related, ident)?;
            let target = parse_id(related, &ident.id)?;
            let q = sql::set_column_by_id(related, &link.their_key_column, key.clone(), target);
            self.fetch_optional(&q)
                .await?
                .ok_or_else(|| not_found(related, &ident.id))?;
        }
        Ok(())
    }

    async fn related_rows(
        &mut self,
        link: &IncludeSpec,
        related: &ResolvedEntity,
        parent: &Value,
        page: Page,
    ) -> Result<Vec<Value>, BridgeError> {
        let key = parent.get(&link.our_key_column).cloned().unwrap_or(Value::Null);
        if key.is_null() {
            return Ok(Vec::new());
        }
        let q = sql::select_by_column_in(
            related,
            &link.their_key_column,
            &[key],
            Some(page.limit),
            Some(page.offset),
        );
        self.fetch_all(&q).await
    }

    async fn fetch_by_id(&mut self, entity: &ResolvedEntity, id: &str) -> Result<Value, BridgeError> {
        let q = sql::select_by_id(entity, parse_id(entity, id)?);
        self.fetch_optional(&q).await?.ok_or_else(|| not_found(entity, id))
    }

    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Value>, BridgeError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind(q).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<Value>, BridgeError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind(q).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

fn bind(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    q.params
        .iter()
        .fold(sqlx::query(&q.sql), |query, p| query.bind(PgBindValue::from_json(p)))
}

fn linkage_document(
    entity: &ResolvedEntity,
    id: &str,
    link: &IncludeSpec,
    related: &ResolvedEntity,
    rows: &[Value],
) -> Value {
    let data = match link.direction {
        IncludeDirection::ToOne => rows
            .first()
            .map(|row| document::identifier(related, row))
            .unwrap_or(Value::Null),
        IncludeDirection::ToMany => {
            Value::Array(rows.iter().map(|row| document::identifier(related, row)).collect())
        }
    };
    json!({ "data": data, "links": document::relationship_links(entity, id, &link.name) })
}

fn lookup<'m>(model: &'m ResolvedModel, path_segment: &str) -> Result<&'m ResolvedEntity, BridgeError> {
    model
        .entity_by_path(path_segment)
        .ok_or_else(|| BridgeError::NotFound(format!("no resource type '{}'", path_segment)))
}

fn link<'e>(entity: &'e ResolvedEntity, name: &str) -> Result<&'e IncludeSpec, BridgeError> {
    entity.include(name).ok_or_else(|| {
        BridgeError::NotFound(format!("{} has no relationship '{}'", entity.path_segment, name))
    })
}

fn not_found(entity: &ResolvedEntity, id: &str) -> BridgeError {
    BridgeError::NotFound(format!("{} {} not found", entity.path_segment, id))
}

fn check_type(related: &ResolvedEntity, ident: &ResourceIdentifier) -> Result<(), BridgeError> {
    if ident.type_ != related.path_segment {
        return Err(BridgeError::Conflict(format!(
            "type '{}' does not match '{}'",
            ident.type_, related.path_segment
        )));
    }
    Ok(())
}

fn include_selects<'m>(
    model: &'m ResolvedModel,
    links: &[&'m IncludeSpec],
    principal: &Principal,
) -> Result<Vec<IncludeSelect<'m>>, BridgeError> {
    links
        .iter()
        .map(|link| {
            let related = lookup(model, &link.related_path_segment)?;
            authorize_read(related, principal)?;
            Ok(IncludeSelect {
                name: &link.name,
                direction: link.direction,
                related,
                our_key: &link.our_key_column,
                their_key: &link.their_key_column,
            })
        })
        .collect()
}

fn authorize_read(entity: &ResolvedEntity, principal: &Principal) -> Result<(), BridgeError> {
    if !entity.allows("read") {
        return Err(BridgeError::Forbidden(format!("read is not allowed on {}", entity.path_segment)));
    }
    if !principal.satisfies(&entity.read_roles) {
        return Err(BridgeError::Forbidden(format!(
            "{} may not read {}",
            principal.identity(),
            entity.path_segment
        )));
    }
    Ok(())
}

fn authorize_create(
    entity: &ResolvedEntity,
    principal: &Principal,
    authorization: AuthorizationMode,
) -> Result<(), BridgeError> {
    if !entity.allows("create") {
        return Err(BridgeError::Forbidden(format!("create is not allowed on {}", entity.path_segment)));
    }
    require_write_roles(entity, principal, authorization)
}

fn require_write_roles(
    entity: &ResolvedEntity,
    principal: &Principal,
    authorization: AuthorizationMode,
) -> Result<(), BridgeError> {
    if authorization == AuthorizationMode::Active && !principal.satisfies(&entity.write_roles) {
        return Err(BridgeError::Forbidden(format!(
            "{} may not write {}",
            principal.identity(),
            entity.path_segment
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Page {
    limit: u32,
    offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// `page[limit]` (clamped) and `page[offset]`. Everything else is ignored.
fn page_options(params: &QueryParams) -> Result<Page, BridgeError> {
    let mut page = Page::default();
    for (key, values) in params.iter() {
        if key == "page[limit]" {
            page.limit = page_number(key, values)?.min(MAX_PAGE_LIMIT);
        } else if key == "page[offset]" {
            page.offset = page_number(key, values)?;
        }
    }
    Ok(page)
}

/// Query options understood by collection and resource reads.
struct ReadOptions<'e> {
    filters: Vec<Filter>,
    page: Page,
    includes: Vec<&'e IncludeSpec>,
}

fn read_options<'e>(entity: &'e ResolvedEntity, params: &QueryParams) -> Result<ReadOptions<'e>, BridgeError> {
    let mut opts = ReadOptions {
        filters: Vec::new(),
        page: page_options(params)?,
        includes: Vec::new(),
    };
    for (key, values) in params.iter() {
        if let Some(column) = key.strip_prefix("filter[").and_then(|k| k.strip_suffix(']')) {
            if entity.column(column).is_none() || entity.sensitive_columns.contains(column) {
                return Err(BridgeError::BadRequest(format!("unknown filter column '{}'", column)));
            }
            let values = values
                .iter()
                .map(|v| query_value_for_column(entity, column, v))
                .collect::<Result<Vec<_>, _>>()?;
            opts.filters.push(Filter {
                column: column.to_string(),
                values,
            });
        } else if key == "include" {
            let names = values
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|n| !n.is_empty());
            for name in names {
                let link = entity
                    .include(name)
                    .ok_or_else(|| BridgeError::BadRequest(format!("unknown include '{}'", name)))?;
                if !opts.includes.iter().any(|l| l.name == link.name) {
                    opts.includes.push(link);
                }
            }
        }
    }
    Ok(opts)
}

fn page_number(key: &str, values: &[String]) -> Result<u32, BridgeError> {
    values
        .first()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| BridgeError::BadRequest(format!("{} must be a non-negative integer", key)))
}

/// Percent-decode every segment. The resolver keeps them exactly as they arrived on the wire.
fn decode_route(route: &Route) -> Result<Route, BridgeError> {
    fn decode(segment: &str) -> Result<String, BridgeError> {
        percent_decode_str(segment)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| BridgeError::BadRequest(format!("path segment '{}' is not valid UTF-8", segment)))
    }
    Ok(match route {
        Route::Collection { entity } => Route::Collection { entity: decode(entity)? },
        Route::Resource { entity, id } => Route::Resource {
            entity: decode(entity)?,
            id: decode(id)?,
        },
        Route::NestedCollection { entity, id, child } => Route::NestedCollection {
            entity: decode(entity)?,
            id: decode(id)?,
            child: decode(child)?,
        },
        Route::Relationship { entity, id, related } => Route::Relationship {
            entity: decode(entity)?,
            id: decode(id)?,
            related: decode(related)?,
        },
    })
}

fn parse_id(entity: &ResolvedEntity, id_str: &str) -> Result<Value, BridgeError> {
    Ok(match entity.pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| BridgeError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| BridgeError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

/// Typed filter value. Text stays text; the builder's casts handle the rest.
fn query_value_for_column(entity: &ResolvedEntity, col: &str, s: &str) -> Result<Value, BridgeError> {
    let invalid = || BridgeError::BadRequest(format!("invalid value '{}' for filter[{}]", s, col));
    let pg_type = entity.column(col).and_then(|c| c.pg_type.as_deref()).unwrap_or("");
    Ok(match pg_type {
        "int8" | "int4" | "int2" => Value::Number(s.parse::<i64>().map_err(|_| invalid())?.into()),
        "bool" if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        "bool" if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        "bool" => return Err(invalid()),
        "uuid" => Value::String(uuid::Uuid::parse_str(s).map_err(|_| invalid())?.to_string()),
        _ => Value::String(s.to_string()),
    })
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
