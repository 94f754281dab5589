//! Load the resource model from JSON files and resolve it for runtime use.

use crate::config::resolved::{ColumnInfo, IncludeDirection, IncludeSpec, PkType, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> = config
        .columns
        .iter()
        .fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let column_id_to_name: HashMap<&str, &str> = config.columns.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    let table_id_to_path: HashMap<&str, &str> = config
        .api_entities
        .iter()
        .map(|api| (api.entity_id.as_str(), api.path_segment.as_str()))
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table
            .get(table.id.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let pk_col = table_columns
            .iter()
            .find(|c| c.name == table.primary_key)
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                table_id: table.id.clone(),
                column: table.primary_key.clone(),
            })?;
        let pk_type = infer_pk_type(&pk_col.type_);

        let columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                pk_type: (c.name == table.primary_key).then(|| pk_type.clone()),
                nullable: c.nullable,
                has_default: c.default.is_some(),
                pg_type: column_pg_type_name(&c.type_),
            })
            .collect();

        let includes = build_includes_for_table(
            &table.id,
            &config.relationships,
            &column_id_to_name,
            &table_id_to_path,
        );
        let entity = ResolvedEntity {
            table_id: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            pk_column: table.primary_key.clone(),
            pk_type,
            columns,
            operations: api.operations.clone(),
            read_roles: api.read_roles.clone(),
            write_roles: api.write_roles.clone(),
            sensitive_columns: api.sensitive_columns.iter().cloned().collect(),
            includes,
            validation: api.validation.clone(),
        };
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

/// To-one links are named by the relationship's `name` when given, else by the related path
/// segment. To-many links are named by the related path segment. First definition wins.
fn build_includes_for_table(
    our_table_id: &str,
    relationships: &[RelationshipConfig],
    column_id_to_name: &HashMap<&str, &str>,
    table_id_to_path: &HashMap<&str, &str>,
) -> Vec<IncludeSpec> {
    let mut includes: Vec<IncludeSpec> = Vec::new();
    let mut seen = HashSet::new();
    for rel in relationships {
        let from_col = column_id_to_name.get(rel.from_column_id.as_str()).map(|s| s.to_string());
        let to_col = column_id_to_name.get(rel.to_column_id.as_str()).map(|s| s.to_string());
        let from_path = table_id_to_path.get(rel.from_table_id.as_str()).map(|s| s.to_string());
        let to_path = table_id_to_path.get(rel.to_table_id.as_str()).map(|s| s.to_string());
        let mut candidates = Vec::with_capacity(2);
        if let (Some(our_key), Some(their_key), Some(related_path)) = (from_col.clone(), to_col.clone(), to_path) {
            if rel.from_table_id == our_table_id {
                candidates.push(IncludeSpec {
                    name: rel.name.clone().unwrap_or_else(|| related_path.clone()),
                    direction: IncludeDirection::ToOne,
                    related_path_segment: related_path,
                    our_key_column: our_key,
                    their_key_column: their_key,
                });
            }
        }
        if let (Some(our_key), Some(their_key), Some(related_path)) = (to_col, from_col, from_path) {
            if rel.to_table_id == our_table_id {
                candidates.push(IncludeSpec {
                    name: related_path.clone(),
                    direction: IncludeDirection::ToMany,
                    related_path_segment: related_path,
                    our_key_column: our_key,
                    their_key_column: their_key,
                });
            }
        }
        for spec in candidates {
            if seen.insert(spec.name.clone()) {
                includes.push(spec);
            } else {
                tracing::warn!(table = %our_table_id, link = %spec.name, relationship = %rel.id, "duplicate link name, skipping");
            }
        }
    }
    includes
}

fn column_pg_type_name(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if lower == "timestamptz" || lower == "timestamp with time zone" {
        Some("timestamptz".into())
    } else if lower == "timestamp" || lower.starts_with("timestamp ") {
        Some("timestamp".into())
    } else if matches!(lower.as_str(), "bigint" | "int8" | "bigserial" | "serial8") {
        Some("int8".into())
    } else if matches!(lower.as_str(), "integer" | "int" | "int4" | "serial" | "serial4") {
        Some("int4".into())
    } else if matches!(lower.as_str(), "smallint" | "int2" | "smallserial" | "serial2") {
        Some("int2".into())
    } else if matches!(lower.as_str(), "boolean" | "bool") {
        Some("bool".into())
    } else if matches!(lower.as_str(), "real" | "float4") {
        Some("float4".into())
    } else if matches!(lower.as_str(), "double precision" | "float8") {
        Some("float8".into())
    } else if lower == "jsonb" || lower == "json" {
        Some(lower)
    } else if lower == "date" {
        Some("date".into())
    } else if lower.contains("uuid") {
        Some("uuid".into())
    } else if lower == "numeric" || lower.starts_with("numeric(") || lower == "decimal" {
        Some("numeric".into())
    } else if name.contains('.') {
        // Schema-qualified custom type (e.g. sample.order_status); cast so text binds correctly
        Some(name.to_string())
    } else {
        None
    }
}

fn infer_pk_type(type_str: &str) -> PkType {
    let type_lower = type_str.to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") || type_lower == "int8" {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

/// Read `schemas.json`, `tables.json`, `columns.json`, `relationships.json` and
/// `api_entities.json` from `dir`. Schemas and relationships are optional.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let mut schemas: Vec<SchemaConfig> = read_kind(dir, "schemas.json", false).await?;
    if schemas.is_empty() {
        schemas = vec![SchemaConfig {
            id: "default".into(),
            name: "public".into(),
            comment: None,
        }];
    }
    let config = FullConfig {
        schemas,
        tables: read_kind(dir, "tables.json", true).await?,
        columns: read_kind(dir, "columns.json", true).await?,
        relationships: read_kind(dir, "relationships.json", false).await?,
        api_entities: read_kind(dir, "api_entities.json", true).await?,
    };
    tracing::info!(
        dir = %dir.display(),
        tables = config.tables.len(),
        entities = config.api_entities.len(),
        "loaded resource model"
    );
    Ok(config)
}

async fn read_kind<T>(dir: &Path, file: &str, required: bool) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let path = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}
