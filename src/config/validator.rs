//! Model validation: referential integrity and API consistency.

use crate::config::FullConfig;
use crate::error::ConfigError;
use crate::route::RELATIONSHIPS_SEGMENT;
use std::collections::HashSet;

/// Operations an API entity may expose.
pub const KNOWN_OPERATIONS: &[&str] = &["read", "create"];

/// Default schema id when tables omit schema_id.
pub fn default_schema_id(config: &FullConfig) -> Result<&str, ConfigError> {
    config
        .schemas
        .first()
        .map(|s| s.id.as_str())
        .ok_or_else(|| ConfigError::Validation("at least one schema required".into()))
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let default_sid = default_schema_id(config)?;
    let schema_ids: HashSet<&str> = config.schemas.iter().map(|s| s.id.as_str()).collect();
    let table_ids: HashSet<&str> = config.tables.iter().map(|t| t.id.as_str()).collect();
    let column_ids: HashSet<&str> = config.columns.iter().map(|c| c.id.as_str()).collect();

    for t in &config.tables {
        let sid = t.schema_id.as_deref().unwrap_or(default_sid);
        if !schema_ids.contains(sid) {
            return Err(ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            });
        }
        let has_pk = config
            .columns
            .iter()
            .any(|c| c.table_id == t.id && c.name == t.primary_key);
        if !has_pk {
            return Err(ConfigError::InvalidPrimaryKey {
                table_id: t.id.clone(),
                column: t.primary_key.clone(),
            });
        }
    }

    for c in &config.columns {
        if !table_ids.contains(c.table_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: c.table_id.clone(),
            });
        }
    }

    for r in &config.relationships {
        if !table_ids.contains(r.from_table_id.as_str())
            || !table_ids.contains(r.to_table_id.as_str())
            || !column_ids.contains(r.from_column_id.as_str())
            || !column_ids.contains(r.to_column_id.as_str())
        {
            return Err(ConfigError::MissingReference {
                kind: "relationship",
                id: r.id.clone(),
            });
        }
    }

    let mut path_segments = HashSet::new();
    for api in &config.api_entities {
        if !table_ids.contains(api.entity_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            });
        }
        let segment = api.path_segment.as_str();
        if segment.is_empty() || segment.contains('/') || segment.contains('\\') {
            return Err(ConfigError::Validation(format!("invalid path segment '{}'", segment)));
        }
        if segment == RELATIONSHIPS_SEGMENT {
            return Err(ConfigError::ReservedPathSegment(segment.to_string()));
        }
        if !path_segments.insert(segment) {
            return Err(ConfigError::DuplicatePathSegment(segment.to_string()));
        }
        if let Some(op) = api.operations.iter().find(|o| !KNOWN_OPERATIONS.contains(&o.as_str())) {
            return Err(ConfigError::Validation(format!(
                "{}: unknown operation '{}' (expected one of {:?})",
                segment, op, KNOWN_OPERATIONS
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::tests::sample_config;

    #[test]
    fn sample_model_is_valid() {
        validate(&sample_config()).unwrap();
    }

    #[test]
    fn requires_a_schema() {
        let mut config = sample_config();
        config.schemas.clear();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn primary_key_column_must_exist() {
        let mut config = sample_config();
        config.tables[0].primary_key = "missing".into();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPrimaryKey { .. })));
    }

    #[test]
    fn path_segments_are_unique_and_not_reserved() {
        let mut config = sample_config();
        let dup = config.api_entities[0].clone();
        config.api_entities.push(dup);
        assert!(matches!(validate(&config), Err(ConfigError::DuplicatePathSegment(_))));

        let mut config = sample_config();
        config.api_entities[0].path_segment = "relationships".into();
        assert!(matches!(validate(&config), Err(ConfigError::ReservedPathSegment(_))));

        let mut config = sample_config();
        config.api_entities[0].path_segment = "a/b".into();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn operations_are_checked() {
        let mut config = sample_config();
        config.api_entities[0].operations.push("delete".into());
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn dangling_relationship_is_rejected() {
        let mut config = sample_config();
        config.relationships[0].to_column_id = "nope".into();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "relationship", .. })
        ));
    }
}
