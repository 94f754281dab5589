//! Resource documents: shaping rows into resource objects and decoding request bodies.

use crate::config::{IncludeDirection, IncludeSpec, ResolvedEntity, ResolvedModel};
use crate::error::BridgeError;
use crate::sql::INCLUDE_ALIAS_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

/// Key values render as strings; anything else has no usable id.
pub fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn self_link(entity: &ResolvedEntity, id: &str) -> String {
    format!("/{}/{}", entity.path_segment, id)
}

/// `self` and `related` links of one relationship.
pub fn relationship_links(entity: &ResolvedEntity, id: &str, name: &str) -> Value {
    json!({
        "self": format!("/{}/{}/relationships/{}", entity.path_segment, id, name),
        "related": format!("/{}/{}/{}", entity.path_segment, id, name),
    })
}

/// `{type, id}` for a row of `entity`.
pub fn identifier(entity: &ResolvedEntity, row: &Value) -> Value {
    json!({
        "type": entity.path_segment,
        "id": row.get(&entity.pk_column).and_then(id_string),
    })
}

/// Full resource object. Include columns on the row are ignored here.
pub fn resource_object(entity: &ResolvedEntity, row: &Value) -> Value {
    let id = row.get(&entity.pk_column).and_then(id_string).unwrap_or_default();
    let attributes: Map<String, Value> = entity
        .attribute_columns()
        .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
        .collect();
    let mut object = json!({
        "type": entity.path_segment,
        "id": id,
        "attributes": attributes,
        "links": { "self": self_link(entity, &id) },
    });
    if !entity.includes.is_empty() {
        let relationships: Map<String, Value> = entity
            .includes
            .iter()
            .map(|link| (link.name.clone(), json!({ "links": relationship_links(entity, &id, &link.name) })))
            .collect();
        object["relationships"] = Value::Object(relationships);
    }
    object
}

/// Collects primary data and the deduplicated `included` array of a compound document.
pub struct DocumentBuilder<'a> {
    model: &'a ResolvedModel,
    primary: HashSet<(String, String)>,
    seen: HashSet<(String, String)>,
    included: Vec<Value>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(model: &'a ResolvedModel) -> Self {
        DocumentBuilder {
            model,
            primary: HashSet::new(),
            seen: HashSet::new(),
            included: Vec::new(),
        }
    }

    /// Shape one primary row. `links` are the includes that were selected with the row.
    pub fn primary(&mut self, entity: &ResolvedEntity, row: &Value, links: &[&IncludeSpec]) -> Value {
        let mut object = resource_object(entity, row);
        let id = object["id"].as_str().unwrap_or_default().to_string();
        self.primary.insert((entity.path_segment.clone(), id));
        for link in links {
            let Some(related) = self.model.entity_by_path(&link.related_path_segment) else {
                continue;
            };
            let raw = row
                .get(format!("{}{}", INCLUDE_ALIAS_PREFIX, link.name))
                .cloned()
                .unwrap_or(Value::Null);
            let linkage = match link.direction {
                IncludeDirection::ToOne => match raw {
                    Value::Object(_) => {
                        self.include(related, &raw);
                        identifier(related, &raw)
                    }
                    _ => Value::Null,
                },
                IncludeDirection::ToMany => {
                    let rows = match raw {
                        Value::Array(rows) => rows,
                        _ => Vec::new(),
                    };
                    for r in &rows {
                        self.include(related, r);
                    }
                    Value::Array(rows.iter().map(|r| identifier(related, r)).collect())
                }
            };
            object["relationships"][link.name.as_str()]["data"] = linkage;
        }
        object
    }

    fn include(&mut self, entity: &ResolvedEntity, row: &Value) {
        let id = row.get(&entity.pk_column).and_then(id_string).unwrap_or_default();
        if self.seen.insert((entity.path_segment.clone(), id)) {
            self.included.push(resource_object(entity, row));
        }
    }

    /// Resources that also appear as primary data are not repeated in `included`.
    fn finish(self, data: Value, links: Option<Value>) -> Value {
        let mut doc = json!({ "data": data });
        if let Some(links) = links {
            doc["links"] = links;
        }
        let primary = self.primary;
        let included: Vec<Value> = self
            .included
            .into_iter()
            .filter(|r| {
                let key = (
                    r["type"].as_str().unwrap_or_default().to_string(),
                    r["id"].as_str().unwrap_or_default().to_string(),
                );
                !primary.contains(&key)
            })
            .collect();
        if !included.is_empty() {
            doc["included"] = Value::Array(included);
        }
        doc
    }

    pub fn collection(self, data: Vec<Value>, links: Option<Value>) -> Value {
        self.finish(Value::Array(data), links)
    }

    pub fn single(self, data: Value) -> Value {
        self.finish(data, None)
    }
}

/// `{type, id}` as sent by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

/// Linkage of one relationship in a create document.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    ToMany(Vec<ResourceIdentifier>),
    ToOne(Option<ResourceIdentifier>),
}

#[derive(Clone, Debug, Deserialize)]
struct RelationshipObject {
    data: Linkage,
}

/// Resource object in a create request.
#[derive(Clone, Debug)]
pub struct NewResource {
    pub type_: String,
    pub id: Option<String>,
    pub attributes: HashMap<String, Value>,
    pub relationships: HashMap<String, Linkage>,
}

#[derive(Deserialize)]
struct NewResourceWire {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, Value>,
    #[serde(default)]
    relationships: HashMap<String, RelationshipObject>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, BridgeError> {
    if body.trim().is_empty() {
        return Err(BridgeError::BadRequest("request body is empty".into()));
    }
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| BridgeError::BadRequest(format!("malformed document: {}", e)))?;
    Ok(envelope.data)
}

/// Decode `{"data": {type, id?, attributes?, relationships?}}`.
pub fn decode_resource(body: &str) -> Result<NewResource, BridgeError> {
    let wire: NewResourceWire = decode(body)?;
    Ok(NewResource {
        type_: wire.type_,
        id: wire.id,
        attributes: wire.attributes,
        relationships: wire
            .relationships
            .into_iter()
            .map(|(name, rel)| (name, rel.data))
            .collect(),
    })
}

/// Decode `{"data": [{type, id}, ...]}`.
pub fn decode_identifiers(body: &str) -> Result<Vec<ResourceIdentifier>, BridgeError> {
    decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::tests::sample_model;

    #[test]
    fn resource_object_hides_key_and_sensitive_columns() {
        let model = sample_model();
        let customers = model.entity_by_path("customers").unwrap();
        let row = json!({ "id": 3, "name": "Ada", "password_hash": "x" });
        let object = resource_object(customers, &row);
        assert_eq!(object["type"], "customers");
        assert_eq!(object["id"], "3");
        assert_eq!(object["attributes"], json!({ "name": "Ada" }));
        assert_eq!(object["links"]["self"], "/customers/3");
        assert_eq!(
            object["relationships"]["orders"]["links"],
            json!({ "self": "/customers/3/relationships/orders", "related": "/customers/3/orders" })
        );
    }

    #[test]
    fn compound_document_links_and_dedupes_included() {
        let model = sample_model();
        let orders = model.entity_by_path("orders").unwrap();
        let link = orders.include("customer").unwrap();
        let customer = json!({ "id": 3, "name": "Ada", "password_hash": "x" });
        let rows = [
            json!({ "id": 10, "customer_id": 3, "status": "open", "_include_customer": customer }),
            json!({ "id": 11, "customer_id": 3, "status": "held", "_include_customer": customer }),
            json!({ "id": 12, "customer_id": null, "status": "open", "_include_customer": null }),
        ];
        let mut builder = DocumentBuilder::new(&model);
        let data: Vec<Value> = rows.iter().map(|r| builder.primary(orders, r, &[link])).collect();
        let doc = builder.collection(data, None);

        assert_eq!(doc["data"][0]["relationships"]["customer"]["data"], json!({ "type": "customers", "id": "3" }));
        assert_eq!(doc["data"][2]["relationships"]["customer"]["data"], Value::Null);
        assert!(doc["data"][0]["attributes"].get("_include_customer").is_none());
        let included = doc["included"].as_array().unwrap();
        assert_eq!(included.len(), 1);
        assert!(included[0]["attributes"].get("password_hash").is_none());
    }

    #[test]
    fn to_many_include_and_no_included_key_without_includes() {
        let model = sample_model();
        let customers = model.entity_by_path("customers").unwrap();
        let link = customers.include("orders").unwrap();
        let row = json!({
            "id": 3,
            "name": "Ada",
            "_include_orders": [{ "id": 10, "customer_id": 3 }, { "id": 11, "customer_id": 3 }]
        });
        let mut builder = DocumentBuilder::new(&model);
        let data = builder.primary(customers, &row, &[link]);
        let doc = builder.single(data);
        assert_eq!(doc["data"]["relationships"]["orders"]["data"].as_array().unwrap().len(), 2);
        assert_eq!(doc["included"].as_array().unwrap().len(), 2);

        let mut builder = DocumentBuilder::new(&model);
        let data = builder.primary(customers, &row, &[]);
        let doc = builder.single(data);
        assert!(doc.get("included").is_none());
    }

    #[test]
    fn decodes_create_documents() {
        let body = r#"{"data":{"type":"orders","attributes":{"status":"open"},
            "relationships":{"customer":{"data":{"type":"customers","id":"3"}},
                             "notes":{"data":[]},"gift":{"data":null}}}}"#;
        let resource = decode_resource(body).unwrap();
        assert_eq!(resource.type_, "orders");
        assert!(resource.id.is_none());
        assert_eq!(resource.attributes["status"], "open");
        assert_eq!(
            resource.relationships["customer"],
            Linkage::ToOne(Some(ResourceIdentifier { type_: "customers".into(), id: "3".into() }))
        );
        assert_eq!(resource.relationships["notes"], Linkage::ToMany(vec![]));
        assert_eq!(resource.relationships["gift"], Linkage::ToOne(None));
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(decode_resource(""), Err(BridgeError::BadRequest(_))));
        assert!(matches!(decode_resource("{"), Err(BridgeError::BadRequest(_))));
        assert!(matches!(decode_resource(r#"{"type":"orders"}"#), Err(BridgeError::BadRequest(_))));
        assert!(matches!(decode_identifiers(r#"{"data":{"type":"x","id":"1"}}"#), Err(BridgeError::BadRequest(_))));
        let ids = decode_identifiers(r#"{"data":[{"type":"orders","id":"10"}]}"#).unwrap();
        assert_eq!(ids[0].id, "10");
    }
}
