//! Attribute validation for created resources, driven by per-column rules in the model.

use crate::config::ValidationRule;
use crate::error::BridgeError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub struct AttributeValidator;

impl AttributeValidator {
    /// Check attributes of a new resource. Required columns must be present and non-null.
    /// Rules are checked in column name order so the first reported failure is stable.
    pub fn validate(
        attributes: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), BridgeError> {
        let mut columns: Vec<&String> = rules.keys().collect();
        columns.sort();
        for col in columns {
            let rule = &rules[col];
            let val = attributes.get(col.as_str());
            if rule.required == Some(true) && val.map_or(true, Value::is_null) {
                return Err(BridgeError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), BridgeError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(BridgeError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(BridgeError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern)
                .map_err(|_| BridgeError::Internal(format!("invalid pattern for {}", col)))?;
            if !re.is_match(s) {
                return Err(BridgeError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(BridgeError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(BridgeError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(BridgeError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), BridgeError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => {
            Err(BridgeError::Validation(format!("{} must be a valid email", col)))
        }
        "uuid" if uuid::Uuid::parse_str(s).is_err() => {
            Err(BridgeError::Validation(format!("{} must be a valid UUID", col)))
        }
        _ => Ok(()),
    }
}
