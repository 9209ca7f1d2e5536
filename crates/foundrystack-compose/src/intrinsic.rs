//! Intrinsic functions and pseudo parameters of the template language.
//!
//! Values that the provisioning engine resolves at deploy time are plain
//! JSON objects such as `{"Ref": "EcsCluster"}`. These helpers build them
//! and walk them back out of a finished template.

use std::collections::BTreeSet;

use serde_json::{Value, json};

use foundrystack_common::types::LogicalId;

/// `{"Ref": id}`.
#[must_use]
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

/// `{"Fn::GetAtt": [id, attribute]}`.
#[must_use]
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::ImportValue": export}`.
#[must_use]
pub fn import_value(export: &str) -> Value {
    json!({ "Fn::ImportValue": export })
}

/// `{"Fn::Sub": template}`.
#[must_use]
pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

/// `{"Fn::Sub": [template, variables]}`.
#[must_use]
pub fn sub_with(template: impl Into<String>, variables: Value) -> Value {
    json!({ "Fn::Sub": [template.into(), variables] })
}

/// `{"Fn::Base64": value}`.
#[must_use]
pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}

/// The `index`-th availability zone of the deployment region.
#[must_use]
pub fn availability_zone(index: u32) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

/// Resolves an SSM parameter at deploy time.
#[must_use]
pub fn ssm_parameter(name: &str) -> Value {
    Value::String(format!("{{{{resolve:ssm:{name}}}}}"))
}

/// ARN of an AWS managed policy.
#[must_use]
pub fn managed_policy(name: &str) -> Value {
    sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{name}"))
}

/// Collects every export name consumed through `Fn::ImportValue`.
pub fn collect_imports(value: &Value, into: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("Fn::ImportValue") {
                let _ = into.insert(name.clone());
            }
            map.values().for_each(|v| collect_imports(v, into));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_imports(v, into)),
        _ => {}
    }
}

/// Collects every logical id targeted by `Ref`, `Fn::GetAtt` or an
/// `Fn::Sub` interpolation (`${Id}` or `${Id.Attribute}`).
///
/// Pseudo parameters (`AWS::Region`, ...), literal `${!...}` escapes and
/// names bound by the substitution's own variable map are skipped.
pub fn collect_references(value: &Value, into: &mut BTreeSet<LogicalId>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                if !target.starts_with("AWS::") {
                    let _ = into.insert(LogicalId::new(target.clone()));
                }
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = parts.first() {
                    let _ = into.insert(LogicalId::new(target.clone()));
                }
            }
            match map.get("Fn::Sub") {
                Some(Value::String(text)) => collect_interpolations(text, None, into),
                Some(Value::Array(parts)) => {
                    if let Some(Value::String(text)) = parts.first() {
                        let bound = parts.get(1).and_then(Value::as_object);
                        collect_interpolations(text, bound, into);
                    }
                }
                _ => {}
            }
            map.values().for_each(|v| collect_references(v, into));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, into)),
        _ => {}
    }
}

fn collect_interpolations(
    text: &str,
    bound: Option<&serde_json::Map<String, Value>>,
    into: &mut BTreeSet<LogicalId>,
) {
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else {
            return;
        };
        let name = &rest[..end];
        rest = &rest[end + 1..];

        if name.starts_with('!') || name.starts_with("AWS::") {
            continue;
        }
        let target = name.split_once('.').map_or(name, |(id, _)| id);
        if target.is_empty() || bound.is_some_and(|vars| vars.contains_key(target)) {
            continue;
        }
        let _ = into.insert(LogicalId::new(target));
    }
}
