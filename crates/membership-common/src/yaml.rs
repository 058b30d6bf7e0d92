//! Manifest decoding
//!
//! The Hub hands out Kubernetes manifests as YAML (or JSON, which is a YAML
//! subset). They are parsed with yaml-rust2 into `serde_json::Value` so the
//! typed k8s-openapi structs can be deserialized from them with serde.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Identity fields every Kubernetes object carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestHeader {
    /// `apiVersion`
    pub api_version: String,
    /// `kind`
    pub kind: String,
    /// `metadata.name`
    pub name: String,
    /// `metadata.namespace`, if set
    pub namespace: Option<String>,
}

/// Parse a single manifest into a JSON value.
///
/// Only the first document of a multi-document stream is returned. Empty
/// input yields `Value::Null`. `context` names the manifest in errors.
pub fn parse_manifest(input: &str, context: &str) -> Result<Value> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| Error::decode(context, e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc).map_err(|msg| Error::decode(context, msg)),
        None => Ok(Value::Null),
    }
}

/// Extract apiVersion, kind, name and namespace from a parsed manifest.
///
/// Fails with [`Error::Decode`] when any required field is missing, which is
/// how placeholder objects are told apart from real ones.
pub fn manifest_header(value: &Value, context: &str) -> Result<ManifestHeader> {
    let field = |v: &Value, path: &str| {
        v.as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::decode(context, format!("object {} is missing", path)))
    };

    Ok(ManifestHeader {
        api_version: field(&value["apiVersion"], "apiVersion")?,
        kind: field(&value["kind"], "kind")?,
        name: field(&value["metadata"]["name"], "metadata.name")?,
        namespace: value["metadata"]["namespace"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

fn yaml_to_json(yaml: Yaml) -> std::result::Result<Value, String> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => {
            let f: f64 = s.parse().map_err(|e| format!("invalid float '{}': {}", s, e))?;
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Hash(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                let key = match k {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err("unsupported YAML key type".to_string()),
                };
                map.insert(key, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => return Err("YAML aliases not supported".to_string()),
        Yaml::BadValue => return Err("bad YAML value".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespace_manifest() {
        let yaml = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: gke-connect
  labels:
    version: "3"
"#;
        let value = parse_manifest(yaml, "namespace").unwrap();
        let header = manifest_header(&value, "namespace").unwrap();
        assert_eq!(header.api_version, "v1");
        assert_eq!(header.kind, "Namespace");
        assert_eq!(header.name, "gke-connect");
        assert_eq!(header.namespace, None);
        assert_eq!(value["metadata"]["labels"]["version"], "3");
    }

    #[test]
    fn json_is_accepted() {
        let json = r#"{"apiVersion":"hub.gke.io/v1","kind":"Membership","metadata":{"name":"membership"},"spec":{"owner":{"id":"//gkehub.googleapis.com/projects/p/locations/global/memberships/a"}}}"#;
        let value = parse_manifest(json, "cr").unwrap();
        let header = manifest_header(&value, "cr").unwrap();
        assert_eq!(header.kind, "Membership");
        assert_eq!(header.name, "membership");
    }

    #[test]
    fn empty_input_is_null() {
        assert_eq!(parse_manifest("", "empty").unwrap(), Value::Null);
    }

    #[test]
    fn placeholder_object_has_no_header() {
        let value = parse_manifest("{}", "secret").unwrap();
        let err = manifest_header(&value, "secret").unwrap_err();
        assert!(err.to_string().contains("apiVersion is missing"));
    }

    #[test]
    fn invalid_yaml_is_a_decode_error() {
        let err = parse_manifest("not: valid: yaml: {{", "broken").unwrap_err();
        assert!(matches!(err, Error::Decode { context, .. } if context == "broken"));
    }

    #[test]
    fn first_document_wins() {
        let value = parse_manifest("kind: A\n---\nkind: B\n", "multi").unwrap();
        assert_eq!(value["kind"], "A");
    }
}
