//! NPM registry documents.
//!
//! Only the fields the bridge inspects are typed. Everything else a client
//! sends is carried in `extra` so that a stored document keeps it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name reported by the registry info endpoint.
pub const DB_NAME: &str = "registry";

/// Tag every package is stored under.
pub const DEFAULT_TAG: &str = "latest";

/// The document `npm publish` sends.
///
/// An explicit `null` reads the same as a missing field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    /// Package id, usually the same as the name.
    #[serde(rename = "_id", deserialize_with = "nullable")]
    pub id: String,

    /// Package name, possibly scoped (`@scope/name`).
    #[serde(deserialize_with = "nullable")]
    pub name: String,

    /// Short description
    #[serde(deserialize_with = "nullable")]
    pub description: String,

    /// Tag to version mapping.
    #[serde(rename = "dist-tags", deserialize_with = "nullable")]
    pub dist_tags: BTreeMap<String, String>,

    /// Version manifests, keyed by version string.
    #[serde(deserialize_with = "nullable")]
    pub versions: BTreeMap<String, Version>,

    /// Access level requested by the client, passed through as-is.
    pub access: Value,

    /// Tarballs, keyed by file name.
    #[serde(rename = "_attachments", deserialize_with = "nullable")]
    pub attachments: BTreeMap<String, Attachment>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One published version of a package.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Version {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub version: String,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub main: String,
    #[serde(deserialize_with = "nullable")]
    pub scripts: BTreeMap<String, String>,

    /// Either a string (`"Jane <jane@example.com>"`) or a person object.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub author: Value,
    #[serde(deserialize_with = "nullable")]
    pub license: String,
    #[serde(rename = "_id", deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub readme: String,
    #[serde(rename = "readmeFilename", deserialize_with = "nullable")]
    pub readme_filename: String,
    #[serde(rename = "gitHead", deserialize_with = "nullable")]
    pub git_head: String,
    #[serde(rename = "_nodeVersion", deserialize_with = "nullable")]
    pub node_version: String,
    #[serde(rename = "_npmVersion", deserialize_with = "nullable")]
    pub npm_version: String,
    #[serde(deserialize_with = "nullable")]
    pub dist: Dist,

    /// Dependencies, engines and anything else the client sent.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Where a version's tarball lives and how to check it. Never verified here.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dist {
    #[serde(deserialize_with = "nullable")]
    pub integrity: String,
    #[serde(deserialize_with = "nullable")]
    pub shasum: String,
    #[serde(deserialize_with = "nullable")]
    pub tarball: String,
}

/// An inline tarball.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    #[serde(deserialize_with = "nullable")]
    pub content_type: String,

    /// Base64 encoded tarball.
    #[serde(deserialize_with = "nullable")]
    pub data: String,
    #[serde(deserialize_with = "nullable")]
    pub length: u64,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `GET /`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub db_name: String,
}

impl Default for RegistryInfo {
    fn default() -> Self {
        RegistryInfo {
            db_name: DB_NAME.to_owned(),
        }
    }
}

/// Body of `PUT /-/user/...`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub ok: bool,
    pub id: String,
}

impl LoginResponse {
    /// The fixed response given to every login attempt.
    pub fn placeholder() -> Self {
        LoginResponse {
            token: "dummy-token".to_owned(),
            ok: true,
            id: "org.couchdb.user:undefined".to_owned(),
        }
    }
}

/// Encode `value` as JSON indented with four spaces, followed by a newline.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let body = r#"{
            "name": "left-pad",
            "readme": "pads strings",
            "versions": {
                "1.0.0": {
                    "name": "left-pad",
                    "version": "1.0.0",
                    "author": {"name": "Jane"},
                    "dependencies": {"right-pad": "^1.0.0"}
                }
            }
        }"#;

        let package: Package = serde_json::from_str(body).unwrap();
        assert_eq!(package.extra["readme"], "pads strings");

        let version = &package.versions["1.0.0"];
        assert_eq!(version.author["name"], "Jane");
        assert_eq!(version.extra["dependencies"]["right-pad"], "^1.0.0");

        let encoded = serde_json::to_value(&package).unwrap();
        assert_eq!(encoded["readme"], "pads strings");
        assert_eq!(
            encoded["versions"]["1.0.0"]["dependencies"]["right-pad"],
            "^1.0.0"
        );
    }

    #[test]
    fn author_may_be_a_string() {
        let version: Version =
            serde_json::from_str(r#"{"author": "Jane <jane@example.com>"}"#).unwrap();
        assert_eq!(version.author, "Jane <jane@example.com>");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let package: Package = serde_json::from_str("{}").unwrap();
        assert!(package.versions.is_empty());
        assert!(package.attachments.is_empty());
        assert!(package.access.is_null());
    }

    #[test]
    fn null_fields_read_as_empty() {
        let body = r#"{
            "name": "left-pad",
            "description": null,
            "dist-tags": null,
            "versions": {
                "1.0.0": {
                    "name": "left-pad",
                    "version": "1.0.0",
                    "gitHead": null,
                    "scripts": null,
                    "dist": null
                }
            },
            "_attachments": {
                "left-pad-1.0.0.tgz": {"content_type": null, "data": "AAAA", "length": null}
            }
        }"#;

        let package: Package = serde_json::from_str(body).unwrap();
        assert_eq!(package.description, "");
        assert!(package.dist_tags.is_empty());

        let version = &package.versions["1.0.0"];
        assert_eq!(version.git_head, "");
        assert!(version.scripts.is_empty());
        assert_eq!(version.dist, Dist::default());

        let attachment = &package.attachments["left-pad-1.0.0.tgz"];
        assert_eq!(attachment.content_type, "");
        assert_eq!(attachment.length, 0);
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let body = to_pretty_json(&RegistryInfo::default()).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "{\n    \"db_name\": \"registry\"\n}\n"
        );
    }

    #[test]
    fn login_placeholder() {
        let login = serde_json::to_value(LoginResponse::placeholder()).unwrap();
        assert_eq!(
            login,
            serde_json::json!({
                "token": "dummy-token",
                "ok": true,
                "id": "org.couchdb.user:undefined",
            })
        );
    }
}
