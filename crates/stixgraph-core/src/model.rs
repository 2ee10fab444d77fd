//! STIX bundle and object models

use crate::classify::{classify, types, Label, TypeRegistry};
use crate::error::{CoreError, Result};
use crate::projection::{project, PropertyMap};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use uuid::Uuid;

/// Separator between the type and the UUID inside a STIX identifier
const ID_SEPARATOR: &str = "--";

/// A STIX bundle: an envelope around an ordered list of raw object records.
/// Envelope fields that are not strings are dropped rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub bundle_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    /// Raw records in file order, unfiltered
    pub objects: Vec<Value>,
}

impl Bundle {
    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self> {
        let value: Value =
            serde_json::from_reader(reader).map_err(|e| CoreError::malformed(origin, e))?;
        Self::from_value(value, origin)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| CoreError::malformed("<memory>", e))?;
        Self::from_value(value, Path::new("<memory>"))
    }

    fn from_value(value: Value, origin: &Path) -> Result<Self> {
        match value.get("objects") {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(CoreError::malformed(origin, "`objects` is not an array")),
            None => return Err(CoreError::malformed(origin, "missing `objects` key")),
        }
        serde_json::from_value(value).map_err(|e| CoreError::malformed(origin, e))
    }

    /// Number of raw records
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_str()
        .map(str::to_string))
}

/// Read a bundle file from disk
pub fn load_bundle(path: impl AsRef<Path>) -> Result<Bundle> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| CoreError::malformed(path, e))?;
    Bundle::from_reader(BufReader::new(file), path)
}

/// A kill-chain phase reference on an attack-pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillChainPhase {
    pub kill_chain_name: Option<String>,
    pub phase_name: String,
}

/// A validated STIX object. The full attribute record is kept for projection.
#[derive(Debug, Clone, PartialEq)]
pub struct StixObject {
    id: String,
    object_type: String,
    fields: Map<String, Value>,
}

impl StixObject {
    /// Validate a raw record: it must be a JSON object with a `type` and an
    /// `id` shaped `<type>--<uuid>`
    pub fn from_value(value: Value) -> Result<Self> {
        let fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(CoreError::invalid_object(
                    "<unknown>",
                    format!("expected a JSON object, found {}", json_kind(&other)),
                ))
            }
        };

        let id = match fields.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(CoreError::invalid_object("<unknown>", "missing `id`")),
        };
        let object_type = match fields.get("type").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(CoreError::invalid_object(id, "missing `type`")),
        };

        validate_identifier(&id, &object_type)?;

        Ok(Self {
            id,
            object_type,
            fields,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn spec_version(&self) -> Option<&str> {
        self.get_str("spec_version")
    }

    pub fn created(&self) -> Option<&str> {
        self.get_str("created")
    }

    pub fn modified(&self) -> Option<&str> {
        self.get_str("modified")
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn description(&self) -> Option<&str> {
        self.get_str("description")
    }

    pub fn x_mitre_shortname(&self) -> Option<&str> {
        self.get_str("x_mitre_shortname")
    }

    pub fn relationship_type(&self) -> Option<&str> {
        self.get_str("relationship_type")
    }

    pub fn source_ref(&self) -> Option<&str> {
        self.get_str("source_ref")
    }

    pub fn target_ref(&self) -> Option<&str> {
        self.get_str("target_ref")
    }

    /// Ids listed in `tactic_refs`; non-string entries are ignored
    pub fn tactic_refs(&self) -> Vec<&str> {
        self.fields
            .get("tactic_refs")
            .and_then(Value::as_array)
            .map(|refs| refs.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn kill_chain_entries(&self) -> &[Value] {
        self.fields
            .get("kill_chain_phases")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Kill-chain phases with a string `phase_name`. A non-string
    /// `kill_chain_name` is read as absent.
    pub fn kill_chain_phases(&self) -> Vec<KillChainPhase> {
        self.kill_chain_entries()
            .iter()
            .filter_map(parse_phase)
            .collect()
    }

    /// Number of `kill_chain_phases` entries without a usable `phase_name`
    pub fn malformed_kill_chain_phases(&self) -> usize {
        self.kill_chain_entries()
            .iter()
            .filter(|entry| parse_phase(entry).is_none())
            .count()
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.object_type == type_name
    }

    pub fn is_relationship(&self) -> bool {
        self.is_type(types::RELATIONSHIP)
    }

    /// Graph label for this object's type
    pub fn label(&self) -> Result<Label> {
        classify(&self.object_type)
    }

    /// Projected property map
    pub fn properties(&self) -> PropertyMap {
        project(&self.fields)
    }

    /// Check the type-specific required fields from the dispatch table
    pub fn check_required(&self, registry: &TypeRegistry) -> Result<()> {
        let spec = registry.spec(&self.object_type);
        let missing: Vec<&str> = spec
            .required_fields
            .iter()
            .copied()
            .filter(|field| matches!(self.fields.get(*field), None | Some(Value::Null)))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid_object(
                self.id.clone(),
                format!("missing required field(s): {}", missing.join(", ")),
            ))
        }
    }
}

fn parse_phase(entry: &Value) -> Option<KillChainPhase> {
    let phase_name = entry.get("phase_name").and_then(Value::as_str)?;
    Some(KillChainPhase {
        kill_chain_name: entry
            .get("kill_chain_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        phase_name: phase_name.to_string(),
    })
}

fn validate_identifier(id: &str, object_type: &str) -> Result<()> {
    let (prefix, uuid) = id.split_once(ID_SEPARATOR).ok_or_else(|| {
        CoreError::invalid_object(id, "identifier is not of the form <type>--<uuid>")
    })?;
    if prefix != object_type {
        return Err(CoreError::invalid_object(
            id,
            format!("identifier prefix {:?} does not match type {:?}", prefix, object_type),
        ));
    }
    Uuid::parse_str(uuid)
        .map_err(|e| CoreError::invalid_object(id, format!("invalid identifier uuid: {}", e)))?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
