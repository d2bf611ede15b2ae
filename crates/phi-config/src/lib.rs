//! Run configuration.
//!
//! A run is driven by one TOML document declaring schema versions, PII
//! detector patterns, the role/field permission matrix, the field
//! encryption spec with its key material, and engine tuning. Everything
//! statically checkable is validated at load so a bad run fails before
//! any record is touched.

mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use phi_crypto::StaticKeyResolver;
use phi_model::{
    EncryptionSpec, FieldKeySpec, FieldSpec, PermissionMatrix, PiiPattern, Role, Schema,
};
use phi_redact::default_patterns;

pub use error::ConfigError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const GENERATED_SALT_LEN: usize = 16;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workers: usize,
    pub timeout_ms: u64,
    /// Tokenization salt. Fixed in config for reproducible tokens across
    /// runs, otherwise generated fresh per load.
    pub salt: Vec<u8>,
}

/// Fully validated run configuration, immutable for the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub schemas: BTreeMap<String, Schema>,
    pub patterns: Vec<PiiPattern>,
    pub matrix: PermissionMatrix,
    pub roles: BTreeSet<Role>,
    pub encryption: EncryptionSpec,
    pub resolver: StaticKeyResolver,
    pub engine: EngineSettings,
}

impl RunConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), schemas = config.schemas.len(), "run config loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        validate(raw)
    }

    pub fn schema(&self, version: &str) -> Option<&Schema> {
        self.schemas.get(version)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    engine: RawEngine,
    schema: BTreeMap<String, RawSchema>,
    #[serde(default, rename = "pattern")]
    patterns: Vec<PiiPattern>,
    matrix: RawMatrix,
    #[serde(default)]
    encryption: RawEncryption,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEngine {
    workers: Option<usize>,
    timeout_ms: Option<u64>,
    salt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RawMatrix {
    unlisted_fields: String,
    roles: Vec<String>,
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEncryption {
    fields: BTreeMap<String, FieldKeySpec>,
    keys: BTreeMap<String, String>,
}

fn validate(raw: RawConfig) -> Result<RunConfig, ConfigError> {
    if raw.schema.is_empty() {
        return Err(ConfigError::NoSchemas);
    }

    let mut schemas = BTreeMap::new();
    for (version, doc) in raw.schema {
        for (field, spec) in &doc.fields {
            check_constraint_patterns(&version, field, spec)?;
        }
        schemas.insert(
            version.clone(),
            Schema {
                version,
                fields: doc.fields,
            },
        );
    }

    let patterns = if raw.patterns.is_empty() {
        default_patterns()
    } else {
        raw.patterns
    };
    let mut seen = BTreeSet::new();
    for pattern in &patterns {
        if !seen.insert(pattern.name.as_str()) {
            return Err(ConfigError::DuplicatePattern {
                name: pattern.name.clone(),
            });
        }
        Regex::new(&pattern.pattern).map_err(|e| ConfigError::InvalidPattern {
            name: pattern.name.clone(),
            message: e.to_string(),
        })?;
    }

    if raw.matrix.unlisted_fields != "public" {
        return Err(ConfigError::UnlistedDefaultNotAcknowledged);
    }
    let mut roles = BTreeSet::new();
    for name in &raw.matrix.roles {
        let role = Role::new(name.as_str()).map_err(|_| ConfigError::InvalidRole(name.clone()))?;
        roles.insert(role);
    }
    let mut matrix_entries = BTreeMap::new();
    for (field, names) in raw.matrix.fields {
        let mut granted = BTreeSet::new();
        for name in names {
            let role =
                Role::new(name.as_str()).map_err(|_| ConfigError::InvalidRole(name.clone()))?;
            if !roles.contains(&role) {
                return Err(ConfigError::UnknownRole { field, role: name });
            }
            granted.insert(role);
        }
        matrix_entries.insert(field, granted);
    }
    let matrix = PermissionMatrix::new(matrix_entries);

    for (field, spec) in &raw.encryption.fields {
        if !raw.encryption.keys.contains_key(&spec.key_ref) {
            return Err(ConfigError::UnknownKeyRef {
                field: field.clone(),
                key_ref: spec.key_ref.clone(),
            });
        }
    }
    let resolver = StaticKeyResolver::from_base64(&raw.encryption.keys)?;
    let encryption = EncryptionSpec::new(raw.encryption.fields);
    for schema in schemas.values() {
        for field in schema.sensitive_fields() {
            if encryption.get(field).is_none() {
                return Err(ConfigError::SensitiveWithoutEntry {
                    version: schema.version.clone(),
                    field: field.to_string(),
                });
            }
        }
    }

    let workers = match raw.engine.workers {
        Some(0) => return Err(ConfigError::ZeroWorkers),
        Some(n) => n,
        None => std::thread::available_parallelism().map_or(4, usize::from),
    };
    let salt = match raw.engine.salt {
        Some(encoded) => {
            let decoded =
                hex::decode(encoded.trim()).map_err(|e| ConfigError::InvalidSalt(e.to_string()))?;
            if decoded.is_empty() {
                return Err(ConfigError::InvalidSalt("salt must not be empty".into()));
            }
            decoded
        }
        None => {
            let mut salt = vec![0u8; GENERATED_SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            salt
        }
    };

    Ok(RunConfig {
        schemas,
        patterns,
        matrix,
        roles,
        encryption,
        resolver,
        engine: EngineSettings {
            workers,
            timeout_ms: raw.engine.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            salt,
        },
    })
}

fn check_constraint_patterns(
    version: &str,
    path: &str,
    spec: &FieldSpec,
) -> Result<(), ConfigError> {
    if let Some(pattern) = &spec.constraints.pattern {
        Regex::new(pattern).map_err(|e| ConfigError::InvalidConstraintPattern {
            version: version.to_string(),
            field: path.to_string(),
            message: e.to_string(),
        })?;
    }
    for (child, child_spec) in &spec.fields {
        check_constraint_patterns(version, &format!("{path}.{child}"), child_spec)?;
    }
    if let Some(items) = &spec.items {
        check_constraint_patterns(version, &format!("{path}[]"), items)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const GOOD: &str = r#"
        [engine]
        workers = 2
        timeout_ms = 1000
        salt = "deadbeef"

        [schema.v1.fields.patient_id]
        required = true
        type = "string"
        sensitive = true
        constraints = { min_length = 1 }

        [schema.v1.fields.note]
        type = "string"

        [[pattern]]
        name = "ssn"
        pattern = '\b\d{3}-\d{2}-\d{4}\b'
        strategy = "redact"

        [matrix]
        unlisted_fields = "public"
        roles = ["clinician", "analyst"]

        [matrix.fields]
        patient_id = ["clinician"]
        ssn = ["clinician"]

        [encryption.fields.patient_id]
        key_ref = "patient-data-key"
        algorithm = "AES-256-GCM"

        [encryption.keys]
        patient-data-key = "KioqKioqKioqKioqKioqKioqKioqKioqKioqKioqKio="
        "#;

    #[test]
    fn loads_complete_config() {
        let config = RunConfig::from_toml_str(GOOD).unwrap();
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.engine.salt, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(config.schema("v1").is_some());
        assert!(config.schema("v2").is_none());
        assert_eq!(config.patterns.len(), 1);
        assert!(config.resolver.contains("patient-data-key"));
        assert_eq!(config.roles.len(), 2);
    }

    #[test]
    fn from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOOD.as_bytes()).unwrap();
        let config = RunConfig::from_path(file.path()).unwrap();
        assert_eq!(config.engine.timeout_ms, 1000);
    }

    #[test]
    fn defaults_to_builtin_patterns() {
        let text = GOOD.replace(
            r#"[[pattern]]
        name = "ssn"
        pattern = '\b\d{3}-\d{2}-\d{4}\b'
        strategy = "redact""#,
            "",
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        let names: Vec<_> = config.patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ssn", "email", "phone", "mrn"]);
    }

    #[test]
    fn rejects_unacknowledged_unlisted_default() {
        let text = GOOD.replace(r#"unlisted_fields = "public""#, r#"unlisted_fields = "deny""#);
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::UnlistedDefaultNotAcknowledged)
        ));
    }

    #[test]
    fn rejects_matrix_entry_with_undeclared_role() {
        let text = GOOD.replace(
            r#"patient_id = ["clinician"]"#,
            r#"patient_id = ["intruder"]"#,
        );
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::UnknownRole { field, role })
                if field == "patient_id" && role == "intruder"
        ));
    }

    #[test]
    fn rejects_invalid_detector_regex() {
        let text = GOOD.replace(r#"pattern = '\b\d{3}-\d{2}-\d{4}\b'"#, r#"pattern = '(['"#);
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::InvalidPattern { name, .. }) if name == "ssn"
        ));
    }

    #[test]
    fn rejects_sensitive_field_without_encryption_entry() {
        let text = GOOD.replace("[encryption.fields.patient_id]", "[encryption.fields.other]");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::SensitiveWithoutEntry { version, field })
                if version == "v1" && field == "patient_id"
        ));
    }

    #[test]
    fn rejects_unknown_key_reference() {
        let text = GOOD.replace("patient-data-key = ", "other-key = ");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::UnknownKeyRef { .. })
        ));
    }

    #[test]
    fn rejects_short_key_material() {
        let text = GOOD.replace(
            "KioqKioqKioqKioqKioqKioqKioqKioqKioqKioqKio=",
            "c2hvcnQ=",
        );
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::Key(_))
        ));
    }

    #[test]
    fn rejects_zero_workers_and_bad_salt() {
        let text = GOOD.replace("workers = 2", "workers = 0");
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::ZeroWorkers)
        ));

        let text = GOOD.replace(r#"salt = "deadbeef""#, r#"salt = "not-hex""#);
        assert!(matches!(
            RunConfig::from_toml_str(&text),
            Err(ConfigError::InvalidSalt(_))
        ));
    }
}
