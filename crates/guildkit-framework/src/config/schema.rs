//! Config schemas.
//!
//! Schema validation is delegated to serde: a plugin's config type supplies
//! its defaults through [`Default`] and validates through [`Deserialize`].

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ConfigMap, OverrideRule, merge_config};
use crate::error::ConfigurationError;

/// Supplies defaults for and validates a plugin's config object.
pub trait ConfigSchema: Send + Sync {
    /// The default config object.
    fn defaults(&self) -> Result<ConfigMap, String>;

    /// Validates `config`, returning it in normalized form.
    fn normalize(&self, config: Value) -> Result<ConfigMap, String>;
}

/// [`ConfigSchema`] backed by a serde type.
pub struct SerdeSchema<T>(PhantomData<fn() -> T>);

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn into_object(value: Value) -> Result<ConfigMap, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("config must be an object, got {other}")),
    }
}

impl<T> ConfigSchema for SerdeSchema<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn defaults(&self) -> Result<ConfigMap, String> {
        serde_json::to_value(T::default())
            .map_err(|e| e.to_string())
            .and_then(into_object)
    }

    fn normalize(&self, config: Value) -> Result<ConfigMap, String> {
        let typed = T::deserialize(config).map_err(|e| e.to_string())?;
        serde_json::to_value(typed)
            .map_err(|e| e.to_string())
            .and_then(into_object)
    }
}

/// Computes an instance's base config: schema defaults with `config` merged
/// over them, validated by the schema.
pub(crate) fn resolve_base(
    plugin: &str,
    schema: Option<&dyn ConfigSchema>,
    config: &ConfigMap,
) -> Result<ConfigMap, ConfigurationError> {
    let Some(schema) = schema else {
        return Ok(config.clone());
    };

    let defaults = schema.defaults().map_err(|reason| ConfigurationError::Schema {
        plugin: plugin.to_string(),
        reason,
    })?;
    schema
        .normalize(Value::Object(merge_config(&defaults, config)))
        .map_err(|reason| ConfigurationError::Malformed {
            plugin: plugin.to_string(),
            reason,
        })
}

/// Checks that every override patch yields a valid config when applied.
pub(crate) fn validate_overrides(
    plugin: &str,
    schema: Option<&dyn ConfigSchema>,
    base: &ConfigMap,
    overrides: &[OverrideRule],
) -> Result<(), ConfigurationError> {
    let Some(schema) = schema else {
        return Ok(());
    };
    for (index, rule) in overrides.iter().enumerate() {
        schema
            .normalize(Value::Object(merge_config(base, &rule.config)))
            .map_err(|reason| ConfigurationError::Malformed {
                plugin: plugin.to_string(),
                reason: format!("override #{index}: {reason}"),
            })?;
    }
    Ok(())
}
