use anyhow::Context as _;
use apibridge_openapi_tools::ApiSourceConfig;
use serde_json::Value;
use std::path::Path;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub spec: Option<String>,
    pub base_url: Option<String>,
    /// Appended to the file's exclusions.
    pub exclude: Vec<String>,
}

/// Build the source config from an optional YAML/JSON file plus overrides.
pub fn resolve(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<ApiSourceConfig> {
    let mut cfg = match path {
        Some(path) => load_file(path, overrides.spec.as_deref())?,
        None => {
            let spec = overrides
                .spec
                .clone()
                .context("no API document given: pass --spec or --config")?;
            ApiSourceConfig::new(spec)
        }
    };

    if let Some(base_url) = overrides.base_url {
        cfg.base_url = Some(base_url);
    }
    cfg.exclude.extend(overrides.exclude);
    Ok(cfg)
}

/// `.json` files are parsed as JSON, anything else as YAML. A `spec` override is applied
/// before deserializing so the file may omit it.
fn load_file(path: &Path, spec: Option<&str>) -> anyhow::Result<ApiSourceConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let mut raw: Value = if is_json {
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_yaml::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?
    };

    if let Some(spec) = spec {
        let obj = raw
            .as_object_mut()
            .with_context(|| format!("{} is not a mapping", path.display()))?;
        obj.insert("spec".to_string(), Value::String(spec.to_string()));
    }

    serde_json::from_value(raw).with_context(|| format!("invalid config {}", path.display()))
}
