//! Provisioning document and section parsing.
//!
//! The orchestrator hands each plugin a JSON document whose first
//! top-level key names the plugin section. Only that first section is
//! considered; additional keys are ignored.

use crate::url::UrlKind;
use failure::{Fallible, ResultExt};
use serde_json::{Map, Value};
use std::path::Path;

/// Section key for a templated URL descriptor.
static DYNAMIC_URL_KEY: &str = "dynamic-url";
/// Section key for a static URL descriptor.
static URL_KEY: &str = "url";

/// Parsed provisioning document, with document key order preserved.
#[derive(Debug)]
pub(crate) struct ProvisioningDocument {
    root: Value,
}

impl ProvisioningDocument {
    pub(crate) fn read(path: &Path) -> Fallible<Self> {
        let content = std::fs::read(path)
            .context(format!("failed to read file '{}'", path.display()))?;
        let root = serde_json::from_slice(&content)
            .context(format!("failed to parse JSON in '{}'", path.display()))?;
        Ok(Self { root })
    }

    /// First section in document order, if any.
    pub(crate) fn first_section(&self) -> Option<(&str, &Value)> {
        self.root
            .as_object()
            .and_then(|obj| obj.iter().next())
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Plugin options extracted from a section body.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SectionSpec {
    pub(crate) url_kind: UrlKind,
    /// Raw URL descriptor, either a string or an object.
    pub(crate) url: Value,
    /// Full reload (true) or incremental load (false).
    pub(crate) clear_config: bool,
    /// Persist to startup configuration after applying.
    pub(crate) save_config: bool,
}

impl SectionSpec {
    pub(crate) fn parse(body: &Value) -> Fallible<Self> {
        let obj = match body.as_object() {
            Some(obj) => obj,
            None => bail!("section body is not a JSON object"),
        };

        let (url_kind, url) = match (non_null(obj, DYNAMIC_URL_KEY), non_null(obj, URL_KEY)) {
            (Some(dynamic), _) => (UrlKind::Dynamic, dynamic.clone()),
            (None, Some(url)) => (UrlKind::Static, url.clone()),
            (None, None) => bail!("Either a URL or a dynamic URL should be provided"),
        };

        Ok(Self {
            url_kind,
            url,
            clear_config: get_bool(obj, "clear-config", true)?,
            save_config: get_bool(obj, "save-config", false)?,
        })
    }
}

fn non_null<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// Read a boolean field, accepting `"true"`/`"false"` strings too.
pub(crate) fn get_bool(obj: &Map<String, Value>, key: &str, default: bool) -> Fallible<bool> {
    match non_null(obj, key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => bail!("invalid value for '{}': expected boolean, got {}", key, v),
    }
}

/// Read an optional string field.
pub(crate) fn get_string(obj: &Map<String, Value>, key: &str) -> Fallible<Option<String>> {
    match non_null(obj, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) => bail!("invalid value for '{}': expected string, got {}", key, v),
    }
}

/// Read an optional non-negative integer field.
pub(crate) fn get_u64(obj: &Map<String, Value>, key: &str) -> Fallible<Option<u64>> {
    match non_null(obj, key) {
        None => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("invalid value for '{}': expected unsigned integer, got {}", key, v),
        },
    }
}
