//! Fixture loading: YAML or JSON files holding either a plain list or a
//! Kubernetes `List` object with `items`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

pub fn parse_items<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: serde_yaml::Value = serde_yaml::from_str(text).context("parsing fixture")?;
    let items = match doc {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mut m) => match m.remove("items") {
            Some(items) => items,
            None => serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(m)]),
        },
        other => other,
    };
    serde_yaml::from_value(items).context("decoding fixture items")
}

pub fn load_items<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_items(&text).with_context(|| format!("in {}", path.display()))
}

pub fn load_one<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

pub fn load_optional<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    path.map_or_else(|| Ok(Vec::new()), load_items::<T>)
}
