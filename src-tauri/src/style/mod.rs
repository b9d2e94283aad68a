//! Map style bootstrap: base style from `mapstyles.json`, the PMTiles source
//! rewrite and the MTR overlay.
//!
//! Failures here are shown full-screen by the UI and never retried.

pub mod layers;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use layers::{line_color_map, transit_layers, INTERCHANGES_SOURCE, ROUTES_SOURCE, STATIONS_SOURCE};

const ROUTES_FILE: &str = "datasets/mtr_routes.geojson";
const STATIONS_FILE: &str = "datasets/mtr_stations_unique.geojson";
const INTERCHANGES_FILE: &str = "datasets/mtr_stations_interchange.geojson";

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid map style: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfig {
    /// Directory holding `mapstyles.json` and `datasets/`. `None` means the
    /// bundled resource directory.
    pub assets_dir: Option<PathBuf>,
    pub style_file: String,
    /// Replaces the `protomaps` source URL.
    pub pmtiles_url: String,
    /// Transit layers are drawn directly below this layer.
    pub anchor_layer: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            style_file: "mapstyles.json".to_string(),
            pmtiles_url: "pmtiles://hong-kong.pmtiles".to_string(),
            anchor_layer: "address_label".to_string(),
        }
    }
}

/// The three MTR GeoJSON datasets.
#[derive(Debug, Clone)]
pub struct TransitData {
    pub routes: Value,
    pub stations: Value,
    pub interchanges: Value,
}

/// Points the `protomaps` source at the PMTiles archive.
pub fn prepare_base_style(mut style: Value, pmtiles_url: &str) -> Result<Value, StyleError> {
    if !style.is_object() {
        return Err(StyleError::Invalid("style root is not an object".to_string()));
    }
    if let Some(source) = style
        .get_mut("sources")
        .and_then(|sources| sources.get_mut("protomaps"))
        .and_then(Value::as_object_mut)
    {
        source.insert("url".to_string(), json!(pmtiles_url));
    }
    Ok(style)
}

/// Adds the transit sources and layers to a prepared base style.
pub fn compose_style(
    mut style: Value,
    transit: TransitData,
    anchor_layer: &str,
) -> Result<Value, StyleError> {
    let colors = line_color_map(&transit.routes);
    let root = style
        .as_object_mut()
        .ok_or_else(|| StyleError::Invalid("style root is not an object".to_string()))?;

    let sources = root
        .entry("sources")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| StyleError::Invalid("`sources` is not an object".to_string()))?;
    for (id, data) in [
        (ROUTES_SOURCE, transit.routes),
        (STATIONS_SOURCE, transit.stations),
        (INTERCHANGES_SOURCE, transit.interchanges),
    ] {
        sources.insert(id.to_string(), json!({ "type": "geojson", "data": data }));
    }

    let style_layers = root
        .entry("layers")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| StyleError::Invalid("`layers` is not an array".to_string()))?;
    let insert_at = match style_layers
        .iter()
        .position(|layer| layer.get("id").and_then(Value::as_str) == Some(anchor_layer))
    {
        Some(index) => index,
        None => {
            log::warn!("compose_style: anchor layer `{anchor_layer}` missing, appending transit layers");
            style_layers.len()
        }
    };
    style_layers.splice(insert_at..insert_at, transit_layers(&colors));

    Ok(style)
}

/// Reads the style and datasets from `assets_dir` and composes the final
/// style document handed to the renderer.
pub fn load_style(assets_dir: &Path, config: &StyleConfig) -> Result<Value, StyleError> {
    let base = read_json(&assets_dir.join(&config.style_file))?;
    let base = prepare_base_style(base, &config.pmtiles_url)?;
    let transit = TransitData {
        routes: read_json(&assets_dir.join(ROUTES_FILE))?,
        stations: read_json(&assets_dir.join(STATIONS_FILE))?,
        interchanges: read_json(&assets_dir.join(INTERCHANGES_FILE))?,
    };
    log::info!("load_style: assets={}", assets_dir.display());
    compose_style(base, transit, &config.anchor_layer)
}

fn read_json(path: &Path) -> Result<Value, StyleError> {
    let raw = std::fs::read_to_string(path).map_err(|source| StyleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StyleError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
