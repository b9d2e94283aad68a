//! Tauri IPC commands for the map screen.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager};

use crate::commands::bridge::{WebviewHaptics, WebviewMapRenderer, SNAPSHOT_EVENT};
use crate::config::AppConfig;
use crate::geocode::{HttpReverseGeocoder, ReverseGeocoder};
use crate::location::{source_for_platform, LocationError, LocationFeed, LocationSource, Platform};
use crate::models::camera::MapSnapshot;
use crate::models::events::MapEvent;
use crate::models::geo::LocationSample;
use crate::session::{HapticSink, MapSession, MapSessionHandle, NoopHaptics, SessionOptions};
use crate::style;

/// Tauri managed map state.
pub struct MapState {
    pub session: MapSessionHandle,
    pub source: Box<dyn LocationSource>,
    /// Present when fixes come from the webview geolocation plugin.
    pub feed: Option<LocationFeed>,
    pub config: AppConfig,
}

/// Builds the session for this window and starts its task.
pub fn start_map_session(app: AppHandle, config: AppConfig) -> MapState {
    let platform = Platform::detect();
    let (source, feed) = source_for_platform(platform, &config.location);
    let watch = match source.watch() {
        Ok(watch) => Some(watch),
        Err(err) => {
            log::warn!("start_map_session: location watch unavailable: {err}");
            None
        }
    };

    let geocoder: Option<Arc<dyn ReverseGeocoder>> = if config.geocoder.enabled {
        match HttpReverseGeocoder::new(&config.geocoder) {
            Ok(geocoder) => Some(Arc::new(geocoder)),
            Err(err) => {
                log::warn!("start_map_session: reverse geocoder disabled: {err}");
                None
            }
        }
    } else {
        None
    };

    let haptics: Box<dyn HapticSink> = match platform {
        Platform::Mobile => Box::new(WebviewHaptics::new(app.clone())),
        Platform::Desktop => Box::new(NoopHaptics),
    };

    let (session, handle) = MapSession::new(
        SessionOptions::from_config(&config),
        Box::new(WebviewMapRenderer::new(app.clone())),
        haptics,
        geocoder,
        watch,
    );
    log::info!(
        "start_map_session: id={} platform={platform:?}",
        handle.id()
    );

    tauri::async_runtime::spawn(session.run());
    tauri::async_runtime::spawn(forward_snapshots(app, handle.clone()));

    MapState {
        session: handle,
        source,
        feed,
        config,
    }
}

async fn forward_snapshots(app: AppHandle, handle: MapSessionHandle) {
    let mut rx = handle.subscribe();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        if let Err(err) = app.emit(SNAPSHOT_EVENT, snapshot) {
            log::warn!("forward_snapshots: failed to emit snapshot: {err}");
        }
    }
}

#[tauri::command]
pub async fn map_event(
    state: tauri::State<'_, MapState>,
    event: MapEvent,
) -> Result<(), String> {
    state.session.map_event(event).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_follow(state: tauri::State<'_, MapState>) -> Result<(), String> {
    state.session.toggle_follow().map_err(|e| e.to_string())
}

/// Fix from the frontend geolocation plugin.
#[tauri::command]
pub async fn report_location(
    state: tauri::State<'_, MapState>,
    sample: LocationSample,
) -> Result<(), String> {
    match &state.feed {
        Some(feed) => feed.push(sample).map_err(|e| e.to_string()),
        None => state
            .session
            .report_location(Ok(sample))
            .map_err(|e| e.to_string()),
    }
}

#[tauri::command]
pub async fn report_location_error(
    state: tauri::State<'_, MapState>,
    message: String,
    permission_denied: Option<bool>,
) -> Result<(), String> {
    let error = if permission_denied.unwrap_or(false) {
        LocationError::PermissionDenied
    } else {
        LocationError::Unavailable(message)
    };
    match &state.feed {
        Some(feed) => feed.push_error(error).map_err(|e| e.to_string()),
        None => state
            .session
            .report_location(Err(error))
            .map_err(|e| e.to_string()),
    }
}

#[tauri::command]
pub async fn report_orientation(
    state: tauri::State<'_, MapState>,
    alpha: Option<f64>,
) -> Result<(), String> {
    state
        .session
        .report_orientation(alpha)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_current_location(
    state: tauri::State<'_, MapState>,
) -> Result<LocationSample, String> {
    state.source.current_location().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_map_snapshot(state: tauri::State<'_, MapState>) -> Result<MapSnapshot, String> {
    Ok(state.session.snapshot())
}

/// Composed MapLibre style. Errors are meant for the full-screen error view.
#[tauri::command]
pub async fn load_map_style(
    app: AppHandle,
    state: tauri::State<'_, MapState>,
) -> Result<Value, String> {
    let assets_dir = resolve_assets_dir(&app, &state.config)?;
    style::load_style(&assets_dir, &state.config.style).map_err(|e| {
        log::error!("load_map_style: {e}");
        e.to_string()
    })
}

fn resolve_assets_dir(app: &AppHandle, config: &AppConfig) -> Result<PathBuf, String> {
    if let Some(dir) = &config.style.assets_dir {
        return Ok(dir.clone());
    }
    app.path()
        .resource_dir()
        .map(|dir| dir.join("assets"))
        .map_err(|e| format!("Failed to resolve resource directory: {e}"))
}
