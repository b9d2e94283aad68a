//! Location sources feeding the follow controller.
//!
//! On mobile the webview's geolocation plugin owns the sensor and forwards
//! fixes through a [`LocationFeed`]; on desktop a fixed emulated fix is used.
//! Either way the session consumes a [`LocationWatch`]; dropping it releases
//! the subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::models::geo::{LngLat, LocationSample};

pub type LocationUpdate = Result<LocationSample, LocationError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location watch is closed")]
    WatchClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationConfig {
    /// Used when no fix arrives within `fallback_after_ms`.
    pub default_location: LngLat,
    pub fallback_after_ms: u64,
    /// Fixed position reported on desktop, where there is no GPS.
    pub emulated_location: LngLat,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_location: LngLat::new(114.1694, 22.3193),
            fallback_after_ms: 5_000,
            emulated_location: LngLat::new(114.169525, 22.321566),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mobile,
    Desktop,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(any(target_os = "android", target_os = "ios")) {
            Platform::Mobile
        } else {
            Platform::Desktop
        }
    }
}

pub trait LocationSource: Send + Sync {
    /// One-shot fix.
    fn current_location(&self) -> Result<LocationSample, LocationError>;

    /// Continuous fixes until the returned watch is dropped.
    fn watch(&self) -> Result<LocationWatch, LocationError>;
}

/// Receiving end of a location subscription.
pub struct LocationWatch {
    rx: UnboundedReceiver<LocationUpdate>,
    release: Option<(Arc<FeedShared>, u64)>,
}

impl LocationWatch {
    /// Next update; `None` once the source will never produce another one.
    pub async fn next(&mut self) -> Option<LocationUpdate> {
        self.rx.recv().await
    }

    fn detached(rx: UnboundedReceiver<LocationUpdate>) -> Self {
        Self { rx, release: None }
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        if let Some((shared, watch_id)) = self.release.take() {
            let mut slot = shared
                .current_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // A newer watch may already own the slot.
            if slot.as_ref().is_some_and(|(id, _)| *id == watch_id) {
                *slot = None;
                log::debug!("location watch {watch_id} released");
            }
        }
    }
}

/// Desktop stand-in: always reports the same fix.
pub struct EmulatedLocationSource {
    position: LngLat,
}

impl EmulatedLocationSource {
    pub fn new(position: LngLat) -> Self {
        Self { position }
    }
}

impl LocationSource for EmulatedLocationSource {
    fn current_location(&self) -> Result<LocationSample, LocationError> {
        Ok(self.position.into())
    }

    fn watch(&self) -> Result<LocationWatch, LocationError> {
        let (tx, rx) = unbounded_channel();
        // The receiver still yields the buffered fix after the sender is gone.
        let _ = tx.send(Ok(self.position.into()));
        Ok(LocationWatch::detached(rx))
    }
}

#[derive(Default)]
struct FeedShared {
    /// Sender of the active watch; `None` when nobody is subscribed.
    current_tx: Mutex<Option<(u64, UnboundedSender<LocationUpdate>)>>,
    last: Mutex<Option<LocationSample>>,
    next_watch_id: AtomicU64,
}

/// Source backed by fixes pushed from outside (the webview geolocation plugin).
pub struct ForwardedLocationSource {
    shared: Arc<FeedShared>,
}

/// Push side of a [`ForwardedLocationSource`].
#[derive(Clone)]
pub struct LocationFeed {
    shared: Arc<FeedShared>,
}

impl ForwardedLocationSource {
    pub fn new() -> (Self, LocationFeed) {
        let shared = Arc::new(FeedShared::default());
        (
            Self {
                shared: shared.clone(),
            },
            LocationFeed { shared },
        )
    }
}

impl LocationSource for ForwardedLocationSource {
    fn current_location(&self) -> Result<LocationSample, LocationError> {
        self.shared
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or_else(|| LocationError::Unavailable("no fix reported yet".to_string()))
    }

    fn watch(&self) -> Result<LocationWatch, LocationError> {
        let (tx, rx) = unbounded_channel();
        let watch_id = self.shared.next_watch_id.fetch_add(1, Ordering::Relaxed);
        let mut slot = self
            .shared
            .current_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::debug!("location watch {watch_id} replaces an active watch");
        }
        *slot = Some((watch_id, tx));
        Ok(LocationWatch {
            rx,
            release: Some((self.shared.clone(), watch_id)),
        })
    }
}

impl LocationFeed {
    /// Forwards a fix. The fix is remembered for `current_location` even
    /// when no watch is active.
    pub fn push(&self, sample: LocationSample) -> Result<(), LocationError> {
        *self.shared.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
        self.send(Ok(sample))
    }

    /// Forwards a per-update failure; the watch stays open.
    pub fn push_error(&self, error: LocationError) -> Result<(), LocationError> {
        self.send(Err(error))
    }

    fn send(&self, update: LocationUpdate) -> Result<(), LocationError> {
        let mut slot = self
            .shared
            .current_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some((_, tx)) = slot.as_ref() else {
            return Err(LocationError::WatchClosed);
        };
        if tx.send(update).is_err() {
            *slot = None;
            return Err(LocationError::WatchClosed);
        }
        Ok(())
    }
}

/// Picks the location source for the platform. Mobile also returns the feed
/// the frontend pushes fixes into.
pub fn source_for_platform(
    platform: Platform,
    config: &LocationConfig,
) -> (Box<dyn LocationSource>, Option<LocationFeed>) {
    match platform {
        Platform::Desktop => (
            Box::new(EmulatedLocationSource::new(config.emulated_location)),
            None,
        ),
        Platform::Mobile => {
            let (source, feed) = ForwardedLocationSource::new();
            (Box::new(source), Some(feed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emulated_source_yields_fixed_fix_then_ends() {
        let position = LngLat::new(114.169525, 22.321566);
        let source = EmulatedLocationSource::new(position);
        assert_eq!(
            source.current_location().expect("fix").position(),
            position
        );

        let mut watch = source.watch().expect("watch");
        let first = watch.next().await.expect("update").expect("fix");
        assert_eq!(first.position(), position);
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn forwarded_source_delivers_pushes_and_errors() {
        let (source, feed) = ForwardedLocationSource::new();
        assert!(source.current_location().is_err());

        let mut watch = source.watch().expect("watch");
        feed.push(LocationSample::new(114.1, 22.3)).expect("push");
        feed.push_error(LocationError::PermissionDenied)
            .expect("push error");

        let fix = watch.next().await.expect("update").expect("fix");
        assert_eq!(fix.position(), LngLat::new(114.1, 22.3));
        assert_eq!(
            watch.next().await.expect("update"),
            Err(LocationError::PermissionDenied)
        );
        assert_eq!(
            source.current_location().expect("last fix").position(),
            LngLat::new(114.1, 22.3)
        );
    }

    #[test]
    fn dropping_watch_releases_subscription() {
        let (source, feed) = ForwardedLocationSource::new();
        let watch = source.watch().expect("watch");
        drop(watch);

        assert_eq!(
            feed.push(LocationSample::new(114.1, 22.3)),
            Err(LocationError::WatchClosed)
        );
        // The fix is still remembered for one-shot queries.
        assert!(source.current_location().is_ok());
    }

    #[test]
    fn dropping_a_replaced_watch_keeps_the_newer_one() {
        let (source, feed) = ForwardedLocationSource::new();
        let old = source.watch().expect("old watch");
        let _current = source.watch().expect("new watch");
        drop(old);

        assert!(feed.push(LocationSample::new(114.1, 22.3)).is_ok());
    }

    #[test]
    fn desktop_gets_emulated_source_without_feed() {
        let config = LocationConfig::default();
        let (source, feed) = source_for_platform(Platform::Desktop, &config);
        assert!(feed.is_none());
        assert_eq!(
            source.current_location().expect("fix").position(),
            config.emulated_location
        );

        let (_, feed) = source_for_platform(Platform::Mobile, &config);
        assert!(feed.is_some());
    }
}
