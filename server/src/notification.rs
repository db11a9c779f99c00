// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use tracing::info;

/// Boundary to the host notification facility.
///
/// The scheduler hands finished notifications to this port and moves on;
/// delivery is fire-and-forget and the host may silently drop it (for
/// example when notification permission was denied), so `show` returns
/// nothing.
pub trait Notifier: Send + Sync {
    fn show(
        &self,
        title: &str,
        body: &str,
        sound_uri: Option<&str>,
        sound_enabled: bool,
        vibration_enabled: bool,
    );
}

/// Default host notifier: emits the notification on the process log,
/// where the embedding host picks it up.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(
        &self,
        title: &str,
        body: &str,
        sound_uri: Option<&str>,
        sound_enabled: bool,
        vibration_enabled: bool,
    ) {
        info!(
            "NOTIFY title={:?} body={:?} sound_uri={:?} sound={} vibration={}",
            title, body, sound_uri, sound_enabled, vibration_enabled
        );
    }
}

/// Test double that records every notification it is shown.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: parking_lot::Mutex<Vec<ShownNotification>>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ShownNotification {
    pub title: String,
    pub body: String,
    pub sound_uri: Option<String>,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.shown.lock().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.shown.lock().iter().map(|n| n.title.clone()).collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn show(
        &self,
        title: &str,
        body: &str,
        sound_uri: Option<&str>,
        sound_enabled: bool,
        vibration_enabled: bool,
    ) {
        self.shown.lock().push(ShownNotification {
            title: title.to_string(),
            body: body.to_string(),
            sound_uri: sound_uri.map(str::to_string),
            sound_enabled,
            vibration_enabled,
        });
    }
}
