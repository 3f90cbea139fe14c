//! Network activity tracking for Chromium tabs.
//!
//! A page counts as settled once no request has been in flight and no frame
//! has been loading for a quiet window. Clicking a submit button starts its
//! navigation asynchronously, so the window is measured from the later of the
//! wait starting and the last observed activity.

use crate::error::{BrowserError, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameStartedLoading, EventFrameStoppedLoading,
};
use chromiumoxide::page::Page;
use futures_util::stream::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Quiet period with no requests in flight before a page counts as idle.
pub const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct ActivityState {
    in_flight: HashSet<String>,
    loading_frames: HashSet<String>,
    last_change: Instant,
}

/// Requests and frame loads seen on one page.
#[derive(Debug)]
pub struct NetworkActivity {
    state: Mutex<ActivityState>,
}

impl Default for NetworkActivity {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl NetworkActivity {
    /// Tracker with no activity, last changed at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            state: Mutex::new(ActivityState {
                in_flight: HashSet::new(),
                loading_frames: HashSet::new(),
                last_change: now,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn request_started(&self, id: &str, now: Instant) {
        let mut state = self.lock();
        state.in_flight.insert(id.to_string());
        state.last_change = now;
    }

    pub fn request_finished(&self, id: &str, now: Instant) {
        let mut state = self.lock();
        if state.in_flight.remove(id) {
            state.last_change = now;
        }
    }

    pub fn frame_started(&self, frame_id: &str, now: Instant) {
        let mut state = self.lock();
        state.loading_frames.insert(frame_id.to_string());
        state.last_change = now;
    }

    pub fn frame_stopped(&self, frame_id: &str, now: Instant) {
        let mut state = self.lock();
        if state.loading_frames.remove(frame_id) {
            state.last_change = now;
        }
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Whether the page has been quiet for `quiet`, counting from no
    /// earlier than `since`.
    pub fn is_idle(&self, since: Instant, quiet: Duration, now: Instant) -> bool {
        let state = self.lock();
        if !state.in_flight.is_empty() || !state.loading_frames.is_empty() {
            return false;
        }
        let quiet_from = state.last_change.max(since);
        now.saturating_duration_since(quiet_from) >= quiet
    }

    /// Subscribe to `page`'s network and frame events. The returned tasks
    /// run until aborted or the page goes away.
    pub async fn watch(page: &Page) -> Result<(Arc<Self>, Vec<JoinHandle<()>>)> {
        let activity = Arc::new(Self::default());
        let chromium = |e: chromiumoxide::error::CdpError| BrowserError::Chromium(e.to_string());

        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(chromium)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(chromium)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(chromium)?;
        let mut frame_started = page
            .event_listener::<EventFrameStartedLoading>()
            .await
            .map_err(chromium)?;
        let mut frame_stopped = page
            .event_listener::<EventFrameStoppedLoading>()
            .await
            .map_err(chromium)?;

        let tasks = vec![
            tokio::spawn({
                let activity = Arc::clone(&activity);
                async move {
                    while let Some(event) = sent.next().await {
                        activity.request_started(event.request_id.inner(), Instant::now());
                    }
                }
            }),
            tokio::spawn({
                let activity = Arc::clone(&activity);
                async move {
                    while let Some(event) = finished.next().await {
                        activity.request_finished(event.request_id.inner(), Instant::now());
                    }
                }
            }),
            tokio::spawn({
                let activity = Arc::clone(&activity);
                async move {
                    while let Some(event) = failed.next().await {
                        activity.request_finished(event.request_id.inner(), Instant::now());
                    }
                }
            }),
            tokio::spawn({
                let activity = Arc::clone(&activity);
                async move {
                    while let Some(event) = frame_started.next().await {
                        activity.frame_started(event.frame_id.inner(), Instant::now());
                    }
                }
            }),
            tokio::spawn({
                let activity = Arc::clone(&activity);
                async move {
                    while let Some(event) = frame_stopped.next().await {
                        activity.frame_stopped(event.frame_id.inner(), Instant::now());
                    }
                }
            }),
        ];

        Ok((activity, tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = NETWORK_IDLE_QUIET;

    #[test]
    fn test_quiet_window_counts_from_wait_start() {
        let t0 = Instant::now();
        let activity = NetworkActivity::new(t0);

        // Page idle for a long time before the click
        let click = t0 + Duration::from_secs(10);
        assert!(!activity.is_idle(click, QUIET, click + Duration::from_millis(100)));
        assert!(activity.is_idle(click, QUIET, click + QUIET));
    }

    #[test]
    fn test_navigation_started_after_click_is_awaited() {
        let t0 = Instant::now();
        let activity = NetworkActivity::new(t0);
        let click = t0 + Duration::from_secs(1);

        // Form POST goes out 300 ms after the click
        activity.request_started("post-login", click + Duration::from_millis(300));
        assert!(!activity.is_idle(click, QUIET, click + Duration::from_secs(5)));
        assert_eq!(activity.in_flight(), 1);

        let done = click + Duration::from_secs(2);
        activity.request_finished("post-login", done);
        assert!(!activity.is_idle(click, QUIET, done + Duration::from_millis(499)));
        assert!(activity.is_idle(click, QUIET, done + QUIET));
    }

    #[test]
    fn test_loading_frame_blocks_idle() {
        let t0 = Instant::now();
        let activity = NetworkActivity::new(t0);

        activity.frame_started("main", t0);
        assert!(!activity.is_idle(t0, QUIET, t0 + Duration::from_secs(3)));

        activity.frame_stopped("main", t0 + Duration::from_secs(3));
        assert!(activity.is_idle(t0, QUIET, t0 + Duration::from_secs(4)));
    }

    #[test]
    fn test_unknown_completion_is_ignored() {
        let t0 = Instant::now();
        let activity = NetworkActivity::new(t0);

        activity.request_finished("never-started", t0 + Duration::from_secs(2));
        assert!(activity.is_idle(t0, QUIET, t0 + QUIET));
    }
}
