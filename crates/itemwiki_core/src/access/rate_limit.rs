//! Per-session sliding-window rate limiting.
//!
//! # Invariants
//! - Counts are kept per `(session id, action)`.
//! - Actions without a configured limit are never throttled.
//! - A denial reports `retry_after_secs >= 1`.
//! - Keys whose window has fully expired are swept at most once per longest
//!   configured window, so abandoned sessions do not accumulate.

use crate::access::AccessError;
use log::warn;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const PUBLIC_SEARCH_ITEMS: &str = "public_search_items";
pub const PUBLIC_VIEW_ITEMS: &str = "public_view_items";
pub const PUBLIC_GET_ITEM_BY_ID: &str = "public_get_item_by_id";
pub const CREATE_ITEM: &str = "create_item";
pub const UPDATE_ITEM: &str = "update_item";
pub const DELETE_ITEM: &str = "delete_item";
pub const CREATE_USER: &str = "create_user";
pub const RESET_PASSWORD: &str = "reset_password";

/// Maximum requests allowed within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

type WindowKey = (String, String);

#[derive(Default)]
struct WindowState {
    windows: HashMap<WindowKey, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

/// Advisory limiter guarded by its own mutex.
pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Limiter with no configured actions.
    pub fn unlimited() -> Self {
        Self {
            limits: HashMap::new(),
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn with_limit(mut self, action: impl Into<String>, limit: RateLimit) -> Self {
        self.limits.insert(action.into(), limit);
        self
    }

    pub fn limit_for(&self, action: &str) -> Option<RateLimit> {
        self.limits.get(action).copied()
    }

    /// Records one request for `action` and rejects it when the window is full.
    pub fn check(&self, session_id: &str, action: &str) -> Result<(), AccessError> {
        self.check_at(session_id, action, Instant::now())
    }

    /// Same as [`RateLimiter::check`] against an explicit clock reading.
    pub fn check_at(
        &self,
        session_id: &str,
        action: &str,
        now: Instant,
    ) -> Result<(), AccessError> {
        let Some(limit) = self.limit_for(action) else {
            return Ok(());
        };

        let mut state = self.lock();
        self.sweep_expired(&mut state, now);
        let window = state
            .windows
            .entry((session_id.to_string(), action.to_string()))
            .or_default();

        while window
            .front()
            .is_some_and(|seen| now.saturating_duration_since(*seen) >= limit.window)
        {
            window.pop_front();
        }

        if window.len() >= limit.max_requests {
            let retry_after = window
                .front()
                .map(|oldest| {
                    limit
                        .window
                        .saturating_sub(now.saturating_duration_since(*oldest))
                })
                .unwrap_or(limit.window);
            let retry_after_secs = retry_after.as_secs().max(1);
            warn!(
                "event=rate_limited module=access status=error action={action} retry_after_secs={retry_after_secs}"
            );
            return Err(AccessError::RateLimited {
                action: action.to_string(),
                retry_after_secs,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drops every recorded request for `session_id`.
    pub fn reset_session(&self, session_id: &str) {
        self.lock()
            .windows
            .retain(|(session, _), _| session != session_id);
    }

    /// Number of `(session, action)` windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.lock().windows.len()
    }

    fn sweep_expired(&self, state: &mut WindowState, now: Instant) {
        let Some(longest) = self.limits.values().map(|limit| limit.window).max() else {
            return;
        };
        if state
            .last_sweep
            .is_some_and(|last| now.saturating_duration_since(last) < longest)
        {
            return;
        }
        state.last_sweep = Some(now);

        let limits = &self.limits;
        state.windows.retain(|(_, action), window| {
            match (limits.get(action), window.back()) {
                (Some(limit), Some(latest)) => {
                    now.saturating_duration_since(*latest) < limit.window
                }
                _ => false,
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
            .with_limit(PUBLIC_SEARCH_ITEMS, RateLimit::per_minute(100))
            .with_limit(PUBLIC_VIEW_ITEMS, RateLimit::per_minute(100))
            .with_limit(PUBLIC_GET_ITEM_BY_ID, RateLimit::per_minute(100))
            .with_limit(CREATE_ITEM, RateLimit::per_minute(10))
            .with_limit(UPDATE_ITEM, RateLimit::per_minute(10))
            .with_limit(DELETE_ITEM, RateLimit::per_minute(5))
            .with_limit(CREATE_USER, RateLimit::per_minute(5))
            .with_limit(RESET_PASSWORD, RateLimit::per_minute(5))
    }
}
