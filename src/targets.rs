use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::detect::{classify, Status};
use crate::driver::{Handle, InputDriver};
use crate::error::RelayError;

/// A discovered target window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub handle: Handle,
    pub title: String,
    pub status: Status,
    pub label: Option<String>,
}

impl Target {
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => format!("{} ({})", label, self.handle),
            None => self.handle.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Memory {
    last_hash: Option<String>,
    last_payload: Option<String>,
}

/// Which targets exist, which one the operator is talking to, and what we
/// remember about each. Labels are read-only here.
pub struct TargetRegistry {
    driver: InputDriver,
    labels: HashMap<Handle, String>,
    selected: Mutex<Option<Handle>>,
    memory: Mutex<HashMap<Handle, Memory>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Numeric part of a pane id, so `%12` sorts after `%3`
fn handle_order(handle: &Handle) -> u64 {
    handle
        .as_str()
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0)
}

impl TargetRegistry {
    pub fn new(driver: InputDriver, labels: HashMap<String, String>) -> Self {
        Self {
            driver,
            labels: labels
                .into_iter()
                .map(|(k, v)| (Handle::new(k), v))
                .collect(),
            selected: Mutex::new(None),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> &InputDriver {
        &self.driver
    }

    /// Scan for targets: idle first, then thinking, then unknown; newest
    /// pane first within a group
    pub async fn scan(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .driver
            .discover()
            .await
            .into_iter()
            .map(|w| Target {
                status: classify(&w.title),
                label: self.labels.get(&w.handle).cloned(),
                handle: w.handle,
                title: w.title,
            })
            .collect();

        targets.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then_with(|| handle_order(&b.handle).cmp(&handle_order(&a.handle)))
        });

        let seen: HashSet<&Handle> = targets.iter().map(|t| &t.handle).collect();
        lock(&self.memory).retain(|h, _| seen.contains(h));

        targets
    }

    /// The cached target if it is still alive, else the first one discovered
    pub async fn resolve(&self) -> Option<Handle> {
        let cached = lock(&self.selected).clone();
        if let Some(handle) = cached {
            if !self.driver.read_title(&handle).await.is_empty() {
                return Some(handle);
            }
            tracing::info!(handle = %handle, "cached target is gone");
            self.invalidate(&handle);
        }

        let first = self.scan().await.into_iter().next()?;
        tracing::info!(handle = %first.handle, title = %first.title, "target resolved");
        *lock(&self.selected) = Some(first.handle.clone());
        Some(first.handle)
    }

    pub fn select(&self, handle: Handle) {
        *lock(&self.selected) = Some(handle);
    }

    pub fn selected(&self) -> Option<Handle> {
        lock(&self.selected).clone()
    }

    /// Forget the cached handle so the next operation re-discovers
    pub fn invalidate(&self, handle: &Handle) {
        let mut selected = lock(&self.selected);
        if selected.as_ref() == Some(handle) {
            *selected = None;
        }
    }

    pub fn label(&self, handle: &Handle) -> Option<&str> {
        self.labels.get(handle).map(String::as_str)
    }

    pub fn display_name(&self, handle: &Handle) -> String {
        match self.label(handle) {
            Some(label) => label.to_string(),
            None => handle.to_string(),
        }
    }

    pub fn last_hash(&self, handle: &Handle) -> Option<String> {
        lock(&self.memory)
            .get(handle)
            .and_then(|m| m.last_hash.clone())
    }

    pub fn set_last_hash(&self, handle: &Handle, hash: String) {
        lock(&self.memory).entry(handle.clone()).or_default().last_hash = Some(hash);
    }

    pub fn forget_hash(&self, handle: &Handle) {
        if let Some(m) = lock(&self.memory).get_mut(handle) {
            m.last_hash = None;
        }
    }

    pub fn last_payload(&self, handle: &Handle) -> Option<String> {
        lock(&self.memory)
            .get(handle)
            .and_then(|m| m.last_payload.clone())
    }

    pub fn remember_payload(&self, handle: &Handle, payload: &str) {
        lock(&self.memory).entry(handle.clone()).or_default().last_payload =
            Some(payload.to_string());
    }

    /// Inject, and on failure re-resolve the target once and retry. A second
    /// failure invalidates the cached handle.
    pub async fn inject_with_retry(
        &self,
        handle: &Handle,
        payload: &str,
    ) -> Result<Handle, RelayError> {
        if self.driver.inject(handle, payload).await {
            self.remember_payload(handle, payload);
            return Ok(handle.clone());
        }

        tracing::warn!(handle = %handle, "injection failed, re-resolving target");
        self.invalidate(handle);
        let Some(retry) = self.resolve().await else {
            return Err(RelayError::InjectionFailure(handle.clone()));
        };

        if self.driver.inject(&retry, payload).await {
            self.remember_payload(&retry, payload);
            return Ok(retry);
        }

        self.invalidate(&retry);
        Err(RelayError::InjectionFailure(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverTiming;
    use crate::testing::{FakeSurface, IDLE};
    use std::sync::Arc;
    use std::time::Duration;

    fn registry(surface: Arc<FakeSurface>) -> TargetRegistry {
        let timing = DriverTiming {
            settle: Duration::ZERO,
            key_pause: Duration::ZERO,
        };
        let labels = HashMap::from([("%1".to_string(), "api".to_string())]);
        TargetRegistry::new(InputDriver::new(surface, timing), labels)
    }

    #[test]
    fn test_handle_order_is_numeric() {
        assert!(handle_order(&Handle::new("%12")) > handle_order(&Handle::new("%3")));
        assert_eq!(handle_order(&Handle::new("pane")), 0);
    }

    #[tokio::test]
    async fn test_scan_attaches_status_and_label() {
        let surface = Arc::new(FakeSurface::new(&[IDLE]));
        let targets = registry(surface).scan().await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].status, Status::Idle);
        assert_eq!(targets[0].label.as_deref(), Some("api"));
        assert_eq!(targets[0].display_name(), "api (%1)");
    }

    #[tokio::test]
    async fn test_resolve_caches_and_invalidates() {
        let surface = Arc::new(FakeSurface::new(&[IDLE]));
        let registry = registry(surface.clone());

        assert_eq!(registry.resolve().await, Some(surface.handle()));
        assert_eq!(registry.selected(), Some(surface.handle()));

        surface.close();
        assert_eq!(registry.resolve().await, None);
        assert_eq!(registry.selected(), None);
    }

    #[tokio::test]
    async fn test_inject_failure_invalidates_after_one_retry() {
        let surface = Arc::new(FakeSurface::new(&[IDLE]));
        surface.fail_typing(true);
        surface.fail_paste(true);
        let registry = registry(surface.clone());
        registry.select(surface.handle());

        let err = registry
            .inject_with_retry(&surface.handle(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InjectionFailure(_)));
        assert_eq!(registry.selected(), None);
        // two attempts, two channels each
        assert_eq!(surface.activations(), 4);
    }

    #[tokio::test]
    async fn test_inject_remembers_payload() {
        let surface = Arc::new(FakeSurface::new(&[IDLE]));
        let registry = registry(surface.clone());
        let h = surface.handle();

        assert_eq!(registry.inject_with_retry(&h, "hello").await.unwrap(), h);
        assert_eq!(registry.last_payload(&h).as_deref(), Some("hello"));
    }
}
