use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::app::adb::shell::{AdbShell, ShellExecutor};
use crate::app::config::AppConfig;
use crate::app::error::{AcquireError, AppError};
use crate::app::uistate::index::index_tree;
use crate::app::uistate::models::{AcquisitionMethod, DeviceStateSnapshot, IndexedElement};
use crate::app::uistate::provider::StateProvider;
use crate::app::uistate::tap::resolve_tap_point;

const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Everything tied to one device: its transport, its provider (and so its method
/// affinity), and the elements from the last successful refresh.
pub struct DeviceSession {
    serial: String,
    shell: Arc<dyn ShellExecutor>,
    provider: StateProvider,
    gate: Mutex<()>,
    elements: RwLock<Vec<IndexedElement>>,
    cancel: AtomicBool,
    /// Bumped by every cancel, so callers still queued on `gate` see it too.
    cancel_generation: AtomicU64,
}

impl DeviceSession {
    pub fn new(serial: impl Into<String>, shell: Arc<dyn ShellExecutor>, provider: StateProvider) -> Self {
        Self {
            serial: serial.into(),
            shell,
            provider,
            gate: Mutex::new(()),
            elements: RwLock::new(Vec::new()),
            cancel: AtomicBool::new(false),
            cancel_generation: AtomicU64::new(0),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn affinity(&self) -> Option<AcquisitionMethod> {
        self.provider.affinity()
    }

    /// Asks the refresh currently running, and any refresh waiting for its turn, to stop.
    pub fn cancel_refresh(&self) {
        self.cancel_generation.fetch_add(1, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Acquires a fresh snapshot, retrying with a fixed delay. Refreshes of one device
    /// never overlap; a second caller waits for the first to finish.
    ///
    /// On success the element cache is replaced; when every attempt fails it is cleared.
    pub fn refresh(&self, trace_id: &str) -> Result<DeviceStateSnapshot, AppError> {
        let generation = self.cancel_generation.load(Ordering::SeqCst);
        let _guard = self
            .gate
            .lock()
            .map_err(|_| AppError::system("Device session locked", trace_id))?;
        // Drop a flag left by a cancel that had nothing to stop, then look for one aimed at us.
        self.cancel.store(false, Ordering::SeqCst);
        if self.cancel_generation.load(Ordering::SeqCst) != generation {
            info!(trace_id = %trace_id, serial = %self.serial, "refresh cancelled while queued");
            return Err(AcquireError::Cancelled.into_app_error(trace_id));
        }

        let settings = self.provider.settings();
        let max_attempts = settings.max_attempts.max(1);
        let delay = Duration::from_millis(settings.retry_delay_ms);

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            match self
                .provider
                .acquire_state(self.shell.as_ref(), &self.cancel, trace_id)
            {
                Ok(snapshot) => {
                    if let Some(root) = snapshot.a11y_tree.as_ref() {
                        let elements = index_tree(root, &snapshot.device_context.filtering_params);
                        info!(
                            trace_id = %trace_id,
                            serial = %self.serial,
                            attempt,
                            elements = elements.len(),
                            method = snapshot.method.map(|method| method.as_str()).unwrap_or("none"),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "ui state refreshed"
                        );
                        self.replace_elements(elements, trace_id)?;
                        return Ok(snapshot);
                    }
                    warn!(
                        trace_id = %trace_id,
                        serial = %self.serial,
                        attempt,
                        max_attempts,
                        "no ui tree acquired"
                    );
                }
                Err(AcquireError::Cancelled) => {
                    info!(trace_id = %trace_id, serial = %self.serial, attempt, "refresh cancelled");
                    return Err(AcquireError::Cancelled.into_app_error(trace_id));
                }
                Err(err) => {
                    warn!(trace_id = %trace_id, serial = %self.serial, attempt, error = %err, "acquisition failed");
                }
            }

            if attempt < max_attempts && self.wait_or_cancelled(delay) {
                info!(trace_id = %trace_id, serial = %self.serial, attempt, "refresh cancelled during backoff");
                return Err(AcquireError::Cancelled.into_app_error(trace_id));
            }
        }

        self.replace_elements(Vec::new(), trace_id)?;
        Err(AcquireError::AcquisitionExhausted.into_app_error(trace_id))
    }

    /// Returns true if cancellation was requested before `delay` elapsed.
    fn wait_or_cancelled(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.load(Ordering::Acquire) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }

    fn replace_elements(&self, elements: Vec<IndexedElement>, trace_id: &str) -> Result<(), AppError> {
        let mut cache = self
            .elements
            .write()
            .map_err(|_| AppError::system("Element cache locked", trace_id))?;
        *cache = elements;
        Ok(())
    }

    pub fn elements(&self, trace_id: &str) -> Result<Vec<IndexedElement>, AppError> {
        self.elements
            .read()
            .map(|cache| cache.clone())
            .map_err(|_| AppError::system("Element cache locked", trace_id))
    }

    /// Resolves against the elements of the last successful refresh.
    pub fn tap_point(&self, index: usize, trace_id: &str) -> Result<(i32, i32), AppError> {
        let cache = self
            .elements
            .read()
            .map_err(|_| AppError::system("Element cache locked", trace_id))?;
        resolve_tap_point(&cache, index).map_err(|err| err.into_app_error(trace_id))
    }

    pub fn tap(&self, index: usize, trace_id: &str) -> Result<(i32, i32), AppError> {
        let (x, y) = self.tap_point(index, trace_id)?;
        self.shell.shell(&format!("input tap {x} {y}"), trace_id)?;
        info!(trace_id = %trace_id, serial = %self.serial, index, x, y, "tapped element");
        Ok((x, y))
    }
}

/// One session per device serial, created on first use.
pub struct SessionRegistry {
    config: AppConfig,
    sessions: Mutex<HashMap<String, Arc<DeviceSession>>>,
}

impl SessionRegistry {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `serial`, opening an adb transport if there is none yet.
    pub fn session(&self, serial: &str, trace_id: &str) -> Result<Arc<DeviceSession>, AppError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|_| AppError::system("Session registry locked", trace_id))?;
        if let Some(session) = guard.get(serial) {
            return Ok(Arc::clone(session));
        }
        let shell = AdbShell::from_settings(&self.config.adb, serial, trace_id)?;
        let session = Arc::new(DeviceSession::new(
            serial,
            Arc::new(shell),
            StateProvider::from_config(&self.config),
        ));
        guard.insert(serial.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Registers a session over a caller-provided transport, replacing any existing one.
    pub fn attach(
        &self,
        serial: &str,
        shell: Arc<dyn ShellExecutor>,
        trace_id: &str,
    ) -> Result<Arc<DeviceSession>, AppError> {
        let session = Arc::new(DeviceSession::new(
            serial,
            shell,
            StateProvider::from_config(&self.config),
        ));
        self.sessions
            .lock()
            .map_err(|_| AppError::system("Session registry locked", trace_id))?
            .insert(serial.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub fn remove(&self, serial: &str, trace_id: &str) -> Result<Option<Arc<DeviceSession>>, AppError> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| AppError::system("Session registry locked", trace_id))?
            .remove(serial);
        if let Some(session) = removed.as_ref() {
            session.cancel_refresh();
        }
        Ok(removed)
    }

    pub fn serials(&self, trace_id: &str) -> Result<Vec<String>, AppError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|_| AppError::system("Session registry locked", trace_id))?;
        let mut serials: Vec<String> = guard.keys().cloned().collect();
        serials.sort();
        Ok(serials)
    }
}
