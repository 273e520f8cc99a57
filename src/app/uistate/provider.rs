use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{debug, info, warn};

use super::dumpsys_parser::DumpsysParser;
use super::models::{
    AccessibilityNode, AcquisitionMethod, DeviceContext, DeviceStateSnapshot, FilteringParams,
    PhoneState, ScreenBounds,
};
use super::xml_parser::XmlHierarchyParser;
use crate::app::adb::parse::{build_phone_state, parse_wm_size};
use crate::app::adb::shell::ShellExecutor;
use crate::app::config::{AcquisitionSettings, AppConfig};
use crate::app::error::AcquireError;

const AFFINITY_NONE: u8 = 0;
const AFFINITY_STRUCTURED: u8 = 1;
const AFFINITY_TEXT: u8 = 2;

const ERROR_MARKERS: [&str; 1] = ["ERROR"];
const IDLE_STATE_MARKER: &str = "could not get idle state";
/// uiautomator appends this after the XML; older builds misspell it.
const DUMP_NOTICES: [&str; 2] = ["UI hierchary dumped", "UI hierarchy dumped"];
const XML_MARKERS: [&str; 2] = ["<hierarchy", "<?xml"];
const XML_END: &str = "</hierarchy>";

/// Decides which dump to pull from a device and remembers which one worked.
///
/// One provider belongs to one device. Calls must be serialized by the owner
/// (see `DeviceSession`); `affinity` can be read at any time.
pub struct StateProvider {
    settings: AcquisitionSettings,
    filtering: FilteringParams,
    xml_parser: XmlHierarchyParser,
    dumpsys_parser: DumpsysParser,
    affinity: AtomicU8,
}

impl StateProvider {
    pub fn new(settings: AcquisitionSettings, filtering: FilteringParams) -> Self {
        Self {
            settings,
            filtering,
            xml_parser: XmlHierarchyParser::default(),
            dumpsys_parser: DumpsysParser::default(),
            affinity: AtomicU8::new(AFFINITY_NONE),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.acquisition.clone(),
            FilteringParams {
                min_element_size: config.filtering.min_element_size,
            },
        )
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    pub fn affinity(&self) -> Option<AcquisitionMethod> {
        match self.affinity.load(Ordering::Acquire) {
            AFFINITY_STRUCTURED => Some(AcquisitionMethod::StructuredDump),
            AFFINITY_TEXT => Some(AcquisitionMethod::TextDump),
            _ => None,
        }
    }

    pub fn reset_affinity(&self) {
        self.affinity.store(AFFINITY_NONE, Ordering::Release);
    }

    fn record_affinity(&self, method: AcquisitionMethod) {
        let value = match method {
            AcquisitionMethod::StructuredDump => AFFINITY_STRUCTURED,
            AcquisitionMethod::TextDump => AFFINITY_TEXT,
        };
        self.affinity.store(value, Ordering::Release);
    }

    /// Tries the remembered method first, then the other one once.
    /// With nothing remembered the structured dump goes first.
    pub fn acquire_tree(
        &self,
        shell: &dyn ShellExecutor,
        cancel: &AtomicBool,
        trace_id: &str,
    ) -> Result<(AccessibilityNode, AcquisitionMethod), AcquireError> {
        let preferred = self.affinity();
        let first = preferred.unwrap_or(AcquisitionMethod::StructuredDump);

        for method in [first, first.other()] {
            let tree = match method {
                AcquisitionMethod::StructuredDump => self.try_structured(shell, cancel, trace_id)?,
                AcquisitionMethod::TextDump => self.try_text(shell, cancel, trace_id)?,
            };
            let Some(root) = tree else {
                info!(
                    trace_id = %trace_id,
                    method = method.as_str(),
                    "acquisition method produced no tree"
                );
                continue;
            };
            if preferred != Some(method) {
                info!(
                    trace_id = %trace_id,
                    method = method.as_str(),
                    "remembering acquisition method"
                );
                self.record_affinity(method);
            }
            return Ok((root, method));
        }

        warn!(trace_id = %trace_id, "all acquisition methods failed");
        Err(AcquireError::AcquisitionExhausted)
    }

    fn try_structured(
        &self,
        shell: &dyn ShellExecutor,
        cancel: &AtomicBool,
        trace_id: &str,
    ) -> Result<Option<AccessibilityNode>, AcquireError> {
        for (variant, command) in self.settings.structured_commands.iter().enumerate() {
            check_cancel(cancel)?;
            let output = match shell.shell(command, trace_id) {
                Ok(output) => output,
                Err(err) => {
                    debug!(trace_id = %trace_id, command = %command, error = %err, "uiautomator variant failed");
                    continue;
                }
            };
            if has_dump_error(&output) {
                debug!(trace_id = %trace_id, command = %command, "uiautomator reported an error");
                continue;
            }
            let payload = strip_dump_notice(&output);
            if !XML_MARKERS.iter().any(|marker| payload.contains(marker)) {
                debug!(trace_id = %trace_id, command = %command, "uiautomator output has no xml");
                continue;
            }
            if let Some(root) = self.xml_parser.parse(payload) {
                debug!(trace_id = %trace_id, variant, nodes = root.node_count(), "uiautomator variant succeeded");
                return Ok(Some(root));
            }
        }
        Ok(None)
    }

    fn try_text(
        &self,
        shell: &dyn ShellExecutor,
        cancel: &AtomicBool,
        trace_id: &str,
    ) -> Result<Option<AccessibilityNode>, AcquireError> {
        check_cancel(cancel)?;
        let command = &self.settings.text_command;
        match shell.shell(command, trace_id) {
            Ok(output) => Ok(self.dumpsys_parser.parse(&output)),
            Err(err) => {
                warn!(trace_id = %trace_id, command = %command, error = %err, "dumpsys failed");
                Ok(None)
            }
        }
    }

    /// Full snapshot. A failed tree acquisition leaves `a11y_tree` empty; only
    /// cancellation is an error.
    pub fn acquire_state(
        &self,
        shell: &dyn ShellExecutor,
        cancel: &AtomicBool,
        trace_id: &str,
    ) -> Result<DeviceStateSnapshot, AcquireError> {
        let (a11y_tree, method) = match self.acquire_tree(shell, cancel, trace_id) {
            Ok((root, method)) => (Some(root), Some(method)),
            Err(AcquireError::AcquisitionExhausted) => (None, None),
            Err(err) => return Err(err),
        };
        check_cancel(cancel)?;
        let phone_state = self.phone_state(shell, trace_id);
        check_cancel(cancel)?;
        let screen_bounds = self.screen_bounds(shell, trace_id);

        Ok(DeviceStateSnapshot {
            a11y_tree,
            phone_state,
            device_context: DeviceContext {
                screen_bounds,
                filtering_params: self.filtering,
            },
            method,
            captured_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn phone_state(&self, shell: &dyn ShellExecutor, trace_id: &str) -> PhoneState {
        let outputs = shell
            .shell(&self.settings.window_command, trace_id)
            .and_then(|window| {
                shell
                    .shell(&self.settings.ime_command, trace_id)
                    .map(|ime| (window, ime))
            });
        match outputs {
            Ok((window, ime)) => build_phone_state(&window, &ime),
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "phone state unavailable");
                PhoneState {
                    error: Some(err.error),
                    ..PhoneState::default()
                }
            }
        }
    }

    pub fn screen_bounds(&self, shell: &dyn ShellExecutor, trace_id: &str) -> ScreenBounds {
        match shell.shell(&self.settings.screen_size_command, trace_id) {
            Ok(output) => parse_wm_size(&output).unwrap_or_else(|| {
                debug!(trace_id = %trace_id, "unrecognised wm size output; using default");
                ScreenBounds::default()
            }),
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "screen size unavailable");
                ScreenBounds::default()
            }
        }
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), AcquireError> {
    if cancel.load(Ordering::Acquire) {
        Err(AcquireError::Cancelled)
    } else {
        Ok(())
    }
}

/// Looks for uiautomator's own diagnostics. Only text around the XML payload counts, so
/// node attributes such as `text="ERROR 404"` do not reject a good dump.
fn has_dump_error(output: &str) -> bool {
    let (before, after) = split_around_payload(output);
    [before, after].iter().any(|part| {
        part.lines().any(|line| {
            let line = line.trim_start();
            ERROR_MARKERS.iter().any(|marker| line.starts_with(marker))
        }) || part.to_lowercase().contains(IDLE_STATE_MARKER)
    })
}

/// Text before the first XML marker and after the closing tag. Without a closing tag the
/// payload runs to the end.
fn split_around_payload(output: &str) -> (&str, &str) {
    let Some(start) = XML_MARKERS.iter().filter_map(|marker| output.find(marker)).min() else {
        return (output, "");
    };
    let end = output
        .rfind(XML_END)
        .map(|idx| idx + XML_END.len())
        .filter(|end| *end >= start)
        .unwrap_or(output.len());
    (&output[..start], &output[end..])
}

fn strip_dump_notice(output: &str) -> &str {
    DUMP_NOTICES
        .iter()
        .find_map(|notice| output.find(notice))
        .map(|idx| output[..idx].trim())
        .unwrap_or(output)
}
