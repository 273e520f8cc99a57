use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::app::adb::parse::parse_adb_devices;
use crate::app::adb::runner::{run_command, run_command_with_timeout};
use crate::app::config::AdbSettings;
use crate::app::error::AppError;
use crate::app::models::DeviceSummary;

/// Runs one shell command on a device and returns its text output.
///
/// Errors mean the device could not be reached; a command that ran and printed an
/// error message is still `Ok`, callers inspect the text.
pub trait ShellExecutor: Send + Sync {
    fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError>;
}

#[derive(Debug, Clone)]
pub struct AdbShell {
    program: String,
    serial: String,
    timeout: Duration,
}

impl AdbShell {
    pub fn new(program: impl Into<String>, serial: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            serial: serial.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &AdbSettings, serial: &str, trace_id: &str) -> Result<Self, AppError> {
        let program = resolve_adb_program(&settings.command_path);
        validate_adb_program(&program).map_err(|message| AppError::validation(message, trace_id))?;
        if serial.trim().is_empty() {
            return Err(AppError::validation("serial is required", trace_id));
        }
        Ok(Self::new(
            program,
            serial.trim(),
            Duration::from_secs(settings.command_timeout_secs),
        ))
    }
}

pub fn adb_shell_args(serial: &str, command: &str) -> Vec<String> {
    vec![
        "-s".to_string(),
        serial.to_string(),
        "shell".to_string(),
        command.to_string(),
    ]
}

impl ShellExecutor for AdbShell {
    fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError> {
        let args = adb_shell_args(&self.serial, command);
        let output = run_command_with_timeout(&self.program, &args, self.timeout, trace_id)?;
        debug!(
            trace_id = %trace_id,
            serial = %self.serial,
            command = %command,
            exit_code = ?output.exit_code,
            stdout_len = output.stdout.len(),
            "adb shell finished"
        );

        let stderr = output.stderr.trim();
        if output.stdout.trim().is_empty() {
            if !output.success() || stderr.starts_with("error:") {
                let detail = if stderr.is_empty() { "no output" } else { stderr };
                return Err(AppError::dependency(
                    format!("adb shell failed on {}: {detail}", self.serial),
                    trace_id,
                ));
            }
            // Some builds print tool diagnostics on stderr only.
            return Ok(output.stderr);
        }
        Ok(output.stdout)
    }
}

/// Strips wrapping quotes from a configured path; empty means `adb` from `PATH`.
pub fn resolve_adb_program(configured: &str) -> String {
    let trimmed = configured.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        "adb".to_string()
    } else {
        unquoted.to_string()
    }
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err(format!("ADB executable not found at {program}"));
    }
    Ok(())
}

pub fn list_devices(program: &str, trace_id: &str) -> Result<Vec<DeviceSummary>, AppError> {
    let args = vec!["devices".to_string(), "-l".to_string()];
    let output = run_command(program, &args, trace_id)?;
    if !output.success() {
        return Err(AppError::dependency(
            format!("adb devices failed: {}", output.stderr.trim()),
            trace_id,
        ));
    }
    Ok(parse_adb_devices(&output.stdout))
}

/// The serial of the only online device. Zero or several online devices is an error.
pub fn pick_single_device(program: &str, trace_id: &str) -> Result<String, AppError> {
    let online: Vec<DeviceSummary> = list_devices(program, trace_id)?
        .into_iter()
        .filter(DeviceSummary::is_online)
        .collect();
    match online.as_slice() {
        [] => Err(AppError::validation("No online adb devices found.", trace_id)),
        [only] => Ok(only.serial.clone()),
        many => {
            let serials = many
                .iter()
                .map(|device| device.serial.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(AppError::validation(
                format!("Multiple online devices found ({serials}). Set ANDROID_SERIAL or pass --serial."),
                trace_id,
            ))
        }
    }
}

/// Scripted stand-in for a device. Each command answers from its queue; the last answer
/// repeats. Unknown commands fail like an unreachable device.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::ShellExecutor;
    use crate::app::error::AppError;

    #[derive(Default)]
    pub struct FakeShell {
        responses: Mutex<HashMap<String, VecDeque<Result<String, AppError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeShell {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, command: &str, output: &str) -> Self {
            self.push(command, Ok(output.to_string()));
            self
        }

        pub fn fail(self, command: &str) -> Self {
            self.push(
                command,
                Err(AppError::dependency("device offline", "fake")),
            );
            self
        }

        fn push(&self, command: &str, answer: Result<String, AppError>) {
            self.responses
                .lock()
                .expect("responses lock")
                .entry(command.to_string())
                .or_default()
                .push_back(answer);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().expect("calls lock").clear();
        }
    }

    impl ShellExecutor for FakeShell {
        fn shell(&self, command: &str, trace_id: &str) -> Result<String, AppError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(command.to_string());
            let mut responses = self.responses.lock().expect("responses lock");
            let Some(queue) = responses.get_mut(command) else {
                return Err(AppError::dependency(
                    format!("no scripted answer for {command}"),
                    trace_id,
                ));
            };
            let answer = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            answer.unwrap_or_else(|| Err(AppError::dependency("empty script", trace_id)))
        }
    }
}
