use crate::app::models::DeviceSummary;
use crate::app::uistate::models::{PhoneState, ScreenBounds};

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let model = tokens
                .iter()
                .skip(2)
                .find_map(|token| token.strip_prefix("model:"))
                .map(str::to_string);
            Some(DeviceSummary {
                serial: tokens[0].to_string(),
                state: tokens[1].to_string(),
                model,
            })
        })
        .collect()
}

/// Finds `package/activity` on `mCurrentFocus` / `mFocusedApp` lines of `dumpsys window`.
/// When both are present the later line wins.
pub fn parse_focused_activity(output: &str) -> Option<(String, String)> {
    let mut found = None;
    for line in output.lines() {
        if !line.contains("mCurrentFocus") && !line.contains("mFocusedApp") {
            continue;
        }
        let component = line
            .split_whitespace()
            .filter(|part| part.contains('/') && part.contains('.'))
            .map(|part| part.trim_matches(|c: char| c == '{' || c == '}').trim())
            .find_map(|part| part.split_once('/'));
        if let Some((package, activity)) = component {
            if !package.is_empty() && !activity.is_empty() {
                found = Some((package.to_string(), activity.to_string()));
            }
        }
    }
    found
}

/// `com.example.app.MainActivity` and `.MainActivity` both become `MainActivity`.
pub fn simple_activity_name(activity: &str) -> String {
    activity
        .rsplit('.')
        .find(|segment| !segment.is_empty())
        .unwrap_or(activity)
        .to_string()
}

pub fn parse_ime_shown(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.contains("mInputShown=true") || line.contains("mShowRequested=true"))
}

pub fn build_phone_state(window_output: &str, ime_output: &str) -> PhoneState {
    let mut state = PhoneState {
        is_editable: parse_ime_shown(ime_output),
        ..PhoneState::default()
    };
    if let Some((package, activity)) = parse_focused_activity(window_output) {
        state.current_app = simple_activity_name(&activity);
        state.package_name = package;
    }
    state
}

/// Reads `Physical size: 1080x2400` (or `Override size:`) from `wm size`; first line wins.
pub fn parse_wm_size(output: &str) -> Option<ScreenBounds> {
    output
        .lines()
        .filter(|line| line.contains("Physical size:") || line.contains("Override size:"))
        .find_map(|line| {
            let (_, size) = line.rsplit_once(':')?;
            let (width, height) = size.trim().split_once('x')?;
            let width = width.trim().parse::<i32>().ok()?;
            let height = height.trim().parse::<i32>().ok()?;
            (width > 0 && height > 0).then_some(ScreenBounds { width, height })
        })
}
