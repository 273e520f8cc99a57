use std::path::PathBuf;
use std::time::Instant;

use droid_uistate_lib::app::adb::shell::{pick_single_device, resolve_adb_program};
use droid_uistate_lib::app::config::{
    backup_path_for, load_config, load_config_from_path, save_config, save_config_to_path, AppConfig,
};
use droid_uistate_lib::app::error::{resolve_trace_id, AppError};
use droid_uistate_lib::app::logging::init_logging;
use droid_uistate_lib::app::state::SessionRegistry;
use droid_uistate_lib::app::uistate::models::{DeviceStateSnapshot, IndexedElement};
use serde::Serialize;
use tracing::info;

const USAGE: &str = "Usage: droid_uistate [--serial SERIAL] [--config PATH] [--write-config] [--json] [--elements] [--resolve N | --tap N]\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapAction {
    Resolve(usize),
    Tap(usize),
}

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    config_path: Option<PathBuf>,
    write_config: bool,
    json: bool,
    elements: bool,
    action: Option<TapAction>,
}

#[derive(Serialize)]
struct Summary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: String,
    duration_ms: u128,
    method: Option<&'static str>,
    affinity: Option<&'static str>,
    element_count: usize,
    current_app: String,
    package_name: String,
    is_editable: bool,
    screen: (i32, i32),
    captured_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tap: Option<TapSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elements: Option<Vec<IndexedElement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<AppError>,
}

#[derive(Serialize)]
struct TapSummary {
    index: usize,
    tapped: bool,
    x: i32,
    y: i32,
}

fn parse_index(flag: &str, value: Option<String>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("{flag} must be a positive number"))
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut config_path: Option<PathBuf> = None;
    let mut write_config = false;
    let mut json = false;
    let mut elements = false;
    let mut action: Option<TapAction> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--write-config" => write_config = true,
            "--json" => json = true,
            "--elements" => elements = true,
            "--resolve" => action = Some(TapAction::Resolve(parse_index("--resolve", it.next())?)),
            "--tap" => action = Some(TapAction::Tap(parse_index("--tap", it.next())?)),
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("Unknown arg: {other}\n{USAGE}")),
        }
    }

    Ok(Args {
        serial,
        config_path,
        write_config,
        json,
        elements,
        action,
    })
}

/// Writes the effective config back, keeping the previous file as a backup.
fn write_config(config: &AppConfig, path: Option<&PathBuf>, trace_id: &str) -> Result<(), AppError> {
    match path {
        Some(path) => save_config_to_path(config, path, &backup_path_for(path), trace_id),
        None => save_config(config, trace_id),
    }
}

fn print_text(summary: &Summary) {
    println!("status: {}", summary.status);
    println!("serial: {}", summary.serial);
    println!("method: {}", summary.method.unwrap_or("none"));
    println!("preferred: {}", summary.affinity.unwrap_or("none"));
    println!("elements: {}", summary.element_count);
    println!("app: {} ({})", summary.current_app, summary.package_name);
    println!("keyboard: {}", if summary.is_editable { "shown" } else { "hidden" });
    println!("screen: {}x{}", summary.screen.0, summary.screen.1);
    if let Some(elements) = &summary.elements {
        for element in elements {
            println!(
                "  [{}] {} {:?} {}",
                element.index,
                element.class_name,
                element.text,
                element.bounds.as_deref().unwrap_or("-")
            );
        }
    }
    if let Some(tap) = &summary.tap {
        let verb = if tap.tapped { "tapped" } else { "resolved" };
        println!("{verb} [{}] at ({}, {})", tap.index, tap.x, tap.y);
    }
    if let Some(err) = &summary.error {
        println!("error: {err}");
    }
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = resolve_trace_id(None);
    let loaded = match &args.config_path {
        Some(path) => load_config_from_path(path, &trace_id),
        None => load_config(&trace_id),
    };
    let config = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);

    if args.write_config {
        if let Err(err) = write_config(&config, args.config_path.as_ref(), &trace_id) {
            eprintln!("Failed to write config: {err}");
            std::process::exit(1);
        }
        info!(trace_id = %trace_id, "config written");
    }

    let serial = match args.serial.clone() {
        Some(s) => s,
        None => match pick_single_device(&resolve_adb_program(&config.adb.command_path), &trace_id) {
            Ok(s) => s,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
    };

    let registry = SessionRegistry::new(config);
    let session = match registry.session(&serial, &trace_id) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let (snapshot, mut error) = match session.refresh(&trace_id) {
        Ok(snapshot) => (Some(snapshot), None),
        Err(err) => (None, Some(err)),
    };

    let mut tap = None;
    if let (Some(action), None) = (args.action, error.as_ref()) {
        let result = match action {
            TapAction::Resolve(index) => session.tap_point(index, &trace_id).map(|p| (index, false, p)),
            TapAction::Tap(index) => session.tap(index, &trace_id).map(|p| (index, true, p)),
        };
        match result {
            Ok((index, tapped, (x, y))) => tap = Some(TapSummary { index, tapped, x, y }),
            Err(err) => error = Some(err),
        }
    }

    let elements = session.elements(&trace_id).unwrap_or_default();
    let snapshot = snapshot.unwrap_or_else(|| DeviceStateSnapshot {
        a11y_tree: None,
        phone_state: Default::default(),
        device_context: Default::default(),
        method: None,
        captured_at: chrono::Utc::now().to_rfc3339(),
    });
    let summary = Summary {
        tool: "droid_uistate",
        status: if error.is_some() { "fail" } else { "pass" },
        trace_id,
        serial: session.serial().to_string(),
        duration_ms: started.elapsed().as_millis(),
        method: snapshot.method.map(|method| method.as_str()),
        affinity: session.affinity().map(|method| method.as_str()),
        element_count: elements.len(),
        current_app: snapshot.phone_state.current_app,
        package_name: snapshot.phone_state.package_name,
        is_editable: snapshot.phone_state.is_editable,
        screen: (
            snapshot.device_context.screen_bounds.width,
            snapshot.device_context.screen_bounds.height,
        ),
        captured_at: snapshot.captured_at,
        tap,
        elements: args.elements.then_some(elements),
        error,
    };
    info!(trace_id = %summary.trace_id, status = summary.status, "droid_uistate finished");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
    } else {
        print_text(&summary);
    }

    if summary.status != "pass" {
        std::process::exit(1);
    }
}
