use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use droid_uistate_lib::app::adb::shell::{pick_single_device, resolve_adb_program};
use droid_uistate_lib::app::config::load_config;
use droid_uistate_lib::app::error::resolve_trace_id;
use droid_uistate_lib::app::logging::init_logging;
use droid_uistate_lib::app::state::SessionRegistry;
use serde::Serialize;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    out_dir: Option<PathBuf>,
    duration_secs: u64,
    interval_ms: u64,
    json: bool,
}

#[derive(Serialize)]
struct SoakSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: String,
    adb_program: String,
    out_dir: String,
    iterations: usize,
    failures: usize,
    structured: usize,
    text: usize,
    max_duration_ms: u128,
    checks: Vec<SoakIteration>,
}

#[derive(Serialize)]
struct SoakIteration {
    index: usize,
    status: &'static str, // pass|fail
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'static str>,
    elements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut out_dir: Option<PathBuf> = None;
    let mut duration_secs: u64 = 60;
    let mut interval_ms: u64 = 500;
    let mut json = false;

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
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--duration-secs" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--duration-secs requires a value".to_string())?;
                duration_secs = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| "--duration-secs must be a number".to_string())?;
            }
            "--interval-ms" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--interval-ms requires a value".to_string())?;
                interval_ms = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| "--interval-ms must be a number".to_string())?;
            }
            "--json" => json = true,
            "-h" | "--help" => {
                return Err("Usage: cargo run --bin soak -- [--serial SERIAL] [--out DIR] [--duration-secs N] [--interval-ms N] [--json]\n".to_string());
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        out_dir,
        duration_secs: duration_secs.max(5),
        interval_ms: interval_ms.min(10_000),
        json,
    })
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
    let out_dir = args.out_dir.unwrap_or_else(|| {
        let mut p = std::env::temp_dir();
        p.push(format!("droid_uistate_soak_{trace_id}"));
        p
    });
    let _ = fs::create_dir_all(&out_dir);

    let config = match load_config(&trace_id) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);
    let adb_program = resolve_adb_program(&config.adb.command_path);
    let serial = match args.serial {
        Some(s) => s,
        None => match pick_single_device(&adb_program, &trace_id) {
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

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut iterations: Vec<SoakIteration> = Vec::new();
    let mut index = 0usize;
    while Instant::now() < deadline {
        index += 1;
        let iter_trace = format!("{trace_id}-{index}");
        let iter_start = Instant::now();
        let iteration = match session.refresh(&iter_trace) {
            Ok(snapshot) => SoakIteration {
                index,
                status: "pass",
                duration_ms: iter_start.elapsed().as_millis(),
                method: snapshot.method.map(|method| method.as_str()),
                elements: session.elements(&iter_trace).map(|e| e.len()).unwrap_or_default(),
                error: None,
            },
            Err(err) => SoakIteration {
                index,
                status: "fail",
                duration_ms: iter_start.elapsed().as_millis(),
                method: None,
                elements: 0,
                error: Some(err.to_string()),
            },
        };
        if !args.json {
            println!(
                "[{}] {} {}ms method={} elements={}",
                iteration.index,
                iteration.status,
                iteration.duration_ms,
                iteration.method.unwrap_or("none"),
                iteration.elements
            );
        }
        iterations.push(iteration);
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    // Save full details for later inspection.
    let details_path = out_dir.join("soak_iterations.json");
    let _ = fs::write(
        &details_path,
        serde_json::to_string_pretty(&iterations).unwrap_or_default(),
    );

    let failures = iterations.iter().filter(|i| i.status == "fail").count();
    let count_method = |name: &str| iterations.iter().filter(|i| i.method == Some(name)).count();
    let structured = count_method("structured-dump");
    let text = count_method("text-dump");
    let max_duration_ms = iterations.iter().map(|i| i.duration_ms).max().unwrap_or_default();

    let overall = if failures > 0 { "fail" } else { "pass" };
    let summary = SoakSummary {
        tool: "droid_uistate_soak",
        status: overall,
        trace_id,
        serial,
        adb_program,
        out_dir: out_dir.to_string_lossy().to_string(),
        iterations: iterations.len(),
        failures,
        structured,
        text,
        max_duration_ms,
        checks: iterations,
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
    } else {
        println!(
            "status: {}\niterations: {}\nfailures: {}\nstructured: {}\ntext: {}\nmax: {}ms\nout: {}\n",
            summary.status,
            summary.iterations,
            summary.failures,
            summary.structured,
            summary.text,
            summary.max_duration_ms,
            summary.out_dir
        );
    }

    if overall != "pass" {
        std::process::exit(1);
    }
}
