//! Worker environment self-check.
//!
//! Verifies the external tooling and configuration a worker needs before
//! it takes jobs: ffmpeg/ffprobe on PATH, model API keys present, store
//! and queue settings readable. Exits non-zero on the first problem.

use spotgen_adapters::Secrets;
use spotgen_media::{check_ffmpeg, check_ffprobe};
use spotgen_queue::QueueConfig;
use spotgen_worker::WorkerConfig;

fn main() {
    dotenvy::dotenv().ok();

    let mut failures = 0;

    match check_ffmpeg() {
        Ok(path) => println!("ok: ffmpeg at {}", path.display()),
        Err(e) => {
            eprintln!("FAIL: {e}");
            failures += 1;
        }
    }
    match check_ffprobe() {
        Ok(path) => println!("ok: ffprobe at {}", path.display()),
        Err(e) => {
            eprintln!("FAIL: {e}");
            failures += 1;
        }
    }

    match Secrets::from_env() {
        Ok(_) => println!("ok: model API keys present"),
        Err(e) => {
            eprintln!("FAIL: {e}");
            failures += 1;
        }
    }

    for var in [
        "GCP_PROJECT_ID",
        "R2_ENDPOINT_URL",
        "R2_ACCESS_KEY_ID",
        "R2_SECRET_ACCESS_KEY",
        "R2_BUCKET_NAME",
        "VIDEO_MODEL_VERSION",
        "MUSIC_MODEL_VERSION",
        "TTS_MODEL_VERSION",
    ] {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => println!("ok: {var} set"),
            _ => {
                eprintln!("FAIL: {var} not set");
                failures += 1;
            }
        }
    }

    let worker = WorkerConfig::from_env();
    println!(
        "ok: worker config (max_jobs={}, work_dir={})",
        worker.max_concurrent_jobs, worker.work_dir
    );

    let queue = QueueConfig::from_env();
    println!("ok: queue config (stream={})", queue.stream_name);

    if failures > 0 {
        eprintln!("{failures} check(s) failed");
        std::process::exit(1);
    }
    println!("all checks passed");
}
