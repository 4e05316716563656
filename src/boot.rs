use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process;

use crate::config::BlogConfig;

/// Run boot checks before Rocket launches: make sure the database directory
/// exists and is writable, and warn about an empty counted-path list.
/// Aborts the process if the database cannot be written.
pub fn run(config: &BlogConfig) {
    info!("Quillpost boot check starting...");

    let mut warnings = 0u32;
    let mut errors = 0u32;

    // ── 1. Database directory ──────────────────────────
    let db_dir = Path::new(&config.database_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = db_dir {
        if !dir.exists() {
            match fs::create_dir_all(dir) {
                Ok(_) => info!("  Created directory: {}", dir.display()),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir.display(), e);
                    errors += 1;
                }
            }
        }

        if dir.exists() {
            let test_file = dir.join(".write_test");
            match fs::write(&test_file, "test") {
                Ok(_) => {
                    let _ = fs::remove_file(&test_file);
                }
                Err(e) => {
                    error!("  Database directory not writable: {}", e);
                    errors += 1;
                }
            }
        }
    }

    // ── 2. View counting ───────────────────────────────
    if config.counted_paths.is_empty() {
        warn!("  No counted paths configured, only /blog/<slug> views will be recorded");
        warnings += 1;
    }

    // ── 3. Bootstrap admin ─────────────────────────────
    if config.admin_password.as_deref().is_some_and(|p| p.len() < 8) {
        warn!("  Bootstrap admin password is shorter than 8 characters");
        warnings += 1;
    }

    // ── 4. Rocket.toml exists ──────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found, using default config");
        warnings += 1;
    }

    // ── Summary ────────────────────────────────────────
    if errors > 0 {
        error!("Boot check FAILED: {} error(s), {} warning(s). Aborting.", errors, warnings);
        process::exit(1);
    }

    if warnings > 0 {
        warn!("Boot check passed with {} warning(s).", warnings);
    } else {
        info!("Boot check passed.");
    }
}
