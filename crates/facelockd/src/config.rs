use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory an external capture process drops grayscale frames into.
    pub spool_dir: PathBuf,
    /// Fused distance threshold for a positive match.
    pub match_threshold: f64,
    /// Number of accepted samples per enrollment.
    pub samples_per_enroll: usize,
    /// Maximum frames consumed before an enrollment attempt gives up.
    pub max_enroll_frames: usize,
    /// Maximum frames consumed before a verify attempt gives up.
    pub max_verify_frames: usize,
    /// Poll interval while waiting for a spooled frame, in milliseconds.
    pub frame_poll_ms: u64,
    /// Total time to wait for any single frame, in milliseconds.
    pub frame_timeout_ms: u64,
    /// Whether to register on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load configuration from `FACELOCK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facelock");

        let db_path = std::env::var("FACELOCK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facelock.db"));

        let spool_dir = std::env::var("FACELOCK_SPOOL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("spool"));

        Self {
            db_path,
            spool_dir,
            match_threshold: env_f64(
                "FACELOCK_MATCH_THRESHOLD",
                facelock_core::DEFAULT_THRESHOLD,
            ),
            samples_per_enroll: env_usize("FACELOCK_SAMPLES_PER_ENROLL", 5),
            max_enroll_frames: env_usize("FACELOCK_MAX_ENROLL_FRAMES", 40),
            max_verify_frames: env_usize("FACELOCK_MAX_VERIFY_FRAMES", 5),
            frame_poll_ms: env_u64("FACELOCK_FRAME_POLL_MS", 50),
            frame_timeout_ms: env_u64("FACELOCK_FRAME_TIMEOUT_MS", 5000),
            system_bus: std::env::var("FACELOCK_SYSTEM_BUS")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
