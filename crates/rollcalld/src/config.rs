use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Path to the enrolled-face roster JSON.
    pub roster_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Startup attempts before giving up on the camera.
    pub camera_retries: usize,
    /// Maximum embedding distance for a positive identity match.
    pub match_tolerance: f32,
    /// Analyze every Nth captured frame (throughput control only).
    pub frame_stride: u64,
    /// Frames to discard at startup for camera AGC/AE stabilization.
    pub warmup_frames: usize,
    /// Path to the report recipients TOML file.
    pub recipients_path: PathBuf,
    /// Pause between processed frames to keep CPU usage down.
    pub loop_pause: Duration,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));
        let roster_path = std::env::var("ROLLCALL_ROSTER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("roster.json"));
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));
        let recipients_path = std::env::var("ROLLCALL_RECIPIENTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("recipients.toml"));

        Self {
            db_path,
            roster_path,
            model_dir,
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_retries: env_usize("ROLLCALL_CAMERA_RETRIES", 3),
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 0.5),
            frame_stride: env_u64("ROLLCALL_FRAME_STRIDE", 3).max(1),
            warmup_frames: env_usize("ROLLCALL_WARMUP_FRAMES", 4),
            recipients_path,
            loop_pause: Duration::from_millis(env_u64("ROLLCALL_LOOP_PAUSE_MS", 100)),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("detector.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("embedder.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
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
