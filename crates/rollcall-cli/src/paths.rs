use std::path::PathBuf;

/// Data locations shared with the daemon, resolved from the same
/// `ROLLCALL_*` environment variables and XDG defaults.
pub struct Paths {
    pub db_path: PathBuf,
    pub roster_path: PathBuf,
    pub model_dir: PathBuf,
    pub faces_dir: PathBuf,
    pub camera_device: String,
}

impl Paths {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            db_path: std::env::var("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("attendance.db")),
            roster_path: std::env::var("ROLLCALL_ROSTER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("roster.json")),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("models")),
            faces_dir: std::env::var("ROLLCALL_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("known_faces")),
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
        }
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("detector.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("embedder.onnx")
            .to_string_lossy()
            .into_owned()
    }
}
