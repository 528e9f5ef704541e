use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Face detection confidence threshold.
    pub confidence_threshold: f32,
    /// Optional TOML file overriding the builtin rating threshold tables.
    pub thresholds_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACEGRADE_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGRADE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        Self {
            model_dir,
            confidence_threshold: env_f32(
                "FACEGRADE_CONFIDENCE_THRESHOLD",
                facegrade_core::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            thresholds_path: std::env::var("FACEGRADE_THRESHOLDS").ok().map(PathBuf::from),
        }
    }

    /// Path to the SSD face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("res10_300x300_ssd.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to an embedding model, by model name.
    pub fn embedding_model_path(&self, model: &str) -> String {
        self.model_dir
            .join(format!("{}.onnx", model.to_lowercase()))
            .to_string_lossy()
            .into_owned()
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegrade/models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
