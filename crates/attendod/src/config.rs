use std::path::PathBuf;

/// Kiosk daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base URL of the academy backend.
    pub backend_url: String,
    /// Bearer token for backend requests, if the deployment requires one.
    pub api_token: Option<String>,
    /// Euclidean distance threshold for a known identity (lower = stricter).
    pub match_threshold: f32,
    /// Cooldown window in seconds between attendance attempts per identity.
    pub cooldown_secs: u64,
    /// Detection loop sampling period in milliseconds.
    pub tick_interval_ms: u64,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `ATTENDO_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ATTENDO_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| attendo_core::default_model_dir());

        Self {
            camera_device: std::env::var("ATTENDO_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            backend_url: std::env::var("ATTENDO_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_token: std::env::var("ATTENDO_API_TOKEN").ok(),
            match_threshold: env_f32("ATTENDO_MATCH_THRESHOLD", 1.1),
            cooldown_secs: env_u64("ATTENDO_COOLDOWN_SECS", 10),
            tick_interval_ms: env_u64("ATTENDO_TICK_INTERVAL_MS", 200),
            warmup_frames: env_usize("ATTENDO_WARMUP_FRAMES", 4),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("face_detector.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("face_embedder.onnx")
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
