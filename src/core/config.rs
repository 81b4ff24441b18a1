use crate::core::errors::ConfigError;
use crate::core::types::FontSelection;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    pub max_upload_bytes: usize,
}

/// Detection and OCR model configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub detector_model_path: PathBuf,
    pub ocr_model_dir: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub target_size: u32,
    /// Number of ONNX sessions per model (controls inference parallelism)
    pub onnx_pool_size: usize,
}

/// Translation backend configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub source_language: String,
    pub target_language: String,
    pub timeout: Duration,
    pub cache_entries: usize,
    pub hf_api_token: Option<String>,
    pub hf_model: String,
    pub baidu_app_id: Option<String>,
    pub baidu_secret_key: Option<String>,
    pub bing_key: Option<String>,
    pub bing_region: Option<String>,
}

/// Font asset configuration
#[derive(Debug, Clone)]
pub struct FontConfig {
    pub fonts_dir: PathBuf,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub translation: TranslationConfig,
    pub fonts: FontConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn env_secret(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT", 5000),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 32 * 1024 * 1024),
            },
            models: ModelConfig {
                detector_model_path: env::var("DETECTOR_MODEL_PATH")
                    .unwrap_or_else(|_| "models/detector.onnx".to_string())
                    .into(),
                ocr_model_dir: env::var("OCR_MODEL_DIR")
                    .unwrap_or_else(|_| "models/ocr".to_string())
                    .into(),
                confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", 0.25),
                iou_threshold: env_parse("IOU_THRESHOLD", 0.7),
                target_size: env_parse("TARGET_SIZE", 640),
                onnx_pool_size: env_parse("ONNX_POOL_SIZE", (num_cpus::get() / 2).max(1)),
            },
            translation: TranslationConfig {
                source_language: env::var("SOURCE_LANGUAGE").unwrap_or_else(|_| "ja".to_string()),
                target_language: env::var("TARGET_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
                timeout: Duration::from_secs(env_parse("TRANSLATION_TIMEOUT_SECONDS", 30)),
                cache_entries: env_parse("TRANSLATION_CACHE_ENTRIES", 4096),
                hf_api_token: env_secret("HF_API_TOKEN"),
                hf_model: env::var("HF_TRANSLATION_MODEL")
                    .unwrap_or_else(|_| "Helsinki-NLP/opus-mt-ja-en".to_string()),
                baidu_app_id: env_secret("BAIDU_APP_ID"),
                baidu_secret_key: env_secret("BAIDU_SECRET_KEY"),
                bing_key: env_secret("BING_TRANSLATOR_KEY"),
                bing_region: env_secret("BING_TRANSLATOR_REGION"),
            },
            fonts: FontConfig {
                fonts_dir: env::var("FONTS_DIR").unwrap_or_else(|_| "fonts".to_string()).into(),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.models.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.models.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.models.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(self.models.iou_threshold));
        }

        if !(320..=2048).contains(&self.models.target_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "target_size must be between 320 and 2048, got {}",
                self.models.target_size
            )));
        }

        if self.models.onnx_pool_size == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "onnx_pool_size must be > 0".to_string(),
            ));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "max_upload_bytes must be > 0".to_string(),
            ));
        }

        if self.translation.timeout.is_zero() {
            return Err(ConfigError::InvalidTranslationConfig(
                "translation timeout must be > 0 seconds".to_string(),
            ));
        }

        Ok(())
    }

    /// File path of a selectable font
    pub fn font_path(&self, font: FontSelection) -> PathBuf {
        self.fonts.fonts_dir.join(font.file_name())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_bytes
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.models.confidence_threshold
    }

    pub fn iou_threshold(&self) -> f32 {
        self.models.iou_threshold
    }

    pub fn target_size(&self) -> u32 {
        self.models.target_size
    }

    pub fn onnx_pool_size(&self) -> usize {
        self.models.onnx_pool_size
    }
}

impl Default for Config {
    /// Built-in defaults without reading the environment; used by tests
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                host: "127.0.0.1".to_string(),
                log_level: Level::INFO,
                max_upload_bytes: 32 * 1024 * 1024,
            },
            models: ModelConfig {
                detector_model_path: "models/detector.onnx".into(),
                ocr_model_dir: "models/ocr".into(),
                confidence_threshold: 0.25,
                iou_threshold: 0.7,
                target_size: 640,
                onnx_pool_size: 1,
            },
            translation: TranslationConfig {
                source_language: "ja".to_string(),
                target_language: "en".to_string(),
                timeout: Duration::from_secs(30),
                cache_entries: 4096,
                hf_api_token: None,
                hf_model: "Helsinki-NLP/opus-mt-ja-en".to_string(),
                baidu_app_id: None,
                baidu_secret_key: None,
                bing_key: None,
                bing_region: None,
            },
            fonts: FontConfig {
                fonts_dir: "fonts".into(),
            },
        }
    }
}
