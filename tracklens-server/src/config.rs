//! Server configuration
//!
//! Command-line flags (each with an environment fallback) override the TOML
//! file, which overrides the defaults below. Relative paths in `[paths]` are
//! resolved against the root folder.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracklens_common::config::{
    load_toml_config, locate_config_file, resolve_root_folder, resolve_under, LoggingConfig,
    ROOT_FOLDER_ENV,
};
use tracklens_common::Error;

use crate::classifier::{ClassifierSettings, OutputActivation};
use crate::embedding::EmbeddingSettings;
use crate::search::DEFAULT_CATALOG_NAME;

/// Command-line arguments for tracklens-server
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "tracklens-server")]
#[command(about = "Audio classification and similarity search API")]
#[command(version)]
pub struct Args {
    /// Root folder holding models, catalog files and uploads
    /// (falls back to TRACKLENS_ROOT_FOLDER)
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// TOML config file (falls back to TRACKLENS_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "TRACKLENS_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TRACKLENS_PORT")]
    pub port: Option<u16>,

    /// Log level or filter directive
    #[arg(long, env = "TRACKLENS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Run models on the GPU when built with CUDA support
    #[arg(long)]
    pub gpu: bool,
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// `[paths]` section; relative entries live under the root folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub uploads: PathBuf,
    pub classifier_model: PathBuf,
    pub embedding_model: PathBuf,
    pub embeddings: PathBuf,
    pub metadata: PathBuf,
    pub songs_index: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads: PathBuf::from("uploads"),
            classifier_model: PathBuf::from("models/audio_cnn.onnx"),
            embedding_model: PathBuf::from("models/openl3_mel128_music_512.onnx"),
            embeddings: PathBuf::from("embeddings/gtzan_real_X_pooled.npy"),
            metadata: PathBuf::from("csv/gtzan_real_meta.csv"),
            songs_index: PathBuf::from("csv/GTZANindex.txt"),
        }
    }
}

impl PathsConfig {
    fn under(&self, root: &Path) -> Self {
        Self {
            uploads: resolve_under(root, &self.uploads),
            classifier_model: resolve_under(root, &self.classifier_model),
            embedding_model: resolve_under(root, &self.embedding_model),
            embeddings: resolve_under(root, &self.embeddings),
            metadata: resolve_under(root, &self.metadata),
            songs_index: resolve_under(root, &self.songs_index),
        }
    }
}

/// `[search]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Rate clips are normalized to before embedding
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub hop_size: f64,
    pub center: bool,
    pub batch_size: usize,
    pub embedding_dim: usize,
    /// Rate the embedding model consumes
    pub model_sample_rate: u32,
    pub window_secs: f64,
    /// Album name reported for catalog matches
    pub catalog_name: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            duration_secs: 30.0,
            hop_size: 0.1,
            center: true,
            batch_size: 32,
            embedding_dim: 512,
            model_sample_rate: 48000,
            window_secs: 1.0,
            catalog_name: DEFAULT_CATALOG_NAME.to_string(),
        }
    }
}

impl SearchConfig {
    pub fn embedding_settings(&self) -> EmbeddingSettings {
        EmbeddingSettings {
            hop_size: self.hop_size,
            center: self.center,
            batch_size: self.batch_size,
            embedding_dim: self.embedding_dim,
        }
    }
}

/// `[classifier]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub sample_rate: u32,
    pub max_ms: u32,
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub output_activation: OutputActivation,
    pub threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let settings = ClassifierSettings::default();
        Self {
            sample_rate: settings.sample_rate,
            max_ms: settings.max_ms,
            n_mels: settings.n_mels,
            n_fft: settings.n_fft,
            hop_length: settings.hop_length,
            output_activation: settings.activation,
            threshold: settings.threshold,
        }
    }
}

impl ClassifierConfig {
    pub fn settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            sample_rate: self.sample_rate,
            max_ms: self.max_ms,
            n_mels: self.n_mels,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            activation: self.output_activation,
            threshold: self.threshold,
        }
    }
}

/// `[device]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub prefer_gpu: bool,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            prefer_gpu: false,
            intra_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Contents of the TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub root_folder: Option<PathBuf>,
    pub server: ServerSection,
    pub paths: PathsConfig,
    pub search: SearchConfig,
    pub classifier: ClassifierConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    /// Config file the settings came from, if any
    pub config_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Absolute paths
    pub paths: PathsConfig,
    pub search: SearchConfig,
    pub classifier: ClassifierConfig,
    pub device: DeviceConfig,
    pub log_level: String,
}

impl ServerConfig {
    /// Locate and read the config file, then layer `args` over it.
    pub fn load(args: &Args) -> tracklens_common::Result<Self> {
        let config_file = locate_config_file(args.config.as_deref())?;
        let file = match &config_file {
            Some(path) => load_toml_config(path)?,
            None => FileConfig::default(),
        };
        let mut config = Self::resolve(args, file);
        config.config_file = config_file;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the audio front-ends cannot run with.
    pub fn validate(&self) -> tracklens_common::Result<()> {
        let search = &self.search;
        let classifier = &self.classifier;

        let checks = [
            ("search.sample_rate", search.sample_rate > 0),
            ("search.duration_secs", positive(search.duration_secs)),
            ("search.hop_size", positive(search.hop_size)),
            ("search.batch_size", search.batch_size > 0),
            ("search.embedding_dim", search.embedding_dim > 0),
            ("search.model_sample_rate", search.model_sample_rate > 0),
            ("search.window_secs", positive(search.window_secs)),
            ("classifier.sample_rate", classifier.sample_rate > 0),
            ("classifier.max_ms", classifier.max_ms > 0),
            ("classifier.n_mels", classifier.n_mels > 0),
            ("classifier.n_fft", classifier.n_fft > 0),
            ("classifier.hop_length", classifier.hop_length > 0),
        ];

        match checks.iter().find(|(_, ok)| !ok) {
            Some((key, _)) => Err(Error::Config(format!("{} must be positive", key))),
            None => Ok(()),
        }
    }

    /// Layer command-line arguments over an already-loaded file config.
    pub fn resolve(args: &Args, file: FileConfig) -> Self {
        let root_folder = resolve_root_folder(
            args.root_folder.as_deref(),
            ROOT_FOLDER_ENV,
            file.root_folder.as_deref(),
        );

        let mut device = file.device;
        device.prefer_gpu |= args.gpu;

        Self {
            paths: file.paths.under(&root_folder),
            root_folder,
            config_file: None,
            host: args.host.clone().unwrap_or(file.server.host),
            port: args.port.unwrap_or(file.server.port),
            max_upload_bytes: file.server.max_upload_bytes,
            search: file.search,
            classifier: file.classifier,
            device,
            log_level: args.log_level.clone().unwrap_or(file.logging.level),
        }
    }

    /// Socket address to bind, or `None` if `host` is not an IP address
    pub fn bind_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().ok()
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
