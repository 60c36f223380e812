//! App state builders with in-process model doubles

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use ndarray::{Array2, Array4};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use tracklens_server::audio::AudioNormalizer;
use tracklens_server::catalog::{CatalogEntry, CatalogTable, KnownSongs};
use tracklens_server::classifier::{
    AudioClassifier, ClassifierError, ClassifierModel, ClassifierSettings,
};
use tracklens_server::embedding::{
    EmbeddingError, EmbeddingExtractor, EmbeddingSettings, FrameEmbedder,
};
use tracklens_server::index::{SearchIndex, VectorIndex};
use tracklens_server::onnx::ModelOutput;
use tracklens_server::search::{SimilaritySearch, DEFAULT_CATALOG_NAME};
use tracklens_server::uploads::UploadStore;
use tracklens_server::AppState;

/// Rate the test embedder and search normalizer run at
pub const TEST_RATE: u32 = 8000;

pub const KNOWN_SONGS: &str = "\
blues.00000.wav ::: John Lee Hooker ::: One Bourbon, One Scotch, One Beer
jazz.00001.wav ::: Coleman Hawkins ::: Body and Soul
";

/// Classifier double returning a fixed raw output
pub struct FixedClassifier(pub f32);

impl ClassifierModel for FixedClassifier {
    fn forward(&self, _input: Array4<f32>) -> Result<f32, ClassifierError> {
        Ok(self.0)
    }
}

/// Frame embedder double mapping every frame to the same vector
pub struct FixedEmbedder(pub Vec<f32>);

impl FrameEmbedder for FixedEmbedder {
    fn sample_rate(&self) -> u32 {
        TEST_RATE
    }

    fn window_samples(&self) -> usize {
        TEST_RATE as usize
    }

    fn embed_batch(&self, frames: Array2<f32>) -> Result<ModelOutput, EmbeddingError> {
        let rows = frames.nrows();
        Ok(ModelOutput {
            shape: vec![rows, self.0.len()],
            data: self.0.iter().cloned().cycle().take(rows * self.0.len()).collect(),
        })
    }
}

/// What the test app is built with
pub struct TestOptions {
    /// Raw classifier output, or `None` for a classifier that failed to load
    pub classifier_output: Option<f32>,
    /// Catalog rows as (vector, path, label); `None` disables search
    pub catalog: Option<Vec<(Vec<f32>, &'static str, &'static str)>>,
    /// Direction every query clip embeds to
    pub query_direction: Vec<f32>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            classifier_output: Some(0.9),
            catalog: None,
            query_direction: vec![1.0, 0.0],
        }
    }
}

/// Test application: keeps its temp root alive
pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
}

impl TestApp {
    pub fn uploads_dir(&self) -> &Path {
        self.state.uploads.dir()
    }

    /// Place a clip in the uploads directory as if `/api/predict` kept it
    pub fn stage_upload(&self, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = self.uploads_dir().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

pub fn test_app(options: TestOptions) -> TestApp {
    let root = TempDir::new().unwrap();
    let uploads = UploadStore::new(root.path().join("uploads")).unwrap();

    let classifier = match options.classifier_output {
        Some(raw) => AudioClassifier::new(Arc::new(FixedClassifier(raw)), ClassifierSettings::default()),
        None => AudioClassifier::unloaded(ClassifierSettings::default()),
    };

    let dim = options.query_direction.len();
    let index = match options.catalog {
        Some(rows) => {
            let n = rows.len();
            let flat: Vec<f32> = rows.iter().flat_map(|(v, _, _)| v.clone()).collect();
            let vectors = VectorIndex::from_matrix(
                ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[n, dim]), flat).unwrap(),
            )
            .unwrap();
            let table = CatalogTable::from_entries(
                rows.iter()
                    .map(|(_, path, label)| CatalogEntry {
                        path: path.to_string(),
                        label: label.to_string(),
                        title: None,
                        artist: None,
                    })
                    .collect(),
            );
            SearchIndex::new(vectors, table).unwrap()
        }
        None => SearchIndex::unavailable(),
    };

    let extractor = EmbeddingExtractor::new(
        Arc::new(FixedEmbedder(options.query_direction)),
        EmbeddingSettings {
            hop_size: 0.5,
            center: true,
            batch_size: 8,
            embedding_dim: dim,
        },
    );

    let search = SimilaritySearch::new(
        AudioNormalizer::new(TEST_RATE, 2.0),
        extractor,
        Arc::new(index),
        Arc::new(KnownSongs::parse(KNOWN_SONGS)),
        DEFAULT_CATALOG_NAME,
    );

    let state = AppState::new(uploads, classifier, search, 16 * 1024 * 1024);
    TestApp { root, state }
}

/// Build a `multipart/form-data` POST to `/api/predict`.
///
/// `filename` of `None` sends a plain form field without a filename.
pub fn predict_request(field: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "tracklens-test-boundary";

    let disposition = match filename {
        Some(name) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n",
            field, name
        ),
        None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n{}\r\n", BOUNDARY, disposition).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serialize a C-ordered `<f4` matrix as a `.npy` file
pub fn write_npy(path: &Path, rows: usize, cols: usize, data: &[f32]) {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    let unpadded = 6 + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\x93NUMPY\x01\x00");
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}
