//! Binary storage for embedding matrices and vector indexes.
//!
//! Both artifact kinds share one layout:
//!
//! Header (55 bytes):
//! - magic: [u8; 4] ("PIDX")
//! - version: u8 (1)
//! - kind: u8 (1 = embedding matrix, 2 = vector index)
//! - metric: u8 (0 for matrices, `Metric::code` for indexes)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u32 (little-endian)
//! - rows: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Payload:
//! - rows * dimensions f32 values (little-endian, row-major)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::embeddings::EmbeddingMatrix;
use crate::semantic::index::{Metric, VectorIndex};

const MAGIC: &[u8; 4] = b"PIDX";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// magic(4) + version(1) + kind(1) + metric(1) + model_id(32)
/// + dimensions(4) + rows(8) + checksum(4)
const HEADER_SIZE: usize = 55;
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Metric mismatch: file uses {got:?}, expected {expected:?}")]
    MetricMismatch { expected: Metric, got: Metric },

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl VectorStorageError {
    /// True when the file is intact but was produced for another configuration.
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            VectorStorageError::ModelMismatch
                | VectorStorageError::MetricMismatch { .. }
                | VectorStorageError::VersionMismatch(..)
                | VectorStorageError::DimensionMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Matrix = 1,
    Index = 2,
}

/// File header structure.
#[derive(Debug)]
struct Header {
    kind: u8,
    metric: u8,
    model_id: [u8; 32],
    dimensions: u32,
    rows: u64,
}

/// Storage manager for one artifact file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Save an embedding matrix.
    pub fn save_matrix(
        &self,
        matrix: &EmbeddingMatrix,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let header = Header {
            kind: ArtifactKind::Matrix as u8,
            metric: 0,
            model_id: *model_id,
            dimensions: matrix.dimensions() as u32,
            rows: matrix.rows() as u64,
        };
        self.save(&header, matrix.as_flat())
    }

    /// Load an embedding matrix.
    ///
    /// `expected_dimensions` is checked when the model has already been loaded.
    pub fn load_matrix(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: Option<usize>,
    ) -> Result<EmbeddingMatrix, VectorStorageError> {
        let (header, data) =
            self.load(ArtifactKind::Matrix, expected_model_id, expected_dimensions)?;

        EmbeddingMatrix::from_flat(header.dimensions as usize, data)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
    }

    /// Save a vector index.
    pub fn save_index(
        &self,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let matrix = index
            .to_matrix()
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;

        let header = Header {
            kind: ArtifactKind::Index as u8,
            metric: index.metric().code(),
            model_id: *model_id,
            dimensions: index.dimensions() as u32,
            rows: index.len() as u64,
        };
        self.save(&header, matrix.as_flat())
    }

    /// Load a vector index built with `expected_metric`.
    pub fn load_index(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: Option<usize>,
        expected_metric: Metric,
    ) -> Result<VectorIndex, VectorStorageError> {
        let (header, data) =
            self.load(ArtifactKind::Index, expected_model_id, expected_dimensions)?;

        let metric = Metric::from_code(header.metric).ok_or_else(|| {
            VectorStorageError::InvalidFormat(format!("unknown metric code {}", header.metric))
        })?;
        if metric != expected_metric {
            return Err(VectorStorageError::MetricMismatch {
                expected: expected_metric,
                got: metric,
            });
        }

        let matrix = EmbeddingMatrix::from_flat(header.dimensions as usize, data)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;

        VectorIndex::build(&matrix, metric)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
    }

    /// Write header and payload using atomic write: temp file -> fsync -> rename
    fn save(&self, header: &Header, data: &[f32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, header, data);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        path: &Path,
        header: &Header,
        data: &[f32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        Self::write_header(&mut writer, header)?;
        for &value in data {
            writer.write_all(&value.to_le_bytes())?;
        }

        // Flush and sync
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn load(
        &self,
        kind: ArtifactKind,
        expected_model_id: &[u8; 32],
        expected_dimensions: Option<usize>,
    ) -> Result<(Header, Vec<f32>), VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        Self::validate_header(&header, kind, expected_model_id, expected_dimensions)?;

        let data = Self::read_payload(&mut reader, &header)?;
        Ok((header, data))
    }

    fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0..4].copy_from_slice(MAGIC);
        header_bytes[4] = FORMAT_VERSION;
        header_bytes[5] = header.kind;
        header_bytes[6] = header.metric;
        header_bytes[7..39].copy_from_slice(&header.model_id);
        header_bytes[39..43].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[43..51].copy_from_slice(&header.rows.to_le_bytes());

        // Compute and store checksum
        let checksum = crc32fast::hash(&header_bytes[0..CHECKSUM_OFFSET]);
        header_bytes[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VectorStorageError::InvalidFormat("file shorter than header".to_string())
            } else {
                e.into()
            }
        })?;

        if &header_bytes[0..4] != MAGIC {
            return Err(VectorStorageError::InvalidFormat("bad magic".to_string()));
        }

        let version = header_bytes[4];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes([
            header_bytes[51],
            header_bytes[52],
            header_bytes[53],
            header_bytes[54],
        ]);
        let computed_checksum = crc32fast::hash(&header_bytes[0..CHECKSUM_OFFSET]);
        if stored_checksum != computed_checksum {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[7..39]);

        let dimensions = u32::from_le_bytes([
            header_bytes[39],
            header_bytes[40],
            header_bytes[41],
            header_bytes[42],
        ]);
        let mut rows_bytes = [0u8; 8];
        rows_bytes.copy_from_slice(&header_bytes[43..51]);

        Ok(Header {
            kind: header_bytes[5],
            metric: header_bytes[6],
            model_id,
            dimensions,
            rows: u64::from_le_bytes(rows_bytes),
        })
    }

    fn validate_header(
        header: &Header,
        kind: ArtifactKind,
        expected_model_id: &[u8; 32],
        expected_dimensions: Option<usize>,
    ) -> Result<(), VectorStorageError> {
        if header.kind != kind as u8 {
            return Err(VectorStorageError::InvalidFormat(format!(
                "expected artifact kind {}, found {}",
                kind as u8, header.kind
            )));
        }

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions == 0 {
            return Err(VectorStorageError::InvalidFormat("zero dimensions".to_string()));
        }

        if let Some(expected) = expected_dimensions {
            if header.dimensions as usize != expected {
                return Err(VectorStorageError::DimensionMismatch {
                    expected,
                    got: header.dimensions as usize,
                });
            }
        }

        Ok(())
    }

    fn read_payload<R: Read>(
        reader: &mut R,
        header: &Header,
    ) -> Result<Vec<f32>, VectorStorageError> {
        let expected_len = (header.rows as usize)
            .checked_mul(header.dimensions as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                VectorStorageError::InvalidFormat("payload size overflows".to_string())
            })?;

        let mut bytes = Vec::with_capacity(expected_len);
        reader.read_to_end(&mut bytes)?;

        if bytes.len() != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "payload is {} bytes, header promises {}",
                bytes.len(),
                expected_len
            )));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
