use thiserror::Error;

/// Structural problems with a container. These abort the whole read or write.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid file magic {0:?}, expected \"IRLB\"")]
    BadMagic([u8; 4]),
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),
    #[error("expected {expected:?} chunk at offset {offset}, found {found:?}")]
    BadChunkMagic {
        expected: &'static str,
        found: [u8; 4],
        offset: u64,
    },
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("invalid UTF-8 in {0}")]
    InvalidString(&'static str),
    #[error("{field} does not fit the container format ({value} > {max})")]
    FieldTooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems local to one record chunk. The record is skipped and reading continues.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("expected \"IR--\" at offset {offset} for {name:?}, found {found:?}")]
    BadMagic {
        name: String,
        offset: u64,
        found: [u8; 4],
    },
    #[error("incomplete IR chunk for {name:?} (META: {has_meta}, AUDI: {has_audio})")]
    Incomplete {
        name: String,
        has_meta: bool,
        has_audio: bool,
    },
    #[error("truncated IR chunk for {name:?} at offset {offset}")]
    Truncated { name: String, offset: u64 },
    #[error("invalid UTF-8 in META of {name:?}")]
    InvalidString { name: String },
    #[error("AUDI payload of {name:?} does not fit {channels} channel(s): {bytes} bytes")]
    AudioLayout {
        name: String,
        channels: u32,
        bytes: usize,
    },
}

impl RecordError {
    /// Name of the index entry the error belongs to.
    pub fn name(&self) -> &str {
        match self {
            RecordError::BadMagic { name, .. }
            | RecordError::Incomplete { name, .. }
            | RecordError::Truncated { name, .. }
            | RecordError::InvalidString { name }
            | RecordError::AudioLayout { name, .. } => name,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    #[error("invalid sample rate {0} (must be finite and within 1 Hz to 768 kHz)")]
    InvalidRate(f64),
}

/// An allow-listed name that the source library does not contain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionWarning {
    #[error("IR {0:?} not found in source library")]
    Missing(String),
}
