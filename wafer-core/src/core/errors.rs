use std::fmt;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 1000-1099: Dimension/Contract errors
    VectorDimensionMismatch = 1001,
    PackBufferSize = 1002,
    OrdinalOutOfBounds = 1003,
    AlreadyFinished = 1004,
    DocOrderViolation = 1005,
    InvalidCriteria = 1006,

    /// 1200-1299: Quantization errors
    MissingQuantizer = 1201,

    /// 1300-1399: Storage errors
    StorageIOError = 1301,
    ChecksumMismatch = 1302,
    BadMagic = 1303,
    FormatVersionMismatch = 1304,
    UnexpectedFieldNumber = 1305,
    DataLengthMismatch = 1306,
    SegmentIdMismatch = 1307,
    TruncatedStream = 1308,
    SchemaMismatch = 1309,

    /// 1400-1499: Search/Rescore errors
    FieldNotFound = 1401,
    DocMissingVector = 1402,
    QuantizedUnavailable = 1403,
    RescoreFailed = 1404,

    /// 9000: Unknown error
    Unknown = 9000,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::VectorDimensionMismatch => "VECTOR_DIMENSION_MISMATCH",
            ErrorCode::PackBufferSize => "PACK_BUFFER_SIZE",
            ErrorCode::OrdinalOutOfBounds => "ORDINAL_OUT_OF_BOUNDS",
            ErrorCode::AlreadyFinished => "ALREADY_FINISHED",
            ErrorCode::DocOrderViolation => "DOC_ORDER_VIOLATION",
            ErrorCode::InvalidCriteria => "INVALID_CRITERIA",
            ErrorCode::MissingQuantizer => "MISSING_QUANTIZER",
            ErrorCode::StorageIOError => "STORAGE_IO_ERROR",
            ErrorCode::ChecksumMismatch => "CHECKSUM_MISMATCH",
            ErrorCode::BadMagic => "BAD_MAGIC",
            ErrorCode::FormatVersionMismatch => "FORMAT_VERSION_MISMATCH",
            ErrorCode::UnexpectedFieldNumber => "UNEXPECTED_FIELD_NUMBER",
            ErrorCode::DataLengthMismatch => "DATA_LENGTH_MISMATCH",
            ErrorCode::SegmentIdMismatch => "SEGMENT_ID_MISMATCH",
            ErrorCode::TruncatedStream => "TRUNCATED_STREAM",
            ErrorCode::SchemaMismatch => "SCHEMA_MISMATCH",
            ErrorCode::FieldNotFound => "FIELD_NOT_FOUND",
            ErrorCode::DocMissingVector => "DOC_MISSING_VECTOR",
            ErrorCode::QuantizedUnavailable => "QUANTIZED_UNAVAILABLE",
            ErrorCode::RescoreFailed => "RESCORE_FAILED",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub enum WaferError {
    /// Dimension mismatch between a vector and its field schema
    VectorDimensionMismatch { expected: usize, got: usize },
    /// Caller broke an API contract (wrong buffer size, double finish, ...)
    ContractViolation { code: ErrorCode, message: String },
    /// On-disk data failed a structural or checksum validation; never recovered
    Corruption { code: ErrorCode, message: String },
    /// Underlying I/O failure
    StorageError { code: ErrorCode, message: String },
    /// Field is not present in a segment's vector storage
    FieldNotFound(String),
    /// A candidate or graph node references a doc without a stored vector
    DocMissingVector { doc: u32 },
    /// Multiple task failures from parallel rescoring
    Aggregate(Vec<WaferError>),
}

impl WaferError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WaferError::VectorDimensionMismatch { .. } => ErrorCode::VectorDimensionMismatch,
            WaferError::ContractViolation { code, .. } => *code,
            WaferError::Corruption { code, .. } => *code,
            WaferError::StorageError { code, .. } => *code,
            WaferError::FieldNotFound(_) => ErrorCode::FieldNotFound,
            WaferError::DocMissingVector { .. } => ErrorCode::DocMissingVector,
            WaferError::Aggregate(_) => ErrorCode::RescoreFailed,
        }
    }

    /// Wrap an I/O error with context.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        WaferError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("{}: {}", context, err),
        }
    }

    pub fn corruption(code: ErrorCode, message: impl Into<String>) -> Self {
        WaferError::Corruption {
            code,
            message: message.into(),
        }
    }

    pub fn contract(code: ErrorCode, message: impl Into<String>) -> Self {
        WaferError::ContractViolation {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for WaferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaferError::VectorDimensionMismatch { expected, got } => {
                write!(f, "[{}] Vector dimension mismatch: expected {}, got {}",
                    self.code().as_str(), expected, got)
            }
            WaferError::ContractViolation { code, message } => {
                write!(f, "[{}] Contract violation: {}", code.as_str(), message)
            }
            WaferError::Corruption { code, message } => {
                write!(f, "[{}] Corrupt vector storage: {}", code.as_str(), message)
            }
            WaferError::StorageError { code, message } => {
                write!(f, "[{}] Storage error: {}", code.as_str(), message)
            }
            WaferError::FieldNotFound(field) => {
                write!(f, "[{}] Field not found: {}", self.code().as_str(), field)
            }
            WaferError::DocMissingVector { doc } => {
                write!(f, "[{}] Doc {} does not have a stored vector",
                    self.code().as_str(), doc)
            }
            WaferError::Aggregate(errors) => {
                write!(f, "[{}] {} rescore task(s) failed: ", self.code().as_str(), errors.len())?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for WaferError {}

pub type Result<T> = std::result::Result<T, WaferError>;
