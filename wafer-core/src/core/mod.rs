pub mod errors;
pub mod fields;

pub use errors::{ErrorCode, Result, WaferError};
pub use fields::{FieldInfo, FieldSchema, SimilarityFunction};
