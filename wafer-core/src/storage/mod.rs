pub mod cursor;
pub mod format;
pub mod raw;
pub mod reader;
pub mod writer;

pub use cursor::{DocIdMap, QuantizedVectorCursor};
pub use raw::{InMemoryRawVectors, RawVectorStore};
pub use reader::{FieldEntry, FlatVectorReader};
pub use writer::{FlatVectorWriter, MergedRecord, WriterConfig};
