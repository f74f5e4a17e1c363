//! Write and read paths tying the codecs to the storage client.

pub mod qualifier;
pub mod reader;
pub mod writer;

pub use qualifier::ColumnQualifier;
pub use reader::{SpanRowMapper, TraceReader, TraceRow, TraceSlice};
pub use writer::{SpanWriter, TracePut};
