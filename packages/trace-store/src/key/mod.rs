//! Row-key construction and write distribution.

pub mod distributor;
pub mod row_key;

pub use distributor::{KeyDistributor, MAX_SALT_BUCKETS};
pub use row_key::{RowKey, RowKeyCodec, RowKeyLayout, MAX_TIME};
