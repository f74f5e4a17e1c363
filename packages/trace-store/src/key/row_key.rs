//! Unsalted composite row keys.
//!
//! Layout:
//! ```text
//! [scope:  scope_width bytes, UTF-8, NUL padded]
//! [entity: entity_width bytes, UTF-8, NUL padded]
//! [reverse timestamp: i64::MAX - millis, 8 bytes BE]
//! [discriminator: remaining bytes]
//! ```
//!
//! The reversed timestamp makes newer rows sort first within one
//! scope/entity prefix. Salting is applied on top by `KeyDistributor`.

use serde::{Deserialize, Serialize};

use crate::buffer::ByteCursor;
use crate::error::{Result, TraceError};
use crate::scan::ScanRange;

/// Largest timestamp that can be stored; reversing it yields zero.
pub const MAX_TIME: i64 = i64::MAX;

const TIMESTAMP_LEN: usize = 8;

/// Widths of the two fixed identifier slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKeyLayout {
    pub scope_width: usize,
    pub entity_width: usize,
}

impl Default for RowKeyLayout {
    fn default() -> Self {
        Self {
            scope_width: 24,
            entity_width: 24,
        }
    }
}

impl RowKeyLayout {
    pub fn validate(&self) -> Result<()> {
        if self.scope_width == 0 || self.entity_width == 0 {
            return Err(TraceError::InvalidConfiguration(format!(
                "row key widths must be positive (scope {}, entity {})",
                self.scope_width, self.entity_width
            )));
        }
        Ok(())
    }

    /// Bytes before the discriminator.
    pub fn fixed_len(&self) -> usize {
        self.scope_width + self.entity_width + TIMESTAMP_LEN
    }
}

/// Decoded parts of an unsalted row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub scope: String,
    pub entity: String,
    pub timestamp_millis: i64,
    pub discriminator: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowKeyCodec {
    layout: RowKeyLayout,
}

impl RowKeyCodec {
    pub fn new(layout: RowKeyLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> RowKeyLayout {
        self.layout
    }

    pub fn encode_key(
        &self,
        scope: &str,
        entity: &str,
        timestamp_millis: i64,
        discriminator: &[u8],
    ) -> Result<Vec<u8>> {
        let reverse = reverse_timestamp(timestamp_millis)?;
        let mut cursor =
            ByteCursor::with_capacity_hint(self.layout.fixed_len() + discriminator.len());
        self.write_prefix(&mut cursor, scope, entity)?;
        cursor.put_i64(reverse)?;
        cursor.put_bytes(discriminator)?;
        Ok(cursor.into_vec())
    }

    pub fn decode_key(&self, key: &[u8]) -> Result<RowKey> {
        if key.len() < self.layout.fixed_len() {
            return Err(TraceError::CorruptRecord(format!(
                "row key of {} bytes is shorter than the {} byte fixed part",
                key.len(),
                self.layout.fixed_len()
            )));
        }
        let mut cursor = ByteCursor::wrap(key);
        let scope = cursor
            .get_padded_string(self.layout.scope_width)
            .map_err(TraceError::into_corrupt)?;
        let entity = cursor
            .get_padded_string(self.layout.entity_width)
            .map_err(TraceError::into_corrupt)?;
        let reverse = cursor.get_i64().map_err(TraceError::into_corrupt)?;
        if reverse < 0 {
            return Err(TraceError::CorruptRecord(format!(
                "reverse timestamp {} is negative",
                reverse
            )));
        }
        let discriminator = cursor.get_remaining_bytes().to_vec();
        Ok(RowKey {
            scope,
            entity,
            timestamp_millis: MAX_TIME - reverse,
            discriminator,
        })
    }

    /// Padded scope + entity: the prefix shared by every row of one entity.
    pub fn scan_prefix(&self, scope: &str, entity: &str) -> Result<Vec<u8>> {
        let mut cursor =
            ByteCursor::with_capacity_hint(self.layout.scope_width + self.layout.entity_width);
        self.write_prefix(&mut cursor, scope, entity)?;
        Ok(cursor.into_vec())
    }

    /// Unsalted range covering `from_ts..=to_ts`, newest row first.
    pub fn scan_range(
        &self,
        scope: &str,
        entity: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<ScanRange> {
        let newest = reverse_timestamp(to_ts)?;
        let oldest = reverse_timestamp(from_ts)?;
        if from_ts > to_ts {
            return Err(TraceError::TimestampOutOfRange(from_ts));
        }
        let prefix = self.scan_prefix(scope, entity)?;

        let mut start = prefix.clone();
        start.extend_from_slice(&newest.to_be_bytes());
        // Stop just past every discriminator stored under `from_ts`.
        let mut stop = prefix;
        stop.extend_from_slice(&(oldest as u64 + 1).to_be_bytes());
        Ok(ScanRange::new(start, stop))
    }

    fn write_prefix(&self, cursor: &mut ByteCursor<'_>, scope: &str, entity: &str) -> Result<()> {
        check_identifier("scope", scope, self.layout.scope_width)?;
        check_identifier("entity", entity, self.layout.entity_width)?;
        cursor.put_padded(scope.as_bytes(), self.layout.scope_width)?;
        cursor.put_padded(entity.as_bytes(), self.layout.entity_width)
    }
}

fn reverse_timestamp(timestamp_millis: i64) -> Result<i64> {
    if timestamp_millis < 0 {
        return Err(TraceError::TimestampOutOfRange(timestamp_millis));
    }
    Ok(MAX_TIME - timestamp_millis)
}

fn check_identifier(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(TraceError::IdentifierTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    if value.as_bytes().contains(&0) {
        return Err(TraceError::InvalidIdentifier(format!(
            "{} contains a NUL byte",
            field
        )));
    }
    Ok(())
}
