//! Scan planning and row mapping for span reads.

use crate::config::TraceStoreConfig;
use crate::error::{Result, TraceError};
use crate::key::{KeyDistributor, RowKey, RowKeyCodec};
use crate::scan::{LimitCollector, ScanRange, ScanRow};
use crate::span::{SpanCodec, SpanRecord, TransactionId};
use crate::trace::qualifier::ColumnQualifier;

/// A stored span with its decoded key.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub key: RowKey,
    pub span: SpanRecord,
}

impl TraceRow {
    /// Collector cost: event count, at least one per span.
    pub fn cost(&self) -> usize {
        self.span.event_count().max(1)
    }

    /// Folds a chunk cell of this row into the span.
    ///
    /// Chunks must be merged in `key_time` order: each one continues the
    /// events merged before it.
    pub fn merge_chunk(&mut self, qualifier: &[u8], value: &[u8]) -> Result<()> {
        match ColumnQualifier::from_bytes(qualifier)? {
            ColumnQualifier::Chunk { span_id, key_time } if span_id == self.span.span_id => {
                let chunk = SpanCodec::decode_chunk(value, self.span.events.last())?;
                if chunk.key_time != key_time {
                    return Err(TraceError::CorruptRecord(format!(
                        "chunk key time {} does not match qualifier {}",
                        chunk.key_time, key_time
                    )));
                }
                self.span.append_chunk(chunk)
            }
            other => Err(TraceError::CorruptRecord(format!(
                "{:?} is not a chunk of span {}",
                other, self.span.span_id
            ))),
        }
    }
}

/// Turns a salted storage row back into a span.
#[derive(Debug, Clone)]
pub struct SpanRowMapper {
    row_keys: RowKeyCodec,
    distributor: KeyDistributor,
}

impl SpanRowMapper {
    pub fn new(row_keys: RowKeyCodec, distributor: KeyDistributor) -> Self {
        Self {
            row_keys,
            distributor,
        }
    }

    pub fn map_row(&self, row: &ScanRow) -> Result<TraceRow> {
        self.decode_row(row).map_err(|e| {
            tracing::warn!("unreadable span row ({}): {}", e.code(), e);
            e
        })
    }

    fn decode_row(&self, row: &ScanRow) -> Result<TraceRow> {
        let unsalted = self.distributor.original_key(&row.key)?;
        let key = self.row_keys.decode_key(unsalted)?;
        let span = SpanCodec::decode(&row.value)?;
        let transaction_id = TransactionId::from_bytes(&key.discriminator)?;
        if transaction_id != span.transaction_id {
            return Err(TraceError::CorruptRecord(format!(
                "row key transaction {:?} does not match span transaction {:?}",
                transaction_id, span.transaction_id
            )));
        }
        Ok(TraceRow { key, span })
    }
}

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSlice {
    pub rows: Vec<TraceRow>,
    /// Salted key of the last row consumed; resume strictly after it.
    pub last_key: Option<Vec<u8>>,
}

/// Plans per-salt scans for an application/agent window and collects rows.
#[derive(Debug, Clone)]
pub struct TraceReader {
    row_keys: RowKeyCodec,
    distributor: KeyDistributor,
    mapper: SpanRowMapper,
    default_limit: usize,
}

impl TraceReader {
    pub fn new(row_keys: RowKeyCodec, distributor: KeyDistributor, default_limit: usize) -> Self {
        let mapper = SpanRowMapper::new(row_keys, distributor.clone());
        Self {
            row_keys,
            distributor,
            mapper,
            default_limit,
        }
    }

    pub fn from_config(config: &TraceStoreConfig) -> Result<Self> {
        Ok(Self::new(
            RowKeyCodec::new(config.row_key)?,
            KeyDistributor::from_config(&config.distributor)?,
            config.scan.default_limit,
        ))
    }

    pub fn mapper(&self) -> &SpanRowMapper {
        &self.mapper
    }

    /// Salted ranges covering `from_ts..=to_ts`, one per possible salt.
    pub fn scan_ranges(
        &self,
        application_name: &str,
        agent_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<ScanRange>> {
        let range = self
            .row_keys
            .scan_range(application_name, agent_id, from_ts, to_ts)?;
        Ok(self
            .distributor
            .distributed_scan_ranges(&range.start, &range.stop))
    }

    /// Salted ranges covering every row of one application/agent pair.
    pub fn entity_scan_ranges(
        &self,
        application_name: &str,
        agent_id: &str,
    ) -> Result<Vec<ScanRange>> {
        let prefix = self.row_keys.scan_prefix(application_name, agent_id)?;
        let range = ScanRange::prefix(&prefix);
        Ok(self
            .distributor
            .distributed_scan_ranges(&range.start, &range.stop))
    }

    pub fn read<I>(&self, rows: I) -> Result<TraceSlice>
    where
        I: IntoIterator<Item = ScanRow>,
    {
        self.read_with_limit(rows, self.default_limit)
    }

    /// Maps merged scan rows until the event budget is spent.
    pub fn read_with_limit<I>(&self, rows: I, limit: usize) -> Result<TraceSlice>
    where
        I: IntoIterator<Item = ScanRow>,
    {
        let collector = LimitCollector::new(limit, TraceRow::cost);
        let mut last_key = None;
        let rows = collector.collect(
            rows,
            |row| self.mapper.map_row(row),
            |row, _| last_key = Some(row.key.clone()),
        )?;
        Ok(TraceSlice { rows, last_key })
    }
}
