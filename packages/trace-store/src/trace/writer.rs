//! Span → storage put conversion.

use rand::Rng;
use rayon::prelude::*;

use crate::config::TraceStoreConfig;
use crate::error::Result;
use crate::key::{KeyDistributor, RowKeyCodec};
use crate::span::{CallEvent, SpanChunk, SpanCodec, SpanRecord, TransactionId};
use crate::trace::qualifier::ColumnQualifier;

/// One cell write for the external storage client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePut {
    /// Salted row key.
    pub row_key: Vec<u8>,
    /// See `ColumnQualifier`.
    pub qualifier: Vec<u8>,
    /// Cell version: the collector accept time, in millis.
    pub timestamp: i64,
    /// Encoded span or span chunk.
    pub value: Vec<u8>,
}

/// Encodes spans and places them under salted row keys.
#[derive(Debug, Clone)]
pub struct SpanWriter {
    row_keys: RowKeyCodec,
    distributor: KeyDistributor,
}

impl SpanWriter {
    pub fn new(row_keys: RowKeyCodec, distributor: KeyDistributor) -> Self {
        Self {
            row_keys,
            distributor,
        }
    }

    pub fn from_config(config: &TraceStoreConfig) -> Result<Self> {
        Ok(Self::new(
            RowKeyCodec::new(config.row_key)?,
            KeyDistributor::from_config(&config.distributor)?,
        ))
    }

    pub fn distributor(&self) -> &KeyDistributor {
        &self.distributor
    }

    pub fn row_keys(&self) -> &RowKeyCodec {
        &self.row_keys
    }

    /// Unsalted key: application / agent / start time / transaction id.
    pub fn row_key(&self, span: &SpanRecord) -> Result<Vec<u8>> {
        self.key_for(
            &span.application_name,
            &span.agent_id,
            span.start_time,
            &span.transaction_id,
        )
    }

    /// A chunk shares the row of the span it extends.
    pub fn chunk_row_key(&self, chunk: &SpanChunk) -> Result<Vec<u8>> {
        self.key_for(
            &chunk.application_name,
            &chunk.agent_id,
            chunk.start_time,
            &chunk.transaction_id,
        )
    }

    fn key_for(
        &self,
        application_name: &str,
        agent_id: &str,
        start_time: i64,
        transaction_id: &TransactionId,
    ) -> Result<Vec<u8>> {
        let discriminator = transaction_id.to_bytes()?;
        self.row_keys
            .encode_key(application_name, agent_id, start_time, &discriminator)
    }

    pub fn build_put(&self, span: &SpanRecord) -> Result<TracePut> {
        self.build_put_with(span, &mut rand::thread_rng())
    }

    pub fn build_put_with<R: Rng + ?Sized>(&self, span: &SpanRecord, rng: &mut R) -> Result<TracePut> {
        let key = self.row_key(span)?;
        let value = SpanCodec::encode(span)?;
        let row_key = self.distributor.write_salted_key_with(&key, rng);
        tracing::debug!(
            span_id = span.span_id,
            events = span.events.len(),
            key_bytes = row_key.len(),
            value_bytes = value.len(),
            "encoded span"
        );
        Ok(TracePut {
            row_key,
            qualifier: ColumnQualifier::Span {
                span_id: span.span_id,
            }
            .to_bytes()?,
            timestamp: span.collector_accept_time,
            value,
        })
    }

    /// `base` is the last event already written for the span; see
    /// `SpanCodec::encode_chunk`.
    pub fn build_chunk_put(
        &self,
        chunk: &SpanChunk,
        base: Option<&CallEvent>,
    ) -> Result<TracePut> {
        self.build_chunk_put_with(chunk, base, &mut rand::thread_rng())
    }

    pub fn build_chunk_put_with<R: Rng + ?Sized>(
        &self,
        chunk: &SpanChunk,
        base: Option<&CallEvent>,
        rng: &mut R,
    ) -> Result<TracePut> {
        let key = self.chunk_row_key(chunk)?;
        let value = SpanCodec::encode_chunk(chunk, base)?;
        let row_key = self.distributor.write_salted_key_with(&key, rng);
        tracing::debug!(
            span_id = chunk.span_id,
            key_time = chunk.key_time,
            events = chunk.events.len(),
            value_bytes = value.len(),
            "encoded span chunk"
        );
        Ok(TracePut {
            row_key,
            qualifier: ColumnQualifier::Chunk {
                span_id: chunk.span_id,
                key_time: chunk.key_time,
            }
            .to_bytes()?,
            timestamp: chunk.collector_accept_time,
            value,
        })
    }

    /// Encodes a batch, one result per span in input order.
    pub fn build_puts(&self, spans: &[SpanRecord]) -> Vec<Result<TracePut>> {
        let puts: Vec<Result<TracePut>> = if spans.len() <= 1 {
            spans.iter().map(|span| self.build_put(span)).collect()
        } else {
            spans.par_iter().map(|span| self.build_put(span)).collect()
        };

        let failed = puts.iter().filter(|put| put.is_err()).count();
        if failed > 0 {
            tracing::warn!("build_puts: {} of {} spans failed to encode", failed, spans.len());
        }
        puts
    }
}
