//! Destinations the shipper flushes transaction batches to.

use std::io::Write;

use crate::transaction::Transaction;

/// Error type for sink writes
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Receives batches of finished transactions.
pub trait TransactionSink: Send {
    fn write_batch(&mut self, batch: &[Transaction]) -> Result<(), SerializationError>;
}

/// NDJSON (Newline Delimited JSON) sink
///
/// Writes transactions as NDJSON, one JSON object per line, flushing after
/// every batch.
pub struct NdjsonSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single transaction as an NDJSON line
    pub fn write(&mut self, transaction: &Transaction) -> Result<(), SerializationError> {
        self.writer
            .write_all(transaction.to_ndjson_line()?.as_bytes())?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TransactionSink for NdjsonSink<W> {
    fn write_batch(&mut self, batch: &[Transaction]) -> Result<(), SerializationError> {
        for transaction in batch {
            self.write(transaction)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink collecting transactions in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub transactions: Vec<Transaction>,
    pub batches: usize,
}

impl TransactionSink for MemorySink {
    fn write_batch(&mut self, batch: &[Transaction]) -> Result<(), SerializationError> {
        self.transactions.extend_from_slice(batch);
        self.batches += 1;
        Ok(())
    }
}
