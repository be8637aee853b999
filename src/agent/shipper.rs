//! Background task batching transactions into a sink.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::agent::sink::TransactionSink;
use crate::transaction::Transaction;

/// Receive transactions until the channel closes, flushing a batch whenever
/// `size_threshold` transactions are queued, on every `interval` tick, and
/// once more on close. Returns the sink when the channel is drained.
///
/// A failing batch is logged and dropped; shipping continues.
pub async fn run_shipper<S: TransactionSink>(
    mut receiver: mpsc::UnboundedReceiver<Transaction>,
    mut sink: S,
    interval: Duration,
    size_threshold: usize,
) -> S {
    let size_threshold = size_threshold.max(1);
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut batch: Vec<Transaction> = Vec::with_capacity(size_threshold);

    tracing::debug!(
        interval_ms = interval.as_millis() as u64,
        size_threshold,
        "shipper started"
    );

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(transaction) => {
                    batch.push(transaction);
                    if batch.len() >= size_threshold {
                        flush(&mut sink, &mut batch);
                    }
                }
                None => {
                    flush(&mut sink, &mut batch);
                    break;
                }
            },
            _ = ticker.tick() => flush(&mut sink, &mut batch),
        }
    }

    tracing::debug!("shipper stopped, channel closed");
    sink
}

fn flush<S: TransactionSink>(sink: &mut S, batch: &mut Vec<Transaction>) {
    if batch.is_empty() {
        return;
    }

    match sink.write_batch(batch) {
        Ok(()) => tracing::debug!(count = batch.len(), "shipped transactions"),
        Err(e) => tracing::error!(
            count = batch.len(),
            error = %e,
            "failed to ship transactions, dropping batch"
        ),
    }
    batch.clear();
}
