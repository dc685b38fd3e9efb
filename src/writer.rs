//! The write pipeline: batches records, stripes them on a worker pool, and
//! feeds a single background thread that owns all record-group and sink
//! state.
//!
//! Callers push records synchronously; full batches travel over a bounded
//! queue to the background thread (blocking once the queue fills, which is
//! the pipeline's backpressure). The background thread keeps a FIFO
//! sliding window of in-flight striping jobs sized to the pool, appends
//! finished bundles to the in-progress record group strictly in submission
//! order, and flushes the group to the sink when its estimated size
//! crosses the configured threshold.
//!
//! Failures latch: a striping or sink error tears down the background
//! thread and resurfaces on the caller's next `write` or `close`.

use crate::bundle::{Bundle, BundleFactory};
use crate::codec::{EncoderFactory, LevelEncoder, ValueEncoder};
use crate::error::{Error, Result, StripeError};
use crate::field::DataType;
use crate::levels::LevelShape;
use crate::options::WriterOptions;
use crate::pool::{TaskHandle, WorkerPool};
use crate::schema::SchemaNode;
use crate::sink::{EncodedColumn, EncodedRecordGroup, RecordGroupSink};
use crate::stripe::Striper;
use crate::value::Value;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Counters reported by [`Writer::close`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    /// Records consumed by the configured error handler.
    pub records_dropped: u64,
    pub record_groups: u64,
}

enum Batch {
    Records(Vec<Value>),
    /// Terminating sentinel: lets the background thread exit its drain
    /// loop cleanly even after a failure.
    End,
}

#[derive(Clone)]
struct ColumnMeta {
    column_index: usize,
    shape: LevelShape,
    value_type: DataType,
    repetition_bit_width: u32,
    definition_bit_width: u32,
}

struct ColumnWriter {
    meta: ColumnMeta,
    repetition: Option<Box<dyn LevelEncoder>>,
    definition: Option<Box<dyn LevelEncoder>>,
    values: Box<dyn ValueEncoder>,
}

/// Accumulates encoded column data for the in-progress record group. Lives
/// on the background thread only; encoder state is never shared.
struct RecordGroupState {
    columns: Vec<ColumnWriter>,
    num_records: usize,
}

impl RecordGroupState {
    fn new(metas: &[ColumnMeta], encoders: &dyn EncoderFactory) -> Self {
        let columns = metas
            .iter()
            .map(|meta| ColumnWriter {
                meta: meta.clone(),
                repetition: match meta.shape {
                    LevelShape::Repeated { .. } => {
                        Some(encoders.level_encoder(meta.repetition_bit_width))
                    }
                    _ => None,
                },
                definition: match meta.shape {
                    LevelShape::Required => None,
                    _ => Some(encoders.level_encoder(meta.definition_bit_width)),
                },
                values: encoders.value_encoder(&meta.value_type),
            })
            .collect();
        Self {
            columns,
            num_records: 0,
        }
    }

    fn append(&mut self, bundle: &Bundle) {
        for (writer, chunk) in self.columns.iter_mut().zip(bundle.columns()) {
            let streams = chunk.to_streams(writer.meta.shape);
            if let Some(repetition) = &mut writer.repetition {
                for &level in &streams.repetition_levels {
                    repetition.encode_level(level);
                }
            }
            if let Some(definition) = &mut writer.definition {
                for &level in &streams.definition_levels {
                    definition.encode_level(level);
                }
            }
            for value in &streams.values {
                writer.values.encode(value);
            }
        }
        self.num_records += bundle.num_records();
    }

    fn estimated_length(&self) -> usize {
        self.columns
            .iter()
            .map(|writer| {
                writer.values.estimated_length()
                    + writer
                        .repetition
                        .as_ref()
                        .map(|encoder| encoder.estimated_length())
                        .unwrap_or(0)
                    + writer
                        .definition
                        .as_ref()
                        .map(|encoder| encoder.estimated_length())
                        .unwrap_or(0)
            })
            .sum()
    }

    /// Finishes every column, hands the group to the sink, and resets the
    /// encoders for the next group. Empty groups are skipped.
    fn flush(&mut self, sink: &mut dyn RecordGroupSink) -> Result<bool> {
        if self.num_records == 0 {
            return Ok(false);
        }
        let mut columns = Vec::with_capacity(self.columns.len());
        for writer in &mut self.columns {
            let mut repetition_levels = Vec::new();
            let mut definition_levels = Vec::new();
            let mut values = Vec::new();
            let mut num_levels = writer.values.num_encoded_values();
            if let Some(encoder) = &mut writer.repetition {
                encoder.finish();
                encoder.write_to(&mut repetition_levels);
                num_levels = encoder.num_encoded_levels();
            }
            if let Some(encoder) = &mut writer.definition {
                encoder.finish();
                encoder.write_to(&mut definition_levels);
                num_levels = encoder.num_encoded_levels();
            }
            writer.values.finish();
            writer.values.write_to(&mut values);
            columns.push(EncodedColumn {
                column_index: writer.meta.column_index,
                shape: writer.meta.shape,
                num_values: writer.values.num_encoded_values(),
                num_levels,
                repetition_levels,
                definition_levels,
                values,
            });
            if let Some(encoder) = &mut writer.repetition {
                encoder.reset();
            }
            if let Some(encoder) = &mut writer.definition {
                encoder.reset();
            }
            writer.values.reset();
        }
        let group = EncodedRecordGroup {
            num_records: self.num_records,
            columns,
        };
        debug!(
            "flushing record group: {} records, {} bytes",
            group.num_records,
            group.byte_length()
        );
        sink.write_group(group)?;
        self.num_records = 0;
        Ok(true)
    }
}

type StripeJob = Result<(Bundle, usize), StripeError>;

fn run_background<S: RecordGroupSink>(
    receiver: Receiver<Batch>,
    pool: WorkerPool,
    striper: Arc<Striper>,
    bundle_factory: BundleFactory,
    mut group: RecordGroupState,
    mut sink: S,
    record_group_length: usize,
) -> Result<(WriterStats, S)> {
    let mut stats = WriterStats::default();
    let mut window: VecDeque<TaskHandle<StripeJob>> = VecDeque::new();
    let window_size = pool.num_workers();

    loop {
        let batch = match receiver.recv() {
            Ok(batch) => batch,
            // All senders gone counts as the end of input.
            Err(_) => break,
        };
        let records = match batch {
            Batch::Records(records) => records,
            Batch::End => break,
        };
        let job_striper = Arc::clone(&striper);
        let job_factory = bundle_factory.clone();
        let submitted = records.len();
        let handle = pool.submit(move || {
            job_factory
                .stripe(&job_striper, &records)
                .map(|bundle| (bundle, submitted))
        });
        window.push_back(handle);
        if window.len() >= window_size {
            if let Some(handle) = window.pop_front() {
                consume(
                    handle,
                    &mut group,
                    &mut sink,
                    record_group_length,
                    &mut stats,
                )?;
            }
        }
    }

    while let Some(handle) = window.pop_front() {
        consume(
            handle,
            &mut group,
            &mut sink,
            record_group_length,
            &mut stats,
        )?;
    }
    if group.flush(&mut sink)? {
        stats.record_groups += 1;
    }
    Ok((stats, sink))
}

fn consume(
    handle: TaskHandle<StripeJob>,
    group: &mut RecordGroupState,
    sink: &mut dyn RecordGroupSink,
    record_group_length: usize,
    stats: &mut WriterStats,
) -> Result<()> {
    let (bundle, submitted) = handle.join()??;
    stats.records_written += bundle.num_records() as u64;
    stats.records_dropped += (submitted - bundle.num_records()) as u64;
    group.append(&bundle);
    if group.estimated_length() >= record_group_length && group.flush(sink)? {
        stats.record_groups += 1;
    }
    Ok(())
}

/// Synchronous record writer backed by the striping pipeline.
pub struct Writer<S: RecordGroupSink + 'static> {
    batch: Vec<Value>,
    bundle_size: usize,
    sender: Option<Sender<Batch>>,
    background: Option<JoinHandle<Result<(WriterStats, S)>>>,
}

impl<S: RecordGroupSink + 'static> std::fmt::Debug for Writer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("bundle_size", &self.bundle_size)
            .field("buffered", &self.batch.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

impl<S: RecordGroupSink + 'static> Writer<S> {
    pub fn new(
        schema: &SchemaNode,
        encoders: Arc<dyn EncoderFactory>,
        sink: S,
        options: WriterOptions,
    ) -> Self {
        let mut striper = Striper::new(schema).with_ignore_extra_fields(options.ignore_extra_fields);
        if let Some(handler) = options.error_handler {
            striper = striper.with_error_handler(handler);
        }
        let striper = Arc::new(striper);
        let bundle_factory = BundleFactory::new(schema);
        let metas = schema
            .columns()
            .iter()
            .map(|column| ColumnMeta {
                column_index: column.column_index(),
                shape: LevelShape::of(column),
                value_type: column.value_type().clone(),
                repetition_bit_width: column.repetition_level_bit_width(),
                definition_bit_width: column.definition_level_bit_width(),
            })
            .collect::<Vec<_>>();
        let group = RecordGroupState::new(&metas, encoders.as_ref());
        let record_group_length = options.record_group_length;

        let (sender, receiver) = bounded(options.batch_queue_depth);
        let background = thread::Builder::new()
            .name("nestcol-writer".to_string())
            .spawn(move || {
                let pool = WorkerPool::with_default_size();
                run_background(
                    receiver,
                    pool,
                    striper,
                    bundle_factory,
                    group,
                    sink,
                    record_group_length,
                )
            })
            .expect("failed to spawn writer thread");

        Self {
            batch: Vec::with_capacity(options.bundle_size),
            bundle_size: options.bundle_size,
            sender: Some(sender),
            background: Some(background),
        }
    }

    /// Appends one record. Blocks when the batch queue is full; surfaces
    /// any background failure from earlier batches.
    pub fn write(&mut self, record: Value) -> Result<()> {
        if self.sender.is_none() {
            return Err(Error::Pipeline(
                "writer is closed or already failed".to_string(),
            ));
        }
        self.batch.push(record);
        if self.batch.len() >= self.bundle_size {
            self.send_batch()?;
        }
        Ok(())
    }

    fn send_batch(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let sender = match self.sender.as_ref() {
            Some(sender) => sender.clone(),
            None => {
                return Err(Error::Pipeline(
                    "writer is closed or already failed".to_string(),
                ))
            }
        };
        let records = std::mem::take(&mut self.batch);
        if sender.send(Batch::Records(records)).is_err() {
            return Err(self.background_failure());
        }
        Ok(())
    }

    /// The background thread dropped its receiver: join it and surface the
    /// underlying error.
    fn background_failure(&mut self) -> Error {
        self.sender = None;
        match self.background.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(_)) => {
                    Error::Pipeline("background writer exited unexpectedly".to_string())
                }
                Ok(Err(err)) => err,
                Err(_) => Error::Pipeline("background writer panicked".to_string()),
            },
            None => Error::Pipeline("writer is closed or already failed".to_string()),
        }
    }

    /// Flushes buffered records, stops the pipeline, and returns the final
    /// stats together with the sink.
    pub fn close(mut self) -> Result<(WriterStats, S)> {
        self.send_batch()?;
        if let Some(sender) = self.sender.take() {
            // Failure here means the background thread already stopped;
            // its join result carries the real error either way.
            let _ = sender.send(Batch::End);
        }
        match self.background.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Pipeline("background writer panicked".to_string()))?,
            None => Err(Error::Pipeline(
                "writer is closed or already failed".to_string(),
            )),
        }
    }
}

impl<S: RecordGroupSink + 'static> Drop for Writer<S> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Batch::End);
        }
        if let Some(handle) = self.background.take() {
            let _ = handle.join();
        }
    }
}
