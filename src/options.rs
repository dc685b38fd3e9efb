//! Tuning knobs for the write and read pipelines.

use crate::stripe::StripeErrorHandler;

/// Options for [`crate::writer::Writer`].
///
/// `bundle_size` is the number of records striped as one unit of work;
/// `record_group_length` is the estimated byte size at which the current
/// record group is flushed to the sink; `batch_queue_depth` bounds the
/// queue between callers and the background writer, providing
/// backpressure.
pub struct WriterOptions {
    pub(crate) bundle_size: usize,
    pub(crate) record_group_length: usize,
    pub(crate) batch_queue_depth: usize,
    pub(crate) ignore_extra_fields: bool,
    pub(crate) error_handler: Option<StripeErrorHandler>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            bundle_size: 256,
            record_group_length: 128 * 1024 * 1024,
            batch_queue_depth: 100,
            ignore_extra_fields: false,
            error_handler: None,
        }
    }
}

impl WriterOptions {
    pub fn bundle_size(mut self, bundle_size: usize) -> Self {
        self.bundle_size = bundle_size.max(1);
        self
    }

    pub fn record_group_length(mut self, record_group_length: usize) -> Self {
        self.record_group_length = record_group_length;
        self
    }

    pub fn batch_queue_depth(mut self, batch_queue_depth: usize) -> Self {
        self.batch_queue_depth = batch_queue_depth.max(1);
        self
    }

    pub fn ignore_extra_fields(mut self, ignore: bool) -> Self {
        self.ignore_extra_fields = ignore;
        self
    }

    /// Records that fail to stripe are passed to `handler` and dropped
    /// instead of failing the writer.
    pub fn error_handler(mut self, handler: StripeErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterOptions")
            .field("bundle_size", &self.bundle_size)
            .field("record_group_length", &self.record_group_length)
            .field("batch_queue_depth", &self.batch_queue_depth)
            .field("ignore_extra_fields", &self.ignore_extra_fields)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Options for [`crate::reader::Reader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub(crate) bundle_size: usize,
    pub(crate) missing_fields_as_null: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            bundle_size: 256,
            missing_fields_as_null: false,
        }
    }
}

impl ReaderOptions {
    pub fn bundle_size(mut self, bundle_size: usize) -> Self {
        self.bundle_size = bundle_size.max(1);
        self
    }

    /// Queried fields absent from the stored schema assemble to null
    /// instead of failing the projection.
    pub fn missing_fields_as_null(mut self, missing_as_null: bool) -> Self {
        self.missing_fields_as_null = missing_as_null;
        self
    }
}
