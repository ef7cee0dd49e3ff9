//! Batching log dispatcher.
//!
//! Entries appended by a producer are buffered and shipped to a
//! multi-record HTTP ingestion endpoint in batches. A batch goes out when
//! the buffer reaches the configured size, or after a quiet period with no
//! scheduling activity. Only one request is in flight at a time, and a
//! failed batch is dropped rather than retried.

pub mod buffers;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod endpoint;
pub mod formatter;
pub mod ingest;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use buffers::Entry;
pub use config::{Config, ConfigError};
pub use delivery::{DeliveryClient, DeliveryError, DeliveryRequest, HttpDeliveryClient};
pub use dispatcher::{Dispatcher, DispatcherError, Drain};
pub use endpoint::Credentials;
pub use formatter::{LogRecord, format_line};
