use std::collections::VecDeque;
use std::fmt;

use bytes::{Bytes, BytesMut};

/// One serialized log record. Opaque to the dispatcher: the formatter is
/// responsible for making entries self-delimiting (newline-terminated).
#[derive(Clone, PartialEq, Eq)]
pub struct Entry(Bytes);

impl Entry {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl From<Bytes> for Entry {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

impl From<Vec<u8>> for Entry {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<String> for Entry {
    fn from(payload: String) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<&'static str> for Entry {
    fn from(payload: &'static str) -> Self {
        Self(Bytes::from_static(payload.as_bytes()))
    }
}

/// Entries removed together from the head of the buffer for one delivery attempt.
#[derive(Debug, Default)]
pub struct Batch {
    entries: Vec<Entry>,
    size_bytes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenate the entries, in order, into one request body.
    pub fn into_body(self) -> Bytes {
        let mut body = BytesMut::with_capacity(self.size_bytes);
        for entry in self.entries {
            body.extend_from_slice(&entry.0);
        }
        body.freeze()
    }
}

/// FIFO queue of accepted entries. Entries leave from the front only, via
/// [`BatchBuffer::take_batch`].
#[derive(Debug, Default)]
pub struct BatchBuffer {
    queue: VecDeque<Entry>,
    size_bytes: usize,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: Entry) {
        self.size_bytes += entry.len();
        self.queue.push_back(entry);
    }

    /// Remove up to `max_size` entries from the head, preserving arrival order.
    pub fn take_batch(&mut self, max_size: usize) -> Batch {
        let count = max_size.min(self.queue.len());
        let entries: Vec<Entry> = self.queue.drain(..count).collect();
        let size_bytes = entries.iter().map(Entry::len).sum();
        self.size_bytes -= size_bytes;
        Batch {
            entries,
            size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}
