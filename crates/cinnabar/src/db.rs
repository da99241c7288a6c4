//! Read-only facade over a paired index and log.

use std::path::Path;

use bytes::Bytes;

use crate::error::{CinnabarError, Result};
use crate::index::{IndexReader, ProbeIter};
use crate::reader::{LogReader, ValueReader};

/// A read-only database: an index snapshot paired with its source log.
///
/// `get` is safe to call from any number of threads at once; every call
/// returns an independent iterator and all file access is positional.
#[derive(Debug)]
pub struct Db {
    index: IndexReader,
    log: LogReader,
}

impl Db {
    /// Opens an index/log pair for reading.
    ///
    /// The two headers must carry the same file id, which proves the index
    /// was built from this log; otherwise this fails with
    /// [`CinnabarError::HeadersDiffer`].
    pub fn open(index_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<Self> {
        let index = IndexReader::open(index_path)?;
        let log = LogReader::open(log_path)?;

        if index.header().id() != log.header().id() {
            return Err(CinnabarError::HeadersDiffer {
                index: index.header().id(),
                log: log.header().id(),
            });
        }

        Ok(Self { index, log })
    }

    /// Returns an iterator over every value stored for `key`, in the order
    /// the values were written.
    pub fn get(&self, key: &[u8]) -> Result<ValueIter<'_>> {
        let probe = self.index.seek(key)?;
        Ok(ValueIter {
            probe,
            log: &self.log,
            key: Bytes::copy_from_slice(key),
            done: false,
        })
    }

    /// The index half of the pair.
    pub fn index(&self) -> &IndexReader {
        &self.index
    }

    /// The log half of the pair.
    pub fn log(&self) -> &LogReader {
        &self.log
    }
}

/// Iterates over the values associated with one key.
///
/// Probe candidates whose stored key does not byte-equal the query are
/// checksum collisions and are skipped. Values are yielded as lazy
/// [`ValueReader`] views; the first error is sticky and ends the iteration.
#[derive(Debug)]
pub struct ValueIter<'a> {
    probe: ProbeIter<'a>,
    log: &'a LogReader,
    key: Bytes,
    done: bool,
}

impl<'a> Iterator for ValueIter<'a> {
    type Item = Result<ValueReader<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for candidate in self.probe.by_ref() {
            let offset = match candidate {
                Ok(offset) => offset,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            match self.log.get_reader(offset) {
                Ok((stored_key, value)) if stored_key == self.key => return Some(Ok(value)),
                Ok(_) => {} // collision on the checksum; keep probing
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        self.done = true;
        None
    }
}

impl ValueIter<'_> {
    /// Materializes every remaining value, in append order.
    pub fn all(self) -> Result<Vec<Bytes>> {
        let mut values = Vec::new();
        for value in self {
            values.push(value?.read_all()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::LogWriter;

    #[test]
    fn missing_keys_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("data.ccl");
        let index_path = dir.path().join("data.cci");

        let writer = LogWriter::create(&log_path).unwrap();
        writer.put(b"present", b"value").unwrap();
        writer.write_index(&index_path).unwrap();
        writer.close().unwrap();

        let db = Db::open(&index_path, &log_path).unwrap();
        assert!(db.get(b"absent").unwrap().all().unwrap().is_empty());
        assert!(db.get(b"").unwrap().all().unwrap().is_empty());
    }

    #[test]
    fn rejects_mismatched_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let a_log = dir.path().join("a.ccl");
        let b_log = dir.path().join("b.ccl");
        let a_index = dir.path().join("a.cci");

        let writer = LogWriter::create(&a_log).unwrap();
        writer.put(b"key", b"value").unwrap();
        writer.write_index(&a_index).unwrap();
        writer.close().unwrap();

        let writer = LogWriter::create(&b_log).unwrap();
        writer.put(b"key", b"value").unwrap();
        writer.close().unwrap();

        let err = Db::open(&a_index, &b_log).unwrap_err();
        assert!(matches!(err, CinnabarError::HeadersDiffer { .. }));
    }

    #[test]
    fn values_stream_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("data.ccl");
        let index_path = dir.path().join("data.cci");

        let writer = LogWriter::create(&log_path).unwrap();
        writer.put(b"key", b"a rather long value body").unwrap();
        writer.write_index(&index_path).unwrap();
        writer.close().unwrap();

        let db = Db::open(&index_path, &log_path).unwrap();
        let mut iter = db.get(b"key").unwrap();
        let value = iter.next().unwrap().unwrap();
        assert_eq!(value.len(), 24);
        assert_eq!(&value.read_all().unwrap()[..], b"a rather long value body");
        assert!(iter.next().is_none());
    }
}
