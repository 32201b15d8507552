//! Record framing: reading and writing delimiter-separated records (spec
//! §6, §9.2). Deliberately not format-aware beyond a UTF-8 validation
//! check in text mode -- the engine treats every record as an opaque byte
//! string.

use std::io::{Read, Write};

use memchr::memmem;

use super::delimiter::Delimiter;
use super::DEFAULT_IO_READER_BUFSIZE;
use crate::error::{CliError, CliResult};

pub type Record = Vec<u8>;

pub struct RecordReader<R> {
    inner: R,
    delimiter: Delimiter,
    text_mode: bool,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, delimiter: Delimiter, text_mode: bool) -> Self {
        RecordReader {
            inner,
            delimiter,
            text_mode,
            buf: Vec::with_capacity(DEFAULT_IO_READER_BUFSIZE.min(1 << 20)),
            pos: 0,
            eof: false,
        }
    }

    /// Returns the next record, or `None` at end of input.
    pub fn next_record(&mut self) -> CliResult<Option<Record>> {
        loop {
            let delim = self.delimiter.bytes();
            if let Some(rel) = memmem::find(&self.buf[self.pos..], delim) {
                let end = self.pos + rel;
                let record = self.buf[self.pos..end].to_vec();
                self.pos = end + delim.len();
                return self.finish_record(record);
            }
            if self.eof {
                if self.pos < self.buf.len() {
                    let record = self.buf[self.pos..].to_vec();
                    self.pos = self.buf.len();
                    return self.finish_record(record);
                }
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> CliResult<()> {
        if self.pos > 0 {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
        let mut chunk = [0u8; 1 << 16];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn finish_record(&self, record: Record) -> CliResult<Option<Record>> {
        if self.text_mode {
            std::str::from_utf8(&record).map_err(CliError::Utf8)?;
        }
        Ok(Some(record))
    }
}

pub struct RecordWriter<W> {
    inner: W,
    delimiter: Delimiter,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W, delimiter: Delimiter) -> Self {
        RecordWriter { inner, delimiter }
    }

    pub fn write_record(&mut self, record: &[u8]) -> CliResult<()> {
        self.inner.write_all(record)?;
        self.inner.write_all(self.delimiter.bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> CliResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_records_split_on_newline() {
        let data = b"one\ntwo\nthree".to_vec();
        let mut r = RecordReader::new(&data[..], Delimiter::Newline, true);
        assert_eq!(r.next_record().unwrap(), Some(b"one".to_vec()));
        assert_eq!(r.next_record().unwrap(), Some(b"two".to_vec()));
        assert_eq!(r.next_record().unwrap(), Some(b"three".to_vec()));
        assert_eq!(r.next_record().unwrap(), None);
    }

    #[test]
    fn text_mode_rejects_invalid_utf8() {
        let data = vec![0xff, 0xfe, b'\n'];
        let mut r = RecordReader::new(&data[..], Delimiter::Newline, true);
        assert!(r.next_record().is_err());
    }

    #[test]
    fn binary_mode_accepts_arbitrary_bytes() {
        let data = vec![0xff, 0xfe, b'\n'];
        let mut r = RecordReader::new(&data[..], Delimiter::Newline, false);
        assert_eq!(r.next_record().unwrap(), Some(vec![0xff, 0xfe]));
    }

    #[test]
    fn writer_appends_delimiter_after_each_record() {
        let mut out = Vec::new();
        {
            let mut w = RecordWriter::new(&mut out, Delimiter::Newline);
            w.write_record(b"a").unwrap();
            w.write_record(b"b").unwrap();
        }
        assert_eq!(out, b"a\nb\n");
    }
}
