/*
Byte-stream channels between neighboring nodes and the read/write-exactly
primitive every node uses to move one record per hop.

The memory pipe carries byte chunks over a bounded crossbeam channel. A reader
sees end-of-stream once the writer is dropped, and a writer fails with
BrokenPipe once the reader is gone, the same way an OS pipe behaves.
*/
use std::io::{self, ErrorKind, Read, Write};

use crossbeam::channel::{bounded, Receiver, Sender};

/// Read end of a channel owned by exactly one node
pub type Inbound = Box<dyn Read + Send>;
/// Write end of a channel owned by exactly one node
pub type Outbound = Box<dyn Write + Send>;

pub struct PipeReader {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    position: usize,
}

pub struct PipeWriter {
    chunks: Sender<Vec<u8>>,
}

/// Unidirectional in-memory byte pipe, `capacity` chunks deep
pub fn pipe(capacity: usize) -> (PipeReader, PipeWriter) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        PipeReader { chunks: rx, pending: Vec::new(), position: 0 },
        PipeWriter { chunks: tx },
    )
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position >= self.pending.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.position = 0;
                }
                // every writer is gone
                Err(_) => return Ok(0),
            }
        }
        let available = &self.pending[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.chunks
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "channel reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole buffer was filled
    Complete,
    /// Stream ended cleanly before any byte of the record
    EndOfStream,
}

/// Fills `buf` completely, retrying interrupted reads.
/// End of stream in the middle of a record is an `UnexpectedEof` error.
pub fn read_record<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::EndOfStream),
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} bytes", filled, buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(ReadOutcome::Complete)
}

/// Writes all of `buf` and flushes, retrying interrupted writes.
pub fn write_record<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "channel accepted no bytes")),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    loop {
        match writer.flush() {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per call and fails with Interrupted every other call
    struct Choppy<R> {
        inner: R,
        step: usize,
        interrupt: bool,
    }
    impl<R: Read> Read for Choppy<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }
    impl<W: Write> Write for Choppy<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.step);
            self.inner.write(&buf[..n])
        }
        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn read_record_survives_partial_and_interrupted_reads() {
        let data: Vec<u8> = (0..20).collect();
        let mut reader = Choppy { inner: Cursor::new(data.clone()), step: 3, interrupt: false };
        let mut buf = [0u8; 10];
        assert_eq!(read_record(&mut reader, &mut buf).unwrap(), ReadOutcome::Complete);
        assert_eq!(&buf[..], &data[..10]);
        assert_eq!(read_record(&mut reader, &mut buf).unwrap(), ReadOutcome::Complete);
        assert_eq!(&buf[..], &data[10..]);
        assert_eq!(read_record(&mut reader, &mut buf).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn end_of_stream_mid_record_is_an_error() {
        let mut reader = Cursor::new(vec![1u8; 4]);
        let mut buf = [0u8; 10];
        let err = read_record(&mut reader, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn write_record_survives_interrupted_writes() {
        let mut writer = Choppy { inner: Vec::new(), step: 4, interrupt: false };
        write_record(&mut writer, &[9u8; 11]).unwrap();
        assert_eq!(writer.inner, vec![9u8; 11]);
    }

    #[test]
    fn pipe_reports_end_of_stream_after_writer_drops() {
        let (mut reader, mut writer) = pipe(2);
        write_record(&mut writer, b"apple").unwrap();
        drop(writer);
        let mut buf = [0u8; 5];
        assert_eq!(read_record(&mut reader, &mut buf).unwrap(), ReadOutcome::Complete);
        assert_eq!(&buf, b"apple");
        assert_eq!(read_record(&mut reader, &mut buf).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn pipe_reassembles_records_across_chunks() {
        let (mut reader, mut writer) = pipe(8);
        writer.write_all(b"ab").unwrap();
        writer.write_all(b"cdef").unwrap();
        let mut buf = [0u8; 3];
        read_record(&mut reader, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        read_record(&mut reader, &mut buf).unwrap();
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn writing_to_a_closed_pipe_fails() {
        let (reader, mut writer) = pipe(1);
        drop(reader);
        let err = write_record(&mut writer, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}
