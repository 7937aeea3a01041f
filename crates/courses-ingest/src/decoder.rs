//! Incremental decoder for a top-level JSON array of course records
//!
//! The input is read in fixed-size chunks. Only the unconsumed tail of the
//! current chunk is buffered, so memory use does not grow with the number of
//! records in the array.

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::ParseError;
use crate::models::RawRecord;

/// Bytes requested from the reader per refill
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the opening `[`
    Start,
    /// Inside the array, no record read yet
    First,
    /// A record was read; expecting `,` or `]`
    AfterRecord,
    /// End of array reached or a fatal error returned
    Done,
}

/// Lazy, forward-only sequence of records from a JSON array.
pub struct RecordStream<R> {
    reader: R,
    buf: Vec<u8>,
    /// Read position within `buf`
    pos: usize,
    /// Bytes discarded from the front of `buf` so far
    discarded: u64,
    eof: bool,
    state: State,
    records: u64,
}

impl<R: AsyncRead + Unpin> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            discarded: 0,
            eof: false,
            state: State::Start,
            records: 0,
        }
    }

    /// Number of records decoded so far
    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    /// Decode the next record.
    ///
    /// Returns `Ok(None)` once the closing `]` has been read. After the end of
    /// the array or an error, every further call returns `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<RawRecord>, ParseError> {
        match self.advance().await {
            Ok(record) => Ok(record),
            Err(err) => {
                self.state = State::Done;
                Err(err)
            },
        }
    }

    /// Turn the decoder into a [`Stream`] that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<RawRecord, ParseError>> {
        futures::stream::unfold(self, |mut records| async move {
            match records.next().await {
                Ok(Some(record)) => Some((Ok(record), records)),
                Ok(None) => None,
                Err(err) => Some((Err(err), records)),
            }
        })
    }

    async fn advance(&mut self) -> Result<Option<RawRecord>, ParseError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Start => match self.peek_significant().await? {
                    Some(b'[') => {
                        self.pos += 1;
                        self.state = State::First;
                    },
                    Some(other) => {
                        return Err(ParseError::NotAnArray {
                            found: char::from(other),
                        })
                    },
                    None => return Err(self.unexpected_eof()),
                },
                State::First => match self.peek_significant().await? {
                    Some(b']') => return Ok(self.finish()),
                    Some(_) => {
                        let record = self.decode_record().await?;
                        self.state = State::AfterRecord;
                        return Ok(Some(record));
                    },
                    None => return Err(self.unexpected_eof()),
                },
                State::AfterRecord => match self.peek_significant().await? {
                    Some(b',') => {
                        self.pos += 1;
                        return self.decode_record().await.map(Some);
                    },
                    Some(b']') => return Ok(self.finish()),
                    Some(other) => {
                        return Err(ParseError::UnexpectedSeparator {
                            found: char::from(other),
                            offset: self.offset(),
                        })
                    },
                    None => return Err(self.unexpected_eof()),
                },
            }
        }
    }

    fn finish(&mut self) -> Option<RawRecord> {
        self.pos += 1;
        self.state = State::Done;
        debug!(records = self.records, "Reached end of record array");
        None
    }

    /// Skip whitespace and return the next byte without consuming it.
    async fn peek_significant(&mut self) -> Result<Option<u8>, ParseError> {
        loop {
            while let Some(byte) = self.buf.get(self.pos) {
                if byte.is_ascii_whitespace() {
                    self.pos += 1;
                } else {
                    return Ok(Some(*byte));
                }
            }
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// Decode one record starting at the current position, reading more input
    /// until the record is complete.
    async fn decode_record(&mut self) -> Result<RawRecord, ParseError> {
        loop {
            let decoded = {
                let mut values = serde_json::Deserializer::from_slice(&self.buf[self.pos..])
                    .into_iter::<RawRecord>();
                match values.next() {
                    Some(Ok(record)) => Ok((record, values.byte_offset())),
                    Some(Err(err)) => Err(Some(err)),
                    None => Err(None),
                }
            };

            match decoded {
                Ok((record, consumed)) => {
                    self.pos += consumed;
                    self.records += 1;
                    return Ok(record);
                },
                Err(Some(err)) if !err.is_eof() => {
                    return Err(ParseError::MalformedRecord {
                        offset: self.offset(),
                        source: err,
                    });
                },
                Err(_) if self.eof => return Err(self.unexpected_eof()),
                Err(_) => self.fill().await?,
            }
        }
    }

    /// Drop consumed bytes and append one chunk from the reader.
    async fn fill(&mut self) -> Result<(), ParseError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.discarded += self.pos as u64;
            self.pos = 0;
        }

        let filled = self.buf.len();
        self.buf.resize(filled + READ_CHUNK, 0);
        let read = self.reader.read(&mut self.buf[filled..]).await;
        let n = match read {
            Ok(n) => n,
            Err(err) => {
                self.buf.truncate(filled);
                return Err(ParseError::Io(err));
            },
        };
        self.buf.truncate(filled + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn offset(&self) -> u64 {
        self.discarded + self.pos as u64
    }

    fn unexpected_eof(&self) -> ParseError {
        ParseError::UnexpectedEof {
            records: self.records,
        }
    }
}
