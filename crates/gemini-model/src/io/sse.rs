use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading the data of server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    /// Bytes of a character split across chunks.
    partial_char: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            partial_char: Vec::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` if the stream ended.
    ///
    /// Incomplete trailing data is discarded when the stream ends.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain buffered events first, a chunk may carry several.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
            // The server terminates lines with CRLF. A trailing CR is kept
            // until its LF arrives with the next chunk.
            if self.buf.contains("\r\n") {
                self.buf = self.buf.replace("\r\n", "\n");
            }
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let joined;
        let bytes = if self.partial_char.is_empty() {
            bytes
        } else {
            self.partial_char.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.partial_char);
            &joined[..]
        };
        match str::from_utf8(bytes) {
            Ok(s) => self.buf.push_str(s),
            // Only an unfinished sequence at the end may wait for more bytes.
            Err(err) if err.error_len().is_none() => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                let valid =
                    str::from_utf8(valid).map_err(|_| Error::InvalidPayload)?;
                self.buf.push_str(valid);
                self.partial_char.extend_from_slice(rest);
            }
            Err(_) => return Err(Error::InvalidPayload),
        }
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        //
        // Only `data` fields carry anything we care about. Events without
        // data (e.g. keep-alive comments) are skipped.
        while let Some(eol_idx) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(..eol_idx + 2).collect();
            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some((field, value)) = line.split_once(':') else {
                    return Err(Error::InvalidPayload);
                };
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "data" => {
                        let data = data.get_or_insert_default();
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }
            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}
