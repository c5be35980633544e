//! Streaming decrypt → decompress → CSV decoding of batch files.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use flate2::read::GzDecoder;

use crate::error::{ApplyError, Result};

use super::{Compression, Encryption, FileParams};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK_SIZE: usize = 16;
const READ_CHUNK: usize = 64 * 1024;

/// Required AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// Open `path` and stack the decryption and decompression layers that
/// `params` asks for.
pub fn open_decoded(
    path: &Path,
    params: &FileParams,
    key: Option<&[u8]>,
) -> Result<Box<dyn Read + Send>> {
    let file = BufReader::new(File::open(path)?);

    let decrypted: Box<dyn Read + Send> = match params.encryption {
        Encryption::None => Box::new(file),
        Encryption::Aes => {
            let key = key.ok_or_else(|| {
                ApplyError::MalformedInput(format!("No encryption key for {}", path.display()))
            })?;
            Box::new(DecryptingReader::new(file, key)?)
        }
    };

    let decompressed: Box<dyn Read + Send> = match params.compression {
        Compression::None => decrypted,
        Compression::Gzip => Box::new(GzDecoder::new(decrypted)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(decrypted)?),
    };
    Ok(decompressed)
}

/// CSV reader for batch files: standard quoting, no backslash escapes, and
/// the header handled by the caller as the first record.
pub fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .escape(None)
        .from_reader(input)
}

/// AES-256-CBC decrypting reader.
///
/// The first 16 bytes of the inner stream are the IV. Ciphertext is
/// decrypted block by block; the last block is held back until end of
/// stream so its PKCS#7 padding can be stripped. An empty inner stream
/// decrypts to an empty stream.
pub struct DecryptingReader<R> {
    inner: R,
    cipher: Option<Aes256CbcDec>,
    pending: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(mut inner: R, key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(ApplyError::MalformedInput(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            )));
        }

        let mut iv = [0u8; BLOCK_SIZE];
        let read = read_full(&mut inner, &mut iv)?;
        let cipher = match read {
            0 => None,
            BLOCK_SIZE => Some(Aes256CbcDec::new_from_slices(key, &iv).map_err(|e| {
                ApplyError::MalformedInput(format!("Invalid key or IV: {}", e))
            })?),
            n => {
                return Err(ApplyError::MalformedInput(format!(
                    "Encrypted stream too short for an IV ({} bytes)",
                    n
                )))
            }
        };

        Ok(Self {
            finished: cipher.is_none(),
            inner,
            cipher,
            pending: Vec::new(),
            plain: Vec::new(),
            pos: 0,
        })
    }

    fn decrypt_blocks(&mut self, len: usize) -> Vec<u8> {
        let mut data: Vec<u8> = self.pending.drain(..len).collect();
        if let Some(cipher) = self.cipher.as_mut() {
            for block in data.chunks_exact_mut(BLOCK_SIZE) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }
        data
    }

    /// Decrypt the held-back last block and strip its padding.
    fn finish(&mut self) -> io::Result<Vec<u8>> {
        if self.pending.len() != BLOCK_SIZE {
            return Err(invalid_data(format!(
                "Ciphertext is not a whole number of blocks ({} trailing bytes)",
                self.pending.len()
            )));
        }
        let mut last = self.decrypt_blocks(BLOCK_SIZE);
        let pad = usize::from(last[BLOCK_SIZE - 1]);
        if pad == 0 || pad > BLOCK_SIZE || !last[BLOCK_SIZE - pad..].iter().all(|b| usize::from(*b) == pad) {
            return Err(invalid_data("Invalid PKCS#7 padding".to_string()));
        }
        last.truncate(BLOCK_SIZE - pad);
        Ok(last)
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            self.plain = self.finish()?;
            self.finished = true;
        } else {
            self.pending.extend_from_slice(&chunk[..n]);
            let aligned = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
            let ready = if aligned == self.pending.len() {
                aligned.saturating_sub(BLOCK_SIZE)
            } else {
                aligned
            };
            self.plain = self.decrypt_blocks(ready);
        }
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.plain.len() {
                let n = buf.len().min(self.plain.len() - self.pos);
                buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished || buf.is_empty() {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
