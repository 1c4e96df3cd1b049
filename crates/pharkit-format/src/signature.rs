//! Whole-file signature trailer
//!
//! The trailer is `[digest][algorithm flag: u32]["GBMB"]` and the digest
//! covers every archive byte before it.

use crate::error::{ParseStage, PharError, PharResult};
use crate::io::PositionReader;
use binrw::{BinRead, BinWrite};
use digest::Digest;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, Write};
use std::str::FromStr;
use tracing::{debug, warn};

/// Magic closing every signature trailer
pub const SIGNATURE_MAGIC: [u8; 4] = *b"GBMB";

/// Digest algorithm of a signature trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureAlgorithm {
    /// MD5, 16-byte digest
    Md5,
    /// SHA-1, 20-byte digest
    #[default]
    Sha1,
    /// SHA-256, 32-byte digest
    Sha256,
    /// SHA-512, 64-byte digest
    Sha512,
}

impl SignatureAlgorithm {
    /// All algorithms, in flag order
    pub const ALL: [Self; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Flag stored in the trailer
    pub const fn flag(self) -> u32 {
        match self {
            Self::Md5 => 0x0001,
            Self::Sha1 => 0x0002,
            Self::Sha256 => 0x0004,
            Self::Sha512 => 0x0008,
        }
    }

    /// Algorithm for a trailer flag
    pub fn from_flag(flag: u32) -> PharResult<Self> {
        match flag {
            0x0001 => Ok(Self::Md5),
            0x0002 => Ok(Self::Sha1),
            0x0004 => Ok(Self::Sha256),
            0x0008 => Ok(Self::Sha512),
            other => Err(PharError::UnknownSignatureAlgorithm(other)),
        }
    }

    /// Digest length in bytes
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Conventional algorithm name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Incremental hasher for this algorithm
    pub fn hasher(self) -> SignatureHasher {
        match self {
            Self::Md5 => SignatureHasher::Md5(md5::Md5::new()),
            Self::Sha1 => SignatureHasher::Sha1(sha1::Sha1::new()),
            Self::Sha256 => SignatureHasher::Sha256(sha2::Sha256::new()),
            Self::Sha512 => SignatureHasher::Sha512(sha2::Sha512::new()),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(format!("unknown signature algorithm: {s}")),
        }
    }
}

/// Running digest over archive bytes
#[derive(Clone)]
pub enum SignatureHasher {
    /// MD5 state
    Md5(md5::Md5),
    /// SHA-1 state
    Sha1(sha1::Sha1),
    /// SHA-256 state
    Sha256(sha2::Sha256),
    /// SHA-512 state
    Sha512(sha2::Sha512),
}

impl SignatureHasher {
    /// Feed bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

impl fmt::Debug for SignatureHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5(_) => "Md5",
            Self::Sha1(_) => "Sha1",
            Self::Sha256(_) => "Sha256",
            Self::Sha512(_) => "Sha512",
        };
        f.debug_tuple("SignatureHasher").field(&name).finish()
    }
}

impl Write for SignatureHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that hashes everything passed through it
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: SignatureHasher,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`, hashing with `algorithm`
    pub fn new(inner: W, algorithm: SignatureAlgorithm) -> Self {
        Self {
            inner,
            hasher: algorithm.hasher(),
        }
    }

    /// Return the writer and the digest of everything written
    pub fn finish(self) -> (W, Vec<u8>) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Flag and magic closing the trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
struct TrailerTail {
    flag: u32,
    magic: [u8; 4],
}

/// Signature trailer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Digest algorithm
    pub algorithm: SignatureAlgorithm,
    /// Digest bytes
    pub digest: Vec<u8>,
    /// Magic as read; always `GBMB` when written
    pub magic: [u8; 4],
}

impl Signature {
    /// Sign `data`
    pub fn compute(algorithm: SignatureAlgorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        Self::from_digest(algorithm, hasher.finalize())
    }

    /// Wrap an already computed digest
    pub fn from_digest(algorithm: SignatureAlgorithm, digest: Vec<u8>) -> Self {
        Self {
            algorithm,
            digest,
            magic: SIGNATURE_MAGIC,
        }
    }

    /// Read the trailer: everything left in the stream.
    ///
    /// A wrong magic is logged and kept unless `strict` is set.
    pub fn read<R: Read>(reader: &mut PositionReader<R>, strict: bool) -> PharResult<Self> {
        let start = reader.position();
        let data = reader.read_remaining()?;
        if data.len() < 8 {
            return Err(PharError::TruncatedArchive {
                stage: ParseStage::Signature,
                reason: format!("trailer at offset {start} has {} bytes, need at least 8", data.len()),
            });
        }

        let split = data.len() - 8;
        let tail = TrailerTail::read(&mut Cursor::new(&data[split..]))?;
        if tail.magic != SIGNATURE_MAGIC {
            if strict {
                return Err(PharError::BadSignatureMagic(tail.magic));
            }
            warn!("signature magic is {:02X?}, expected \"GBMB\"", tail.magic);
        }

        let algorithm = SignatureAlgorithm::from_flag(tail.flag)?;
        let digest = data[..split].to_vec();
        if digest.len() != algorithm.digest_len() {
            return Err(PharError::TruncatedArchive {
                stage: ParseStage::Signature,
                reason: format!(
                    "{algorithm} digest must be {} bytes, trailer holds {}",
                    algorithm.digest_len(),
                    digest.len()
                ),
            });
        }

        debug!("signature at {start}: {algorithm}");
        Ok(Self {
            algorithm,
            digest,
            magic: tail.magic,
        })
    }

    /// Write digest, flag and magic
    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> PharResult<()> {
        let mut tail = Cursor::new(Vec::with_capacity(8));
        TrailerTail {
            flag: self.algorithm.flag(),
            magic: SIGNATURE_MAGIC,
        }
        .write(&mut tail)?;
        out.write_all(&self.digest)?;
        out.write_all(tail.get_ref())?;
        Ok(())
    }

    /// Trailer length in bytes
    pub fn encoded_len(&self) -> usize {
        self.digest.len() + 8
    }

    /// Whether `prefix` hashes to the stored digest
    pub fn verify(&self, prefix: &[u8]) -> bool {
        Self::compute(self.algorithm, prefix).digest == self.digest
    }

    /// Digest of the first `len` bytes of `source`
    pub fn digest_stream<R: Read + Seek>(
        algorithm: SignatureAlgorithm,
        source: &mut R,
        len: u64,
    ) -> PharResult<Vec<u8>> {
        source.seek(io::SeekFrom::Start(0))?;
        let mut hasher = algorithm.hasher();
        let copied = io::copy(&mut source.take(len), &mut hasher)?;
        if copied < len {
            return Err(PharError::TruncatedInput {
                offset: copied,
                needed: len - copied,
            });
        }
        Ok(hasher.finalize())
    }

    /// Stream `len` bytes from `source` and compare against the stored digest
    pub fn verify_stream<R: Read + Seek>(&self, source: &mut R, len: u64) -> PharResult<bool> {
        Ok(Self::digest_stream(self.algorithm, source, len)? == self.digest)
    }

    /// Whether the trailer ended with `GBMB`
    pub fn has_valid_magic(&self) -> bool {
        self.magic == SIGNATURE_MAGIC
    }

    /// Lower-case hex digest
    pub fn hex_digest(&self) -> String {
        hex::encode(&self.digest)
    }
}
