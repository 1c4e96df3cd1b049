//! Archive model: parse, query, mutate and serialize
//!
//! Parsing runs in a fixed order (stub, manifest, entry headers, payload
//! bounds, signature) and keeps the input as the backing source so entry
//! bytes are only read when asked for. Serializing rebuilds the manifest
//! from the current entries every time.

use crate::compression::CompressionKind;
use crate::entry::{Entry, SharedSource};
use crate::entry_header::{EntryHeader, normalize_name};
use crate::error::{ParseStage, PharError, PharResult};
use crate::io::{CountingWriter, PositionReader};
use crate::manifest::{MAX_MANIFEST_SIZE, Manifest, compression_flags};
use crate::signature::{HashingWriter, Signature, SignatureAlgorithm};
use crate::stub::Stub;
use crate::version::Version;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// Options applied while parsing and reading entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Check each materialized entry against its header CRC32
    pub verify_crc: bool,
    /// Treat a trailer without `GBMB` magic as an error
    pub strict_signature: bool,
    /// Largest manifest length accepted
    pub max_manifest_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_crc: true,
            strict_signature: false,
            max_manifest_size: MAX_MANIFEST_SIZE,
        }
    }
}

impl ReadOptions {
    /// Enable or disable CRC checks
    #[must_use]
    pub fn with_verify_crc(mut self, verify_crc: bool) -> Self {
        self.verify_crc = verify_crc;
        self
    }

    /// Enable or disable strict signature magic checking
    #[must_use]
    pub fn with_strict_signature(mut self, strict: bool) -> Self {
        self.strict_signature = strict;
        self
    }

    /// Change the manifest size ceiling
    #[must_use]
    pub fn with_max_manifest_size(mut self, size: usize) -> Self {
        self.max_manifest_size = size;
        self
    }
}

/// PHAR archive
pub struct PharArchive {
    stub: Stub,
    version: Version,
    alias: String,
    metadata: Vec<u8>,
    entries: Vec<Entry>,
    signature: Option<Signature>,
    signature_algorithm: Option<SignatureAlgorithm>,
    source: Option<SharedSource>,
    options: ReadOptions,
    manifest_flags: u32,
    data_start: u64,
    trailer_offset: Option<u64>,
}

impl Default for PharArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PharArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PharArchive")
            .field("version", &self.version)
            .field("alias", &self.alias)
            .field("entries", &self.entries.len())
            .field("signature", &self.signature)
            .field("signature_algorithm", &self.signature_algorithm)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

impl PharArchive {
    /// Empty archive with the default stub, version 1.1.1 and SHA-1 signing
    pub fn new() -> Self {
        Self {
            stub: Stub::default(),
            version: Version::default(),
            alias: String::new(),
            metadata: Vec::new(),
            entries: Vec::new(),
            signature: None,
            signature_algorithm: Some(SignatureAlgorithm::default()),
            source: None,
            options: ReadOptions::default(),
            manifest_flags: 0,
            data_start: 0,
            trailer_offset: None,
        }
    }

    /// Empty archive aliased after the file name of `path`
    pub fn create(path: impl AsRef<Path>) -> Self {
        let mut archive = Self::new();
        if let Some(name) = path.as_ref().file_name() {
            archive.alias = name.to_string_lossy().into_owned();
        }
        archive
    }

    /// Open and parse an archive file
    pub fn open(path: impl AsRef<Path>) -> PharResult<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    /// Open and parse an archive file with explicit options
    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> PharResult<Self> {
        let path = path.as_ref();
        info!("opening archive {}", path.display());
        let file = File::open(path)?;
        Self::parse_with(BufReader::new(file), options)
    }

    /// Parse an archive held in memory
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> PharResult<Self> {
        Self::parse(Cursor::new(bytes.into()))
    }

    /// Parse an archive from a seekable source
    pub fn parse<R: Read + Seek + Send + 'static>(source: R) -> PharResult<Self> {
        Self::parse_with(source, ReadOptions::default())
    }

    /// Parse an archive from a seekable source with explicit options.
    ///
    /// The source is kept as the archive's backing store; entry payloads
    /// are read from it on demand.
    pub fn parse_with<R: Read + Seek + Send + 'static>(
        source: R,
        options: ReadOptions,
    ) -> PharResult<Self> {
        let mut reader = PositionReader::new(source);
        reader.seek(SeekFrom::Start(0))?;

        debug!("parse stage: {}", ParseStage::Stub);
        let stub = Stub::read(&mut reader).map_err(|e| e.in_stage(ParseStage::Stub))?;

        debug!("parse stage: {}", ParseStage::Manifest);
        let (manifest, data_start) = Manifest::read(&mut reader, options.max_manifest_size)?;

        debug!("parse stage: {}", ParseStage::Payloads);
        let signed = manifest.has_signature_flag();
        let Manifest {
            version,
            flags,
            alias,
            metadata,
            entries: headers,
        } = manifest;

        let mut running = data_start;
        let mut entries = Vec::with_capacity(headers.len());
        for header in headers {
            trace!("payload of '{}' at {running}", header.name);
            let size = u64::from(header.compressed_size);
            entries.push(Entry::stored(header, running));
            running += size;
        }

        let end = reader.seek(SeekFrom::End(0))?;
        if running > end {
            return Err(PharError::TruncatedArchive {
                stage: ParseStage::Payloads,
                reason: format!("payloads end at offset {running}, archive is {end} bytes"),
            });
        }

        let (signature, trailer_offset) = if signed {
            debug!("parse stage: {}", ParseStage::Signature);
            reader.seek(SeekFrom::Start(running))?;
            let signature = Signature::read(&mut reader, options.strict_signature)
                .map_err(|e| e.in_stage(ParseStage::Signature))?;
            (Some(signature), Some(running))
        } else {
            if end > running {
                warn!("{} bytes after the last payload of an unsigned archive", end - running);
            }
            (None, None)
        };

        debug!(
            "parsed archive: {} entries, payloads at {data_start}, signature {}",
            entries.len(),
            signature
                .as_ref()
                .map_or_else(|| "none".to_string(), |s| s.algorithm.to_string())
        );

        Ok(Self {
            stub,
            version,
            alias,
            metadata,
            signature_algorithm: signature.as_ref().map(|s| s.algorithm),
            entries,
            signature,
            source: Some(Mutex::new(Box::new(reader.into_inner()))),
            options,
            manifest_flags: flags,
            data_start,
            trailer_offset,
        })
    }

    /// Stub preceding the manifest
    pub fn stub(&self) -> &Stub {
        &self.stub
    }

    /// API version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Archive alias
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Opaque archive metadata
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// All entries in on-disk order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Signature trailer read from disk, if any
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Algorithm used when writing; `None` writes an unsigned archive
    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        self.signature_algorithm
    }

    /// Global flags as read from disk (0 for archives built in memory)
    pub fn manifest_flags(&self) -> u32 {
        self.manifest_flags
    }

    /// Compression bits the next write will set
    pub fn compression_flags(&self) -> u32 {
        compression_flags(self.entries.iter().map(|e| e.header.compression))
    }

    /// Offset of the first payload in the parsed file
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Offset of the signature trailer in the parsed file
    pub fn trailer_offset(&self) -> Option<u64> {
        self.trailer_offset
    }

    /// Options used when reading entries
    pub fn read_options(&self) -> ReadOptions {
        self.options
    }

    /// Replace the stub
    pub fn set_stub(&mut self, stub: Stub) {
        self.stub = stub;
    }

    /// Set the API version
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Set the alias
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into();
    }

    /// Set the archive metadata
    pub fn set_metadata(&mut self, metadata: impl Into<Vec<u8>>) {
        self.metadata = metadata.into();
    }

    /// Choose the signature algorithm for writing; `None` disables signing
    pub fn set_signature_algorithm(&mut self, algorithm: Option<SignatureAlgorithm>) {
        self.signature_algorithm = algorithm;
    }

    /// Enable or disable CRC checks on entry reads
    pub fn set_verify_crc(&mut self, verify_crc: bool) {
        self.options.verify_crc = verify_crc;
    }

    /// Find an entry by name, also matching `name/` for directories
    pub fn find_entry(&self, name: &str) -> Option<&Entry> {
        self.position(name).map(|i| &self.entries[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| {
            let n = e.name();
            n == name || (n.len() == name.len() + 1 && n.starts_with(name) && n.ends_with('/'))
        })
    }

    fn position_or_err(&self, name: &str) -> PharResult<usize> {
        self.position(name)
            .ok_or_else(|| PharError::EntryNotFound(name.to_string()))
    }

    /// Names of entries starting with `prefix`, in order
    pub fn list_entries(&self, prefix: &str) -> Vec<&str> {
        self.entries
            .iter()
            .map(Entry::name)
            .filter(|n| n.starts_with(prefix))
            .collect()
    }

    /// Decompressed bytes of `entry`, which must belong to this archive
    pub fn entry_data<'a>(&'a self, entry: &'a Entry) -> PharResult<&'a [u8]> {
        entry.materialize(self.source.as_ref(), self.options.verify_crc)
    }

    /// Decompressed bytes of the named entry
    pub fn read_entry(&self, name: &str) -> PharResult<&[u8]> {
        let index = self.position_or_err(name)?;
        self.entry_data(&self.entries[index])
    }

    /// Add a file stamped with the current time
    pub fn add_entry(
        &mut self,
        name: &str,
        bytes: impl Into<Vec<u8>>,
        compression: CompressionKind,
    ) -> PharResult<()> {
        self.add_entry_at(name, bytes, compression, now())
    }

    /// Add a file with an explicit modification time.
    ///
    /// The name is normalized; a name ending in `/` adds a directory and
    /// must come with no bytes.
    pub fn add_entry_at(
        &mut self,
        name: &str,
        bytes: impl Into<Vec<u8>>,
        compression: CompressionKind,
        mod_time: u32,
    ) -> PharResult<()> {
        let name = normalize_name(name)?;
        let bytes = bytes.into();
        let bare = name.trim_end_matches('/');
        if self.position(bare).is_some() {
            return Err(PharError::DuplicateEntry(name));
        }

        let entry = if name.ends_with('/') {
            if !bytes.is_empty() {
                return Err(PharError::InvalidEntryName(name));
            }
            Entry::from_bytes(EntryHeader::directory(name, mod_time), Vec::new())
        } else {
            let header = EntryHeader::from_source_bytes(name, &bytes, compression, mod_time)?;
            Entry::from_bytes(header, bytes)
        };
        debug!("added '{}' ({} bytes, {compression})", entry.name(), entry.header.uncompressed_size);
        self.entries.push(entry);
        Ok(())
    }

    /// Add an empty directory; returns `false` if an entry already lives under it
    pub fn add_directory(&mut self, name: &str) -> PharResult<bool> {
        self.add_directory_at(name, now())
    }

    /// Add an empty directory with an explicit modification time
    pub fn add_directory_at(&mut self, name: &str, mod_time: u32) -> PharResult<bool> {
        let mut name = normalize_name(name)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        let bare = name.trim_end_matches('/');
        if self
            .entries
            .iter()
            .any(|e| e.name().starts_with(&name) || e.name() == bare)
        {
            return Ok(false);
        }
        self.entries
            .push(Entry::from_bytes(EntryHeader::directory(name, mod_time), Vec::new()));
        Ok(true)
    }

    /// Remove one entry
    pub fn remove_entry(&mut self, name: &str) -> PharResult<Entry> {
        let index = self.position_or_err(name)?;
        debug!("removing '{}'", self.entries[index].name());
        Ok(self.entries.remove(index))
    }

    /// Remove every entry whose name starts with `prefix`; returns how many went
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.name().starts_with(prefix));
        let removed = before - self.entries.len();
        debug!("removed {removed} entries under '{prefix}'");
        removed
    }

    /// Change the compression of one entry for the next write
    pub fn set_compression(&mut self, name: &str, compression: CompressionKind) -> PharResult<()> {
        let index = self.position_or_err(name)?;
        self.entries[index].set_compression(compression);
        Ok(())
    }

    /// Change the compression of every file entry for the next write
    pub fn compress_all(&mut self, compression: CompressionKind) {
        for entry in &mut self.entries {
            entry.set_compression(compression);
        }
    }

    /// Replace the opaque metadata of one entry
    pub fn set_entry_metadata(&mut self, name: &str, metadata: impl Into<Vec<u8>>) -> PharResult<()> {
        let index = self.position_or_err(name)?;
        self.entries[index].header.metadata = metadata.into();
        Ok(())
    }

    /// Serialize the archive; returns the number of bytes written.
    ///
    /// Payloads are encoded first so every header carries its final
    /// compressed size, then stub, manifest, payloads and signature are
    /// written in order.
    pub fn write_to<W: Write>(&self, out: W) -> PharResult<u64> {
        if self.entries.is_empty() {
            return Err(PharError::EmptyArchive {
                manifest_length: 0,
                file_count: 0,
            });
        }

        let source = self.source.as_ref();
        let mut headers = Vec::with_capacity(self.entries.len());
        let mut payloads = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let payload = entry.encoded_payload(source, self.options.verify_crc)?;
            let mut header = entry.header.clone();
            header.compressed_size = u32::try_from(payload.len()).map_err(|_| {
                PharError::CorruptPayload {
                    name: entry.name().to_string(),
                    reason: format!("{} compressed bytes exceed the 4 GiB format limit", payload.len()),
                }
            })?;
            headers.push(header);
            payloads.push(payload);
        }

        let manifest = Manifest {
            version: self.version,
            flags: 0,
            alias: self.alias.clone(),
            metadata: self.metadata.clone(),
            entries: headers,
        };

        let mut out = CountingWriter::new(out);
        match self.signature_algorithm {
            Some(algorithm) => {
                let mut hashing = HashingWriter::new(&mut out, algorithm);
                self.write_body(&mut hashing, &manifest, &payloads, true)?;
                let (_, digest) = hashing.finish();
                Signature::from_digest(algorithm, digest).write(&mut out)?;
            }
            None => self.write_body(&mut out, &manifest, &payloads, false)?,
        }
        out.flush()?;

        debug!("serialized {} entries into {} bytes", self.entries.len(), out.written());
        Ok(out.written())
    }

    fn write_body<W: Write>(
        &self,
        out: &mut W,
        manifest: &Manifest,
        payloads: &[Vec<u8>],
        signed: bool,
    ) -> PharResult<()> {
        out.write_all(self.stub.as_bytes())?;
        manifest.write(out, signed)?;
        for payload in payloads {
            out.write_all(payload)?;
        }
        Ok(())
    }

    /// Serialize into a byte vector
    pub fn to_bytes(&self) -> PharResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Write the archive to `path` through a temporary file in the same directory
    pub fn save(&self, path: impl AsRef<Path>) -> PharResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PharError::Io(e.error))?;
        info!("saved archive {}", path.display());
        Ok(())
    }

    /// Recompute the digest over the backing source and compare it with the trailer
    pub fn verify_signature(&self) -> PharResult<bool> {
        match self.check_signature() {
            Ok(()) => Ok(true),
            Err(PharError::SignatureMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`verify_signature`](Self::verify_signature), but a mismatch is
    /// reported as [`PharError::SignatureMismatch`] with both digests
    pub fn check_signature(&self) -> PharResult<()> {
        let signature = self.signature.as_ref().ok_or(PharError::MissingSignature)?;
        let (Some(source), Some(len)) = (self.source.as_ref(), self.trailer_offset) else {
            return Err(PharError::NoBackingSource("signature".to_string()));
        };
        let actual = {
            let mut guard = source.lock();
            Signature::digest_stream(signature.algorithm, &mut *guard, len)?
        };
        if actual != signature.digest {
            warn!("{} signature does not match archive contents", signature.algorithm);
            return Err(PharError::SignatureMismatch {
                expected: signature.hex_digest(),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    /// Write every entry below `dir`; returns the number of files written
    pub fn extract_to(&self, dir: impl AsRef<Path>) -> PharResult<usize> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = 0;
        for entry in &self.entries {
            let relative = normalize_name(entry.name())?;
            let target = dir.join(relative.trim_end_matches('/'));

            if entry.is_directory() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let data = self.entry_data(entry)?;
            let file = File::create(&target)?;
            let mut writer = BufWriter::new(&file);
            writer.write_all(data)?;
            writer.flush()?;
            drop(writer);
            file.set_modified(UNIX_EPOCH + Duration::from_secs(u64::from(entry.header.mod_time)))?;

            trace!("extracted '{}' to {}", entry.name(), target.display());
            written += 1;
        }
        info!("extracted {written} files to {}", dir.display());
        Ok(written)
    }
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
}
