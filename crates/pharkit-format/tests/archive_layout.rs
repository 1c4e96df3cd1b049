#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests against hand-assembled archive bytes
//!
//! The archives here are built field by field rather than through the
//! writer, so the reader is checked against the on-disk layout itself and
//! the writer's output is compared byte for byte.

use pharkit_format::{CompressionKind, PharArchive, PharError, SignatureAlgorithm, Stub};
use pretty_assertions::assert_eq;
use sha1::{Digest, Sha1};

fn u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    u32le(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

struct RawEntry<'a> {
    name: &'a str,
    data: &'a [u8],
    stored: Vec<u8>,
    flags: u32,
    mtime: u32,
    metadata: &'a [u8],
}

/// Assemble an archive the way a PHP build script lays it out
fn assemble(stub: &[u8], alias: &str, metadata: &[u8], entries: &[RawEntry<'_>], signed: bool) -> Vec<u8> {
    let mut headers = Vec::new();
    let mut global = if signed { 0x0001_0000 } else { 0 };
    for e in entries {
        prefixed(&mut headers, e.name.as_bytes());
        u32le(&mut headers, e.data.len() as u32);
        u32le(&mut headers, e.mtime);
        u32le(&mut headers, e.stored.len() as u32);
        u32le(&mut headers, crc32fast::hash(e.data));
        u32le(&mut headers, e.flags);
        prefixed(&mut headers, e.metadata);
        global |= e.flags & 0xF000;
    }

    let mut manifest = Vec::new();
    u32le(&mut manifest, entries.len() as u32);
    manifest.extend_from_slice(&[0x11, 0x10]);
    u32le(&mut manifest, global);
    prefixed(&mut manifest, alias.as_bytes());
    prefixed(&mut manifest, metadata);
    manifest.extend_from_slice(&headers);

    let mut out = stub.to_vec();
    u32le(&mut out, manifest.len() as u32);
    out.extend_from_slice(&manifest);
    for e in entries {
        out.extend_from_slice(&e.stored);
    }
    if signed {
        let digest = Sha1::digest(&out);
        out.extend_from_slice(&digest);
        u32le(&mut out, 0x0002);
        out.extend_from_slice(b"GBMB");
    }
    out
}

fn raw_deflate(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
fn reads_hand_built_archive() {
    let stub = b"#!/usr/bin/env php\n<?php Phar::mapPhar('x.phar'); __HALT_COMPILER(); ?>\r\n";
    let text = b"The quick brown fox jumps over the lazy dog. ".repeat(8);
    let entries = [
        RawEntry {
            name: "src/",
            data: b"",
            stored: Vec::new(),
            flags: 0o755,
            mtime: 1_500_000_000,
            metadata: b"",
        },
        RawEntry {
            name: "src/fox.txt",
            data: &text,
            stored: raw_deflate(&text),
            flags: 0x1000 | 0o644,
            mtime: 1_500_000_001,
            metadata: b"s:3:\"fox\";",
        },
        RawEntry {
            name: "README",
            data: b"read me",
            stored: b"read me".to_vec(),
            flags: 0o644,
            mtime: 1_500_000_002,
            metadata: b"",
        },
    ];
    let bytes = assemble(stub, "x.phar", b"a:0:{}", &entries, true);

    let archive = PharArchive::from_bytes(bytes.clone()).unwrap();
    assert_eq!(archive.stub().as_bytes(), stub);
    assert_eq!(archive.alias(), "x.phar");
    assert_eq!(archive.metadata(), b"a:0:{}");
    assert_eq!(archive.version().to_string(), "1.1.1");
    assert_eq!(archive.manifest_flags(), 0x0001_1000);
    assert_eq!(archive.list_entries("src/"), vec!["src/", "src/fox.txt"]);

    let fox = archive.find_entry("src/fox.txt").unwrap();
    assert_eq!(fox.header.compression, CompressionKind::Deflate);
    assert_eq!(fox.header.extra_flags, 0o644);
    assert_eq!(fox.header.metadata, b"s:3:\"fox\";");
    assert_eq!(archive.read_entry("src/fox.txt").unwrap(), text.as_slice());
    assert_eq!(archive.read_entry("README").unwrap(), b"read me");

    let signature = archive.signature().unwrap();
    assert_eq!(signature.algorithm, SignatureAlgorithm::Sha1);
    assert!(archive.verify_signature().unwrap());

    // Stored bytes, permission bits and flags all survive a rewrite
    assert_eq!(archive.to_bytes().unwrap(), bytes);
}

#[test]
fn reads_unsigned_archive() {
    let entries = [RawEntry {
        name: "a",
        data: b"1",
        stored: b"1".to_vec(),
        flags: 0,
        mtime: 0,
        metadata: b"",
    }];
    let bytes = assemble(b"<?php __HALT_COMPILER();", "", b"", &entries, false);
    let archive = PharArchive::from_bytes(bytes).unwrap();
    assert!(archive.signature().is_none());
    assert_eq!(archive.read_entry("a").unwrap(), b"1");
}

#[test]
fn writer_layout_is_exact() {
    let mut archive = PharArchive::new();
    archive.set_stub(Stub::new("<?php __HALT_COMPILER(); ?>").unwrap());
    archive.set_alias("w.phar");
    archive
        .add_entry_at("a.txt", b"hello".to_vec(), CompressionKind::None, 42)
        .unwrap();
    archive.add_directory_at("dir", 43).unwrap();

    let expected = assemble(
        b"<?php __HALT_COMPILER(); ?>\n",
        "w.phar",
        b"",
        &[
            RawEntry {
                name: "a.txt",
                data: b"hello",
                stored: b"hello".to_vec(),
                flags: 0,
                mtime: 42,
                metadata: b"",
            },
            RawEntry {
                name: "dir/",
                data: b"",
                stored: Vec::new(),
                flags: 0,
                mtime: 43,
                metadata: b"",
            },
        ],
        true,
    );
    assert_eq!(archive.to_bytes().unwrap(), expected);
}

#[test]
fn rejects_structural_damage() {
    let entries = [RawEntry {
        name: "a",
        data: b"abc",
        stored: b"abc".to_vec(),
        flags: 0,
        mtime: 0,
        metadata: b"",
    }];
    let stub = b"<?php __HALT_COMPILER(); ?>\n";
    let good = assemble(stub, "", b"", &entries, true);

    // No terminator at all
    assert!(matches!(
        PharArchive::from_bytes(b"<?php echo 1;".to_vec()),
        Err(PharError::MissingStubTerminator)
    ));

    // Zero entries
    let empty = assemble(stub, "", b"", &[], true);
    assert!(matches!(
        PharArchive::from_bytes(empty),
        Err(PharError::EmptyArchive { .. })
    ));

    // Unknown compression bits on the entry
    let mut bad_kind = good.clone();
    let flags_at = stub.len() + 4 + 4 + 2 + 4 + 4 + 4 + (4 + 1) + 16;
    bad_kind[flags_at..flags_at + 4].copy_from_slice(&0x7000u32.to_le_bytes());
    assert!(matches!(
        PharArchive::from_bytes(bad_kind),
        Err(PharError::UnsupportedCompressionKind(_))
    ));

    // Unknown signature algorithm
    let mut bad_alg = good.clone();
    let n = bad_alg.len();
    bad_alg[n - 8..n - 4].copy_from_slice(&0x0010u32.to_le_bytes());
    assert!(matches!(
        PharArchive::from_bytes(bad_alg),
        Err(PharError::UnknownSignatureAlgorithm(0x0010))
    ));

    // Corrupted payload fails the CRC check on read only
    let mut bad_crc = good;
    let payload_at = bad_crc.len() - 28 - 3;
    bad_crc[payload_at] = b'X';
    let archive = PharArchive::from_bytes(bad_crc).unwrap();
    assert!(matches!(
        archive.read_entry("a"),
        Err(PharError::ChecksumMismatch { .. })
    ));
}

#[test]
fn corrupt_payload_fails_only_that_entry() {
    let entries = [
        RawEntry {
            name: "a",
            data: b"abc",
            stored: b"abc".to_vec(),
            flags: 0,
            mtime: 0,
            metadata: b"",
        },
        RawEntry {
            name: "b",
            data: b"intact",
            stored: b"intact".to_vec(),
            flags: 0,
            mtime: 0,
            metadata: b"",
        },
    ];
    let stub = b"<?php __HALT_COMPILER(); ?>\n";
    let mut bytes = assemble(stub, "", b"", &entries, true);

    // Last byte of "a", which sits before the six bytes of "b" and the trailer
    let payload_at = bytes.len() - 28 - 6 - 1;
    bytes[payload_at] = b'X';

    let archive = PharArchive::from_bytes(bytes).unwrap();
    assert_eq!(archive.list_entries(""), vec!["a", "b"]);
    assert!(matches!(
        archive.read_entry("a"),
        Err(PharError::ChecksumMismatch { .. })
    ));
    assert_eq!(archive.read_entry("b").unwrap(), b"intact");
    assert!(!archive.verify_signature().unwrap());
}

#[test]
fn oversized_declared_length_is_corrupt_payload() {
    let data = b"AAAAAAAAAAAAAAAAAAAA";
    let entries = [RawEntry {
        name: "a",
        data,
        stored: raw_deflate(data),
        flags: 0x1000,
        mtime: 0,
        metadata: b"",
    }];
    let stub = b"<?php __HALT_COMPILER(); ?>\n";
    let mut bytes = assemble(stub, "", b"", &entries, true);

    // Uncompressed size is the first field after the one-byte name
    let size_at = stub.len() + 4 + 4 + 2 + 4 + 4 + 4 + (4 + 1);
    assert_eq!(&bytes[size_at..size_at + 4], &(data.len() as u32).to_le_bytes());
    bytes[size_at..size_at + 4].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

    let archive = PharArchive::from_bytes(bytes).unwrap();
    assert_eq!(archive.entries()[0].header.uncompressed_size, 0xFFFF_FFF0);
    match archive.read_entry("a") {
        Err(PharError::CorruptPayload { name, .. }) => assert_eq!(name, "a"),
        other => panic!("expected a corrupt payload, got {other:?}"),
    }
}
