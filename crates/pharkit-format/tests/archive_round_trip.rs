#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for archive serialization and parsing
//!
//! Builds archives in memory and on disk, re-parses them and checks that
//! names, sizes, timestamps, checksums and payloads survive, that offsets
//! and flags follow the entry list, and that signatures catch tampering.

use pharkit_format::{
    CompressionKind, ParseStage, PharArchive, PharError, ReadOptions, SignatureAlgorithm,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn sample_archive(kind: CompressionKind) -> PharArchive {
    let mut archive = PharArchive::new();
    archive.set_alias("sample.phar");
    archive
        .add_entry_at("index.php", b"<?php require 'lib/a.php';".to_vec(), kind, 1_600_000_000)
        .unwrap();
    archive
        .add_entry_at("lib/a.php", b"<?php function a() { return 1; }".repeat(20), kind, 1_600_000_001)
        .unwrap();
    archive.add_directory_at("assets", 1_600_000_002).unwrap();
    archive
        .add_entry_at("empty.txt", Vec::new(), kind, 1_600_000_003)
        .unwrap();
    archive
}

// --- Round trip ---

#[test]
fn round_trip_every_compression_kind() {
    for kind in CompressionKind::ALL {
        let original = sample_archive(kind);
        let parsed = PharArchive::from_bytes(original.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.alias(), "sample.phar");
        assert_eq!(parsed.len(), original.len());
        for (a, b) in original.entries().iter().zip(parsed.entries()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.header.uncompressed_size, b.header.uncompressed_size);
            assert_eq!(a.header.mod_time, b.header.mod_time);
            assert_eq!(a.header.crc32, b.header.crc32);
            assert_eq!(
                original.entry_data(a).unwrap(),
                parsed.entry_data(b).unwrap(),
                "payload of {} with {kind}",
                a.name()
            );
        }
    }
}

#[test]
fn crc_holds_for_every_file_entry() {
    let parsed = PharArchive::from_bytes(sample_archive(CompressionKind::Bzip2).to_bytes().unwrap())
        .unwrap();
    for entry in parsed.entries().iter().filter(|e| !e.is_directory()) {
        let data = parsed.entry_data(entry).unwrap();
        assert_eq!(crc32fast::hash(data), entry.header.crc32, "{}", entry.name());
    }
}

#[test]
fn directory_entries_are_zeroed() {
    let parsed = PharArchive::from_bytes(sample_archive(CompressionKind::Deflate).to_bytes().unwrap())
        .unwrap();
    let dir = parsed.find_entry("assets").unwrap();
    assert_eq!(dir.name(), "assets/");
    assert_eq!(dir.header.uncompressed_size, 0);
    assert_eq!(dir.header.compressed_size, 0);
    assert_eq!(dir.header.crc32, 0);
    assert!(parsed.entry_data(dir).unwrap().is_empty());
}

#[test]
fn offsets_are_cumulative() {
    let parsed = PharArchive::from_bytes(sample_archive(CompressionKind::Deflate).to_bytes().unwrap())
        .unwrap();
    let mut expected = parsed.data_start();
    for entry in parsed.entries() {
        assert_eq!(entry.offset(), Some(expected), "{}", entry.name());
        expected += u64::from(entry.header.compressed_size);
    }
}

#[test]
fn unmodified_archive_rewrites_identically() {
    for kind in CompressionKind::ALL {
        let bytes = sample_archive(kind).to_bytes().unwrap();
        let parsed = PharArchive::from_bytes(bytes.clone()).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes, "{kind}");
    }
}

#[test]
fn flags_are_recomputed_after_changes() {
    let mut archive = sample_archive(CompressionKind::None);
    archive.set_compression("lib/a.php", CompressionKind::Deflate).unwrap();
    archive.set_compression("index.php", CompressionKind::Bzip2).unwrap();

    let parsed = PharArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.manifest_flags(), 0x0001_0000 | 0x1000 | 0x2000);

    let mut parsed = parsed;
    parsed.remove_entry("index.php").unwrap();
    let reparsed = PharArchive::from_bytes(parsed.to_bytes().unwrap()).unwrap();
    assert_eq!(reparsed.manifest_flags(), 0x0001_0000 | 0x1000);
    assert_eq!(
        reparsed.read_entry("lib/a.php").unwrap(),
        b"<?php function a() { return 1; }".repeat(20).as_slice()
    );
}

// --- Scenarios ---

#[test]
fn scenario_file_and_directory() {
    let mut archive = PharArchive::new();
    archive.add_entry("a.txt", b"hello".to_vec(), CompressionKind::None).unwrap();
    archive.add_directory("dir/").unwrap();

    let parsed = PharArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.list_entries(""), vec!["a.txt", "dir/"]);
    assert_eq!(parsed.read_entry("a.txt").unwrap(), b"hello");
}

#[test]
fn scenario_deflate_shrinks() {
    let mut archive = PharArchive::new();
    archive
        .add_entry("a", b"AAAAAAAAAA".to_vec(), CompressionKind::Deflate)
        .unwrap();
    let parsed = PharArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
    let entry = parsed.find_entry("a").unwrap();
    assert_eq!(entry.header.uncompressed_size, 10);
    assert!(entry.header.compressed_size < entry.header.uncompressed_size);
    assert_eq!(parsed.read_entry("a").unwrap(), b"AAAAAAAAAA");
}

#[test]
fn scenario_truncated_manifest() {
    let mut archive = PharArchive::new();
    for i in 0..5 {
        archive
            .add_entry_at(&format!("file{i}.txt"), vec![b'x'; 3], CompressionKind::None, 0)
            .unwrap();
    }
    let bytes = archive.to_bytes().unwrap();

    // Stub, then 4+4+2+4+4+4 fixed bytes (empty alias and metadata), then
    // headers of 4 + 9 + 20 + 4 bytes each; keep two of them.
    let stub_len = archive.stub().len();
    let cut = stub_len + 22 + 2 * 37;
    let err = PharArchive::from_bytes(bytes[..cut].to_vec()).unwrap_err();
    match err {
        PharError::TruncatedArchive { stage, .. } => assert_eq!(stage, ParseStage::EntryHeaders),
        other => panic!("expected TruncatedArchive, got {other:?}"),
    }
}

// --- Signatures ---

#[test]
fn signature_verifies_for_every_algorithm() {
    for algorithm in SignatureAlgorithm::ALL {
        let mut archive = sample_archive(CompressionKind::Deflate);
        archive.set_signature_algorithm(Some(algorithm));
        let parsed = PharArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();

        let signature = parsed.signature().unwrap();
        assert_eq!(signature.algorithm, algorithm);
        assert_eq!(signature.digest.len(), algorithm.digest_len());
        assert!(parsed.verify_signature().unwrap(), "{algorithm}");
    }
}

#[test]
fn flipped_byte_fails_verification() {
    let bytes = sample_archive(CompressionKind::None).to_bytes().unwrap();
    let parsed = PharArchive::from_bytes(bytes.clone()).unwrap();
    let trailer = parsed.trailer_offset().unwrap() as usize;

    // Flip one byte inside a payload so the archive still parses
    let mut tampered = bytes;
    tampered[trailer - 1] ^= 0xFF;
    let parsed = PharArchive::parse_with(
        std::io::Cursor::new(tampered),
        ReadOptions::default().with_verify_crc(false),
    )
    .unwrap();
    assert!(!parsed.verify_signature().unwrap());
}

#[test]
fn signature_check_over_prefix() {
    let bytes = sample_archive(CompressionKind::Bzip2).to_bytes().unwrap();
    let parsed = PharArchive::from_bytes(bytes.clone()).unwrap();
    let trailer = parsed.trailer_offset().unwrap() as usize;
    let signature = parsed.signature().unwrap();

    assert!(signature.verify(&bytes[..trailer]));
    for index in [0, trailer / 2, trailer - 1] {
        let mut flipped = bytes[..trailer].to_vec();
        flipped[index] ^= 0x01;
        assert!(!signature.verify(&flipped), "flip at {index}");
    }
}

#[test]
fn bad_magic_is_lenient_by_default() {
    let mut bytes = sample_archive(CompressionKind::None).to_bytes().unwrap();
    let len = bytes.len();
    bytes[len - 4..].copy_from_slice(b"BMBG");

    let parsed = PharArchive::from_bytes(bytes.clone()).unwrap();
    assert!(!parsed.signature().unwrap().has_valid_magic());
    assert!(parsed.verify_signature().unwrap());

    let strict = PharArchive::parse_with(
        std::io::Cursor::new(bytes),
        ReadOptions::default().with_strict_signature(true),
    );
    assert!(matches!(strict, Err(PharError::BadSignatureMagic(_))));
}

// --- Files on disk ---

#[test]
fn save_open_extract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.phar");
    sample_archive(CompressionKind::Deflate).save(&path).unwrap();

    let archive = PharArchive::open(&path).unwrap();
    assert!(archive.verify_signature().unwrap());

    let out = dir.path().join("out");
    let written = archive.extract_to(&out).unwrap();
    assert_eq!(written, 3);
    assert!(out.join("assets").is_dir());
    assert_eq!(
        std::fs::read(out.join("index.php")).unwrap(),
        b"<?php require 'lib/a.php';"
    );
    assert_eq!(std::fs::read(out.join("empty.txt")).unwrap(), b"");
}

#[test]
fn save_over_own_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("self.phar");
    sample_archive(CompressionKind::Bzip2).save(&path).unwrap();

    let mut archive = PharArchive::open(&path).unwrap();
    archive.add_entry("new.txt", b"added later".to_vec(), CompressionKind::Deflate).unwrap();
    archive.save(&path).unwrap();

    let reopened = PharArchive::open(&path).unwrap();
    assert_eq!(reopened.len(), 5);
    assert_eq!(reopened.read_entry("new.txt").unwrap(), b"added later");
    assert_eq!(
        reopened.read_entry("index.php").unwrap(),
        b"<?php require 'lib/a.php';"
    );
}

// --- Properties ---

fn entry_strategy() -> impl Strategy<Value = (String, Vec<u8>, CompressionKind, u32)> {
    (
        "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.[a-z]{1,3}",
        prop::collection::vec(any::<u8>(), 0..2048),
        prop::sample::select(CompressionKind::ALL.to_vec()),
        any::<u32>(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// parse(serialize(A)) preserves every entry
    #[test]
    fn archive_round_trip(entries in prop::collection::vec(entry_strategy(), 1..12)) {
        let mut archive = PharArchive::new();
        let mut kept = Vec::new();
        for (name, data, kind, mtime) in entries {
            if archive.add_entry_at(&name, data.clone(), kind, mtime).is_ok() {
                kept.push((name, data, mtime));
            }
        }
        prop_assume!(!kept.is_empty());

        let bytes = archive.to_bytes().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let parsed = PharArchive::from_bytes(bytes.clone())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(parsed.len(), kept.len());
        for ((name, data, mtime), entry) in kept.iter().zip(parsed.entries()) {
            prop_assert_eq!(entry.name(), name.as_str());
            prop_assert_eq!(entry.header.mod_time, *mtime);
            let read = parsed.entry_data(entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(read, data.as_slice());
        }
        prop_assert!(parsed.verify_signature().map_err(|e| TestCaseError::fail(e.to_string()))?);
        prop_assert_eq!(parsed.to_bytes().map_err(|e| TestCaseError::fail(e.to_string()))?, bytes);
    }
}
