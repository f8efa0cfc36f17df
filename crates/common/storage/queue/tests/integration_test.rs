// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use bytes::Bytes;
use spool_queue::{
    ErrorKind, HeaderFormat, QueueBuilder, QueueError, QueueFile,
    format::{
        CHECKSUMMED_HEADER_LEN, Header, LEGACY_HEADER_LEN, VERSIONED_HEADER_LEN, encode_frame,
    },
};
use tempfile::TempDir;
use test_case::test_case;

fn read_raw(path: &Path) -> Vec<u8> { std::fs::read(path).unwrap() }

fn patch_raw(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_basic_scenario() {
    spool_common_telemetry::init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut queue = QueueFile::open(temp_dir.path().join("basic.qf")).unwrap();

    queue.add(b"A").unwrap();
    queue.add(b"B").unwrap();
    assert_eq!(queue.size(), 2);
    assert_eq!(queue.peek().unwrap().as_deref(), Some(&b"A"[..]));

    queue.remove().unwrap();
    assert_eq!(queue.peek().unwrap().as_deref(), Some(&b"B"[..]));
    assert_eq!(queue.size(), 1);

    queue.clear().unwrap();
    assert!(queue.is_empty());
}

#[test]
fn test_remove_n_beyond_size_leaves_queue_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let mut queue = QueueFile::open(temp_dir.path().join("q.qf")).unwrap();
    queue.add(b"one").unwrap();
    queue.add(b"two").unwrap();

    let err = queue.remove_n(3).unwrap_err();
    assert!(matches!(err, QueueError::NoSuchElement { .. }));
    assert_eq!(err.kind(), ErrorKind::NoSuchElement);
    assert_eq!(queue.size(), 2);
    assert_eq!(queue.get_all().unwrap(), vec![
        Bytes::from_static(b"one"),
        Bytes::from_static(b"two")
    ]);
}

#[test]
fn test_fifo_order_and_drain() {
    let temp_dir = TempDir::new().unwrap();
    let mut queue = QueueFile::with_capacity(temp_dir.path().join("q.qf"), 64).unwrap();

    let payloads: Vec<Vec<u8>> = (0..200u32)
        .map(|i| format!("payload-{i}").into_bytes())
        .collect();
    for payload in &payloads {
        queue.add(payload).unwrap();
        assert_eq!(queue.peek().unwrap().as_deref(), Some(&payloads[0][..]));
    }
    let all: Vec<Vec<u8>> = queue
        .get_all()
        .unwrap()
        .into_iter()
        .map(|b| b.to_vec())
        .collect();
    assert_eq!(all, payloads);

    for _ in 0..payloads.len() {
        queue.remove().unwrap();
    }
    assert_eq!(queue.size(), 0);
    assert!(queue.is_empty());
}

#[test_case(0 ; "empty payload")]
#[test_case(1 ; "single byte")]
#[test_case(4093 ; "larger than the initial data region")]
#[test_case(1 << 20 ; "one mebibyte")]
fn test_payload_round_trip(len: usize) {
    let temp_dir = TempDir::new().unwrap();
    let mut queue = QueueFile::open(temp_dir.path().join("q.qf")).unwrap();
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

    queue.add(&payload).unwrap();
    assert_eq!(queue.peek().unwrap().unwrap().as_ref(), payload.as_slice());
}

#[test]
fn test_growth_with_wrapped_region_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("grow.qf");
    let mut expected = std::collections::VecDeque::new();
    {
        let mut queue = QueueFile::with_capacity(&path, 64).unwrap();
        let mut next = 0u8;
        for round in 0..30 {
            for _ in 0..3 {
                let payload = vec![next; usize::from(next % 13)];
                queue.add(&payload).unwrap();
                expected.push_back(payload);
                next = next.wrapping_add(1);
            }
            if round % 3 != 2 {
                queue.remove_n(2).unwrap();
                expected.pop_front();
                expected.pop_front();
            }
        }
        assert!(queue.file_len() > 64);
    }

    let mut queue = QueueFile::open(&path).unwrap();
    assert_eq!(queue.size(), expected.len());
    let all: Vec<Vec<u8>> = queue
        .get_all()
        .unwrap()
        .into_iter()
        .map(|b| b.to_vec())
        .collect();
    assert_eq!(all, Vec::from(expected));
}

#[test]
fn test_committed_state_visible_without_close() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("crash.qf");

    let mut queue = QueueFile::open(&path).unwrap();
    queue.add(b"kept").unwrap();
    queue.add(b"also kept").unwrap();
    queue.remove().unwrap();
    // Simulates a crash: no drop, no final flush.
    std::mem::forget(queue);

    let mut reopened = QueueFile::open(&path).unwrap();
    assert_eq!(reopened.get_all().unwrap(), vec![Bytes::from_static(
        b"also kept"
    )]);
}

#[test]
fn test_sync_all_with_sync_writes_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nosync.qf");

    let mut queue = QueueBuilder::new(&path).sync_writes(false).open().unwrap();
    assert!(!queue.sync_writes());
    queue.add_n([&b"x"[..], b"y"]).unwrap();
    queue.sync_all().unwrap();
    std::mem::forget(queue);

    let reopened = QueueFile::open(&path).unwrap();
    assert_eq!(reopened.size(), 2);
}

#[test]
fn test_uncommitted_bytes_are_invisible() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.qf");
    let used = {
        let mut queue = QueueFile::open(&path).unwrap();
        queue.add(b"A").unwrap();
        queue.add(b"B").unwrap();
        queue.used_bytes()
    };

    // A frame written after the tail without a header commit, as left by a
    // crash between the data write and the commit.
    let orphan = encode_frame(HeaderFormat::Checksummed, b"orphan").unwrap();
    patch_raw(&path, used, &orphan);
    // An extension from an uncommitted growth.
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(16 * 1024)
        .unwrap();

    let mut queue = QueueFile::open(&path).unwrap();
    assert_eq!(queue.file_len(), 4096);
    assert_eq!(queue.get_all().unwrap(), vec![
        Bytes::from_static(b"A"),
        Bytes::from_static(b"B")
    ]);

    queue.add(b"C").unwrap();
    assert_eq!(queue.size(), 3);
}

#[test]
fn test_overwrite_on_remove_zeroes_prefix_and_payload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("secure.qf");
    let mut queue = QueueFile::open(&path).unwrap();
    assert!(queue.overwrite_on_remove());

    queue.add(&[0xAA; 100]).unwrap();
    queue.add(&[0xBB; 10]).unwrap();
    queue.remove().unwrap();

    let start = CHECKSUMMED_HEADER_LEN as usize;
    let raw = read_raw(&path);
    assert!(raw[start..start + 104].iter().all(|b| *b == 0));
    // The surviving element is untouched.
    assert_eq!(&raw[start + 108..start + 118], &[0xBB; 10]);
}

#[test]
fn test_remove_without_overwrite_keeps_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fast.qf");
    let mut queue = QueueBuilder::new(&path)
        .overwrite_on_remove(false)
        .open()
        .unwrap();

    queue.add(&[0xAA; 16]).unwrap();
    queue.remove().unwrap();

    let start = CHECKSUMMED_HEADER_LEN as usize + 4;
    assert_eq!(&read_raw(&path)[start..start + 16], &[0xAA; 16]);
}

#[test]
fn test_clear_zeroes_data_region() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("clear.qf");
    let mut queue = QueueFile::open(&path).unwrap();
    queue.add_n([[0xCC; 50], [0xDD; 50]]).unwrap();
    queue.clear().unwrap();

    let raw = read_raw(&path);
    assert!(raw[CHECKSUMMED_HEADER_LEN as usize..].iter().all(|b| *b == 0));
    assert_eq!(queue.used_bytes(), CHECKSUMMED_HEADER_LEN);
}

#[test]
fn test_legacy_file_keeps_its_format() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("legacy.qf");

    let mut raw = Header {
        format:         HeaderFormat::Legacy,
        file_len:       128,
        element_count:  2,
        first_position: LEGACY_HEADER_LEN,
        last_position:  LEGACY_HEADER_LEN + 9,
    }
    .encode();
    raw.extend(encode_frame(HeaderFormat::Legacy, b"first").unwrap());
    raw.extend(encode_frame(HeaderFormat::Legacy, b"second").unwrap());
    raw.resize(128, 0);
    std::fs::write(&path, raw).unwrap();

    {
        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.format(), HeaderFormat::Legacy);
        assert_eq!(queue.size(), 2);
        queue.add(&[7u8; 200]).unwrap();
        assert!(queue.file_len() >= 256);
    }

    let raw = read_raw(&path);
    let file_len = i32::from_be_bytes(raw[0..4].try_into().unwrap());
    assert!(file_len >= 256);

    let mut queue = QueueFile::open(&path).unwrap();
    assert_eq!(queue.format(), HeaderFormat::Legacy);
    let all = queue.get_all().unwrap();
    assert_eq!(&all[0][..], b"first");
    assert_eq!(&all[1][..], b"second");
    assert_eq!(&all[2][..], &[7u8; 200]);
}

#[test]
fn test_version_one_file_opens_without_checksum() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("v1.qf");

    let mut raw = Header {
        format:         HeaderFormat::Versioned,
        file_len:       128,
        element_count:  2,
        first_position: VERSIONED_HEADER_LEN,
        last_position:  VERSIONED_HEADER_LEN + 6,
    }
    .encode();
    assert_eq!(raw.len(), 32);
    raw.extend(encode_frame(HeaderFormat::Versioned, b"ab").unwrap());
    raw.extend(encode_frame(HeaderFormat::Versioned, b"cdef").unwrap());
    raw.resize(128, 0);
    std::fs::write(&path, raw).unwrap();

    {
        let mut queue = QueueFile::open(&path).unwrap();
        assert_eq!(queue.format(), HeaderFormat::Versioned);
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.peek().unwrap().as_deref(), Some(&b"ab"[..]));
        queue.add(&[9u8; 150]).unwrap();
        assert!(queue.file_len() >= 256);
    }

    let raw = read_raw(&path);
    assert_eq!(u32::from_be_bytes(raw[0..4].try_into().unwrap()), 0x8000_0001);
    // Bytes 32..36 hold the first frame's prefix, not a checksum.
    assert_eq!(&raw[32..36], &2u32.to_be_bytes());

    let mut queue = QueueFile::open(&path).unwrap();
    assert_eq!(queue.format(), HeaderFormat::Versioned);
    let all = queue.get_all().unwrap();
    assert_eq!(&all[0][..], b"ab");
    assert_eq!(&all[1][..], b"cdef");
    assert_eq!(&all[2][..], &[9u8; 150]);
}

#[test]
fn test_header_checksum_mismatch_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("crc.qf");
    {
        let mut queue = QueueFile::open(&path).unwrap();
        queue.add(b"data").unwrap();
    }
    // Flip a bit in the element count.
    let mut raw = read_raw(&path);
    raw[15] ^= 0x01;
    std::fs::write(&path, raw).unwrap();

    let err = QueueFile::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_unknown_version_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("future.qf");
    drop(QueueFile::open(&path).unwrap());
    patch_raw(&path, 0, &0x8000_0003u32.to_be_bytes());

    let err = QueueFile::open(&path).unwrap_err();
    assert!(matches!(err, QueueError::UnsupportedVersion { .. }));
}

#[test]
fn test_corrupt_length_prefix_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("prefix.qf");
    {
        let mut queue = QueueFile::open(&path).unwrap();
        queue.add(b"head").unwrap();
        queue.add(b"tail").unwrap();
    }
    // Corrupt the head's prefix to claim more bytes than the file holds.
    patch_raw(&path, CHECKSUMMED_HEADER_LEN, &u32::MAX.to_be_bytes());

    let err = QueueFile::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_settings_can_change_on_open_queue() {
    let temp_dir = TempDir::new().unwrap();
    let mut queue = QueueFile::open(temp_dir.path().join("settings.qf")).unwrap();
    queue.set_sync_writes(false);
    queue.set_overwrite_on_remove(false);
    queue
        .set_cache_offset_policy(spool_queue::OffsetCachePolicy::Eager)
        .unwrap();

    queue.add_n([b"1", b"2", b"3"]).unwrap();
    queue.remove_n(2).unwrap();
    assert!(!queue.sync_writes());
    assert!(!queue.overwrite_on_remove());
    assert_eq!(queue.peek().unwrap().as_deref(), Some(&b"3"[..]));
}
