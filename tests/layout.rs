use cachedb::{FileHeader, Mode, Session, HEADER_SIZE};
use tempfile::tempdir;

#[test]
fn records_follow_the_index_in_creation_order() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("layout.db");

    let mut session = Session::open(&path, Mode::Create).expect("open");
    for key in ["c", "a", "b", "e", "d"] {
        session
            .add(key.as_bytes(), key.repeat(100).as_bytes(), None)
            .expect("add");
    }
    session.close().expect("close");

    // Extend once more so the layout holds across a second commit.
    let mut session = Session::open(&path, Mode::Write).expect("open write");
    session.add(b"f", b"ffff", None).expect("add");
    session.close().expect("close");

    let bytes = std::fs::read(&path).expect("read");
    let header = FileHeader::from_bytes(&bytes[..HEADER_SIZE]).expect("header");
    let session = Session::open(&path, Mode::Read).expect("reopen");
    assert_eq!(session.header(), Some(header));

    let info = session.info();
    let keys: Vec<_> = info.entries.iter().map(|e| e.key.clone()).collect();
    let expected: Vec<Vec<u8>> = ["c", "a", "b", "e", "d", "f"]
        .iter()
        .map(|k| k.as_bytes().to_vec())
        .collect();
    assert_eq!(keys, expected);

    let mut offset = HEADER_SIZE as u64 + header.index_zlen;
    for (i, (entry, (key, slot))) in info.entries.iter().zip(info.lookup.iter()).enumerate() {
        assert_eq!(&entry.key, key);
        assert_eq!(slot.ordinal, i);
        assert_eq!(slot.offset, offset);
        offset += entry.compressed_len;
    }
    assert_eq!(offset, bytes.len() as u64);

    // Each record is an independent frame at its offset.
    let d = &info.entries[4];
    let start = info.lookup[4].1.offset as usize;
    let frame = &bytes[start..start + d.compressed_len as usize];
    let decoded = zstd::stream::decode_all(frame).expect("decode frame");
    assert_eq!(decoded, b"d".repeat(100));
}

#[test]
fn base_records_are_copied_verbatim_on_commit() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("verbatim.db");

    let mut session = Session::open(&path, Mode::Create).expect("open");
    session.add(b"x", &[9u8; 4096], None).expect("add");
    session.add(b"y", b"why", None).expect("add");
    session.close().expect("close");

    let before = std::fs::read(&path).expect("read");
    let old = FileHeader::from_bytes(&before[..HEADER_SIZE]).expect("header");
    let old_records = &before[old.data_offset() as usize..];

    let mut session = Session::open(&path, Mode::Write).expect("open write");
    session.add(b"z", b"zed", None).expect("add");
    session.close().expect("close");

    let after = std::fs::read(&path).expect("read");
    let new = FileHeader::from_bytes(&after[..HEADER_SIZE]).expect("header");
    let start = new.data_offset() as usize;
    assert_eq!(&after[start..start + old_records.len()], old_records);
}

#[test]
fn failed_open_and_abandoned_sessions_leave_no_temp_files() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("clean.db");

    let mut session = Session::open(&path, Mode::Create).expect("open");
    session.add(b"k", b"v", None).expect("add");
    drop(session);

    assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn commit_keeps_the_permissions_of_the_replaced_store() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("perm.db");

    let mut session = Session::open(&path, Mode::Create).expect("open");
    session.add(b"a", b"1", None).expect("add");
    session.close().expect("close");
    let mode = std::fs::metadata(&path).expect("stat").permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).expect("chmod");
    let mut session = Session::open(&path, Mode::Write).expect("open write");
    session.add(b"b", b"2", None).expect("add");
    assert!(session.close().expect("close").is_committed());
    let mode = std::fs::metadata(&path).expect("stat").permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
}
