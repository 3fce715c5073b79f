use cachedb::{CommitOutcome, Error, Mode, Session, SessionConfig};
use tempfile::tempdir;

fn seed(path: &std::path::Path) {
    let mut session = Session::open(path, Mode::Create).expect("open seed");
    session.add(b"seed", b"0", None).expect("add seed");
    assert!(session.close().expect("close seed").is_committed());
}

fn leftover_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn second_writer_loses_and_first_commit_survives() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("race.db");
    seed(&path);

    let mut a = Session::open(&path, Mode::Write).expect("open a");
    let mut b = Session::open(&path, Mode::Write).expect("open b");

    a.add(b"from-a", b"aaa", None).expect("add a");
    assert_eq!(a.close().expect("close a"), CommitOutcome::Committed { records: 1 });

    b.add(b"from-b", b"bbb", None).expect("add b");
    // B still reads its own stale base and pending data.
    assert_eq!(b.get(b"seed").expect("get seed"), Some(b"0".to_vec()));
    assert_eq!(b.close().expect("close b"), CommitOutcome::ConflictLoss { records: 1 });

    let mut reader = Session::open(&path, Mode::Read).expect("open reader");
    assert_eq!(reader.len(), 2);
    assert_eq!(reader.get(b"from-a").expect("get a"), Some(b"aaa".to_vec()));
    assert_eq!(reader.get(b"seed").expect("get seed"), Some(b"0".to_vec()));
    assert!(!reader.find(b"from-b"));

    assert_eq!(leftover_files(dir.path()), vec!["race.db".to_string()]);
}

#[test]
fn concurrent_creators_of_a_missing_store_conflict() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fresh.db");

    let mut a = Session::open(&path, Mode::Write).expect("open a");
    let mut b = Session::open(&path, Mode::Create).expect("open b");
    assert_eq!(a.mode(), Mode::Create);

    a.add(b"k", b"from a", None).expect("add a");
    b.add(b"k", b"from b", None).expect("add b");

    assert!(a.close().expect("close a").is_committed());
    assert!(b.close().expect("close b").is_conflict());

    let mut reader = Session::open(&path, Mode::Read).expect("reopen");
    assert_eq!(reader.get(b"k").expect("get"), Some(b"from a".to_vec()));
}

#[test]
fn create_over_existing_conflicts_with_an_intervening_commit() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rebuild.db");
    seed(&path);

    let mut rebuild = Session::open(&path, Mode::Create).expect("open create");
    let mut writer = Session::open(&path, Mode::Write).expect("open write");
    writer.add(b"extra", b"x", None).expect("add");
    assert!(writer.close().expect("close writer").is_committed());

    rebuild.add(b"only", b"y", None).expect("add");
    assert!(rebuild.close().expect("close rebuild").is_conflict());

    let mut reader = Session::open(&path, Mode::Read).expect("reopen");
    assert_eq!(reader.len(), 2);
    assert!(reader.find(b"extra"));
}

#[test]
fn store_deleted_under_a_writer_is_a_conflict() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("gone.db");
    seed(&path);

    let mut session = Session::open(&path, Mode::Write).expect("open");
    session.add(b"k", b"v", None).expect("add");
    std::fs::remove_file(&path).expect("remove");
    assert!(session.close().expect("close").is_conflict());
    assert!(!path.exists());
}

#[test]
fn readers_keep_their_snapshot_across_a_commit() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("snap.db");
    seed(&path);

    let mut reader = Session::open(&path, Mode::Read).expect("open reader");

    let mut writer = Session::open(&path, Mode::Write).expect("open writer");
    writer.add(b"later", b"new", None).expect("add");
    assert!(writer.close().expect("close").is_committed());

    // The open reader still sees the file it opened, in full.
    assert!(!reader.find(b"later"));
    assert_eq!(reader.get(b"seed").expect("get"), Some(b"0".to_vec()));

    let mut fresh = Session::open(&path, Mode::Read).expect("open fresh");
    assert_eq!(fresh.get(b"later").expect("get"), Some(b"new".to_vec()));
}

#[test]
fn racing_threads_publish_exactly_one_winner_per_round() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("threads.db");
    seed(&path);

    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let mut session = Session::open(&path, Mode::Write).expect("open");
                barrier.wait();
                let key = format!("worker-{i}");
                session
                    .add(key.as_bytes(), key.as_bytes(), None)
                    .expect("add");
                session.close().expect("close")
            })
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .collect();

    let winners = outcomes.iter().filter(|o| o.is_committed()).count();
    assert!(winners >= 1);
    assert!(outcomes
        .iter()
        .all(|o| o.is_committed() || o.is_conflict()));

    // Whatever won, the published file is whole and readable.
    let mut reader = Session::open(&path, Mode::Read).expect("reopen");
    assert_eq!(reader.get(b"seed").expect("get"), Some(b"0".to_vec()));
    let workers = (0..4)
        .filter(|i| reader.find(format!("worker-{i}").as_bytes()))
        .count();
    assert_eq!(workers, 1);
}

#[test]
fn failed_commit_leaves_the_base_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("db");
    seed(&path);
    let before = std::fs::read(&path).expect("read before");

    // The replacement file cannot be created under a missing directory.
    let config = SessionConfig {
        temp_prefix: "missing/sub/x".into(),
        ..SessionConfig::default()
    };
    let mut session = Session::open_with(&path, Mode::Write, config).expect("open");
    assert!(session.add(b"lost", b"never published", None).expect("add"));
    let err = session.close().unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");

    assert_eq!(std::fs::read(&path).expect("read after"), before);
    assert_eq!(leftover_files(dir.path()), vec!["db".to_string()]);

    let mut reader = Session::open(&path, Mode::Read).expect("reopen");
    assert_eq!(reader.len(), 1);
    assert_eq!(reader.get(b"seed").expect("get seed"), Some(b"0".to_vec()));
    assert!(!reader.find(b"lost"));
}
