//! Batch dispatch over whole manifests.
//!
//! Every entry is independent: one failing entry must never keep the others
//! from being processed, and unsafe destinations must be rejected before
//! anything touches the disk or the node.

use std::sync::Arc;

use pinsync_core::{
    AssetResolver, BatchDispatcher, Cid, DispatchOptions, EntryAction, EntryError, FailureKind,
    Manifest, Mode, ObjectKind,
};
use pinsync_store_memory::{Fault, MemoryContentStore};
use tempfile::{TempDir, tempdir};

struct Fixture {
    root: TempDir,
    store: Arc<MemoryContentStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            root: tempdir().unwrap(),
            store: Arc::new(MemoryContentStore::new()),
        }
    }

    fn dispatcher(&self, options: DispatchOptions) -> BatchDispatcher {
        let resolver = AssetResolver::from_arc(self.store.clone()).with_root(self.root.path());
        BatchDispatcher::new(resolver, options)
    }

    fn options(skip_fetch: bool, skip_pin: bool) -> DispatchOptions {
        DispatchOptions {
            skip_fetch,
            skip_pin,
            ..Default::default()
        }
    }
}

fn cid(s: &str) -> Cid {
    Cid::new(s).unwrap()
}

#[tokio::test]
async fn single_file_manifest_fetches_and_pins() {
    let fx = Fixture::new();
    fx.store.insert_file_as(cid("Qm123"), &b"hello"[..]);
    let manifest = Manifest::from_json(br#"{"Qm123":"a/b/out.txt"}"#, "test").unwrap();

    let report = fx.dispatcher(DispatchOptions::default()).run(&manifest).await;

    assert!(report.is_success());
    let path = fx.root.path().join("a/b/out.txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(!fx.root.path().join("a/b/Qm123").exists());
    assert!(fx.store.is_pinned(&cid("Qm123")));
    assert!(matches!(
        report.outcomes()[0].result,
        Ok(EntryAction::FetchedAndPinned(ObjectKind::File))
    ));
}

#[tokio::test]
async fn absolute_destination_is_rejected_without_side_effects() {
    let fx = Fixture::new();
    fx.store.insert_file_as(cid("Qm123"), &b"hello"[..]);
    let manifest = Manifest::from_json(br#"{"Qm123":"/etc/out.txt"}"#, "test").unwrap();

    let report = fx.dispatcher(DispatchOptions::default()).run(&manifest).await;

    assert!(!report.is_success());
    assert_eq!(report.failure_kind(), Some(FailureKind::PathSafety));
    assert!(matches!(
        report.outcomes()[0].result,
        Err(EntryError::PathSafety(_))
    ));
    assert_eq!(fx.store.get_calls(), 0);
    assert_eq!(fx.store.pin_calls(), 0);
    assert_eq!(std::fs::read_dir(fx.root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn escaping_destination_fails_but_batch_continues() {
    let fx = Fixture::new();
    fx.store.insert_file_as(cid("QmBad"), &b"bad"[..]);
    fx.store.insert_file_as(cid("QmGood"), &b"good"[..]);
    let manifest = Manifest::from_json(
        br#"{"QmBad":"../../escape.txt","QmGood":"ok/good.txt"}"#,
        "test",
    )
    .unwrap();

    let report = fx.dispatcher(DispatchOptions::default()).run(&manifest).await;

    assert_eq!(report.len(), 2);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.failure_kind(), Some(FailureKind::PathSafety));
    assert_eq!(std::fs::read(fx.root.path().join("ok/good.txt")).unwrap(), b"good");
    assert!(!fx.store.is_pinned(&cid("QmBad")));
    assert!(fx.store.is_pinned(&cid("QmGood")));
}

#[tokio::test]
async fn mode_table_with_a_failing_entry() {
    for (skip_fetch, skip_pin) in [(false, false), (true, false), (false, true), (true, true)] {
        let fx = Fixture::new();
        let broken = cid("QmBroken");
        fx.store.insert_file_as(broken.clone(), &b"broken"[..]);
        fx.store.inject(&broken, Fault::Get);
        fx.store.inject(&broken, Fault::Pin);
        fx.store.insert_file_as(cid("QmFine"), &b"fine"[..]);
        let manifest =
            Manifest::from_json(br#"{"QmBroken":"x.txt","QmFine":"y.txt"}"#, "test").unwrap();

        let report = fx
            .dispatcher(Fixture::options(skip_fetch, skip_pin))
            .run(&manifest)
            .await;
        let mode = Mode::from_flags(skip_fetch, skip_pin);

        assert_eq!(report.len(), 2, "{mode:?}");
        let fine = &report.outcomes()[1];
        assert_eq!(fine.cid, cid("QmFine"));
        let action = fine.result.as_ref().unwrap();
        match mode {
            Mode::FetchAndPin => {
                assert_eq!(*action, EntryAction::FetchedAndPinned(ObjectKind::File))
            }
            Mode::PinOnly => assert_eq!(*action, EntryAction::Pinned),
            Mode::FetchOnly => assert_eq!(*action, EntryAction::Fetched(ObjectKind::File)),
            Mode::Ignore => assert_eq!(*action, EntryAction::Ignored),
        }

        assert_eq!(
            fx.root.path().join("y.txt").exists(),
            mode.fetches(),
            "{mode:?}"
        );
        assert_eq!(fx.store.is_pinned(&cid("QmFine")), mode.pins(), "{mode:?}");
        assert!(!fx.store.is_pinned(&broken));

        if mode == Mode::Ignore {
            assert!(report.is_success());
            assert_eq!(fx.store.get_calls(), 0);
            assert_eq!(fx.store.pin_calls(), 0);
        } else {
            assert_eq!(report.failure_kind(), Some(FailureKind::Transfer), "{mode:?}");
        }
        if !mode.fetches() {
            assert_eq!(fx.store.get_calls(), 0, "{mode:?}");
        }
    }
}

#[tokio::test]
async fn fetch_failure_skips_pinning_of_that_entry() {
    let fx = Fixture::new();
    let broken = cid("QmBroken");
    fx.store.insert_file_as(broken.clone(), &b"x"[..]);
    fx.store.inject(&broken, Fault::Get);
    let manifest = Manifest::from_json(br#"{"QmBroken":"x.txt"}"#, "test").unwrap();

    let report = fx.dispatcher(DispatchOptions::default()).run(&manifest).await;

    assert!(!report.is_success());
    assert_eq!(fx.store.pin_calls(), 0);
}

#[tokio::test]
async fn dry_run_classifies_but_writes_nothing() {
    let fx = Fixture::new();
    let file = fx.store.insert_bytes(&b"data"[..]).unwrap();
    let tree = fx.store.insert_dir(vec![("d.txt".into(), file.clone())]).unwrap();
    let manifest: Manifest = [
        (file.clone(), "f.txt".to_owned()),
        (tree.clone(), "tree".to_owned()),
    ]
    .into_iter()
    .collect();

    let options = DispatchOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = fx.dispatcher(options).run(&manifest).await;

    assert!(report.is_success());
    let kinds: Vec<_> = report
        .outcomes()
        .iter()
        .map(|o| o.result.as_ref().unwrap().clone())
        .collect();
    assert_eq!(
        kinds,
        vec![
            EntryAction::Previewed {
                mode: Mode::FetchAndPin,
                kind: Some(ObjectKind::File)
            },
            EntryAction::Previewed {
                mode: Mode::FetchAndPin,
                kind: Some(ObjectKind::Directory)
            },
        ]
    );
    assert_eq!(fx.store.get_calls(), 0);
    assert_eq!(fx.store.pin_count(), 0);
    assert_eq!(std::fs::read_dir(fx.root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn dry_run_still_rejects_unsafe_paths() {
    let fx = Fixture::new();
    let manifest = Manifest::from_json(br#"{"Qm123":"../up.txt"}"#, "test").unwrap();
    let options = DispatchOptions {
        dry_run: true,
        ..Default::default()
    };

    let report = fx.dispatcher(options).run(&manifest).await;
    assert_eq!(report.failure_kind(), Some(FailureKind::PathSafety));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_keep_manifest_order() {
    let fx = Fixture::new();
    let mut manifest = Manifest::new();
    for i in 0..16 {
        let cid = fx.store.insert_bytes(format!("asset {i}").into_bytes()).unwrap();
        manifest.insert(cid, format!("batch/{i:02}.txt"));
    }

    let options = DispatchOptions {
        jobs: 4,
        ..Default::default()
    };
    let report = fx.dispatcher(options).run(&manifest).await;

    assert!(report.is_success());
    let reported: Vec<_> = report.outcomes().iter().map(|o| o.cid.clone()).collect();
    let expected: Vec<_> = manifest.cids().cloned().collect();
    assert_eq!(reported, expected);
    for i in 0..16 {
        let path = fx.root.path().join(format!("batch/{i:02}.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), format!("asset {i}"));
    }
    assert_eq!(fx.store.pin_count(), 16);
}

#[tokio::test]
async fn first_failure_decides_the_kind() {
    let fx = Fixture::new();
    let missing = cid("QmMissing");
    let manifest = Manifest::from_json(
        br#"{"QmMissing":"m.txt","QmOther":"/abs.txt"}"#,
        "test",
    )
    .unwrap();

    let report = fx.dispatcher(DispatchOptions::default()).run(&manifest).await;

    assert_eq!(report.failures().count(), 2);
    assert_eq!(report.failures().next().unwrap().0.cid, missing);
    assert_eq!(report.failure_kind(), Some(FailureKind::Transfer));
}
