use policy::{Config, GrantStore, MemorySourceLoader, Permissions, Subject, Url};
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const GRANTS_PER_SOURCE: usize = 25;

fn tagged_policy(tag: &str) -> String {
    let mut text = String::new();
    for i in 0..GRANTS_PER_SOURCE {
        writeln!(
            text,
            r#"grant {{ permission java.lang.RuntimePermission "{tag}.{i}"; }};"#
        )
        .unwrap();
    }
    text
}

fn store() -> (GrantStore, Url, Url) {
    let a = Url::parse("memory:/a.policy").unwrap();
    let b = Url::parse("memory:/b.policy").unwrap();
    let sources = MemorySourceLoader::new()
        .with(a.clone(), tagged_policy("a"))
        .with(b.clone(), tagged_policy("b"));
    (GrantStore::standard(Arc::new(sources)), a, b)
}

#[test]
fn test_readers_never_observe_mixed_snapshots() {
    let (store, a, b) = store();
    let config = Config::default();
    store.refresh(&[a.clone()], &config).unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let subject = Subject::new();
                let mut last_generation = 0;
                loop {
                    let finished = done.load(Ordering::Acquire);

                    let generation = store.snapshot().generation();
                    assert!(generation >= last_generation);
                    last_generation = generation;

                    let Permissions::Granted(granted) = store.permissions(&subject) else {
                        panic!("unexpected privileged result");
                    };
                    assert_eq!(granted.len(), GRANTS_PER_SOURCE);
                    let tag = &granted.iter().next().unwrap().name[..1];
                    assert!(
                        granted.iter().all(|c| c.name.starts_with(tag)),
                        "mixed snapshot observed"
                    );

                    if finished {
                        break;
                    }
                }
            });
        }

        s.spawn(|| {
            for i in 0..100 {
                let locator = if i % 2 == 0 { &b } else { &a };
                store.refresh(std::slice::from_ref(locator), &config).unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert_eq!(store.snapshot().generation(), 101);
}

#[test]
fn test_concurrent_refreshes_are_serialized() {
    let (store, a, b) = store();
    let config = Config::default();

    thread::scope(|s| {
        for locator in [&a, &b] {
            let store = &store;
            let config = &config;
            s.spawn(move || {
                for _ in 0..20 {
                    store.refresh(std::slice::from_ref(locator), config).unwrap();
                }
            });
        }
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.generation(), 40);
    assert_eq!(snapshot.len(), GRANTS_PER_SOURCE);
}
