// tests/ingest_dedup.rs
//
// Store-level guarantees: idempotent insertion, category filtering,
// recency ordering and the read limit.

use wellness_news::ingest::fingerprint;
use wellness_news::ingest::types::NewsItem;
use wellness_news::store::{InsertOutcome, NewsStore};

fn item(source: &str, title: &str, category: &str, ts: i64) -> NewsItem {
    NewsItem {
        id: fingerprint(source, title),
        title: title.into(),
        link: format!("https://{source}/{ts}"),
        source: source.into(),
        category: category.into(),
        ts,
        snippet: None,
        img: None,
    }
}

fn seeded() -> NewsStore {
    let store = NewsStore::new();
    let cats = ["uplifting", "health", "science"];
    for i in 0..30i64 {
        let cat = cats[(i % 3) as usize];
        // scrambled timestamps so insertion order != recency order
        let ts = (i * 7919) % 101;
        store.insert(item("a.org", &format!("story {i}"), cat, ts));
    }
    store
}

#[test]
fn repeated_pair_is_stored_once() {
    let store = NewsStore::new();
    for round in 0..5 {
        // different link/ts each round, same (source, title)
        let mut it = item("goodnewsnetwork.org", "Hope rises", "uplifting", round);
        it.link = format!("https://goodnewsnetwork.org/hope?utm={round}");
        let outcome = store.insert(it);
        if round == 0 {
            assert_eq!(outcome, InsertOutcome::Inserted);
        } else {
            assert_eq!(outcome, InsertOutcome::Duplicate);
        }
    }
    assert_eq!(store.query("all", 100).len(), 1);

    // Same headline from a second source is a separate entry.
    store.insert(item("positive.news", "Hope rises", "uplifting", 3));
    assert_eq!(store.query("all", 100).len(), 2);
}

#[test]
fn category_filter_only_returns_that_category() {
    let store = seeded();
    for cat in ["uplifting", "health", "science"] {
        let rows = store.query(cat, 100);
        assert_eq!(rows.len(), 10, "{cat}");
        assert!(rows.iter().all(|r| r.category == cat));
    }
    assert_eq!(store.query("all", 100).len(), 30);
    assert!(store.query("business", 100).is_empty());
}

#[test]
fn results_are_newest_first() {
    let store = seeded();
    for cat in ["all", "uplifting", "health"] {
        let rows = store.query(cat, 100);
        assert!(
            rows.windows(2).all(|w| w[0].ts >= w[1].ts),
            "{cat} not sorted by ts desc"
        );
    }
}

#[test]
fn limit_is_respected() {
    let store = seeded();
    for n in [0usize, 1, 5, 10, 29, 30, 31, 1000] {
        assert!(store.query("all", n).len() <= n);
        assert_eq!(store.query("all", n).len(), n.min(30));
        assert!(store.query("health", n).len() <= n);
    }
}
