// tests/api_stream.rs
//
// Push connection lifecycle: immediate snapshot, heartbeat and periodic
// snapshots on their own timers, and full teardown on disconnect.
// Time is paused; tokio auto-advances to the next timer when idle.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower::ServiceExt as _;

use wellness_news::api::{router, AppState};
use wellness_news::ingest::fetcher::StaticFetcher;
use wellness_news::prefs::MemoryPrefSink;
use wellness_news::scheduler::NewsService;
use wellness_news::stream::{snapshot_stream, Frame, StreamSettings};

use common::{registry, rss, service, HEALTH_URL};

fn health_service(ttl: Duration) -> (Arc<NewsService>, Arc<StaticFetcher>) {
    let fetcher = Arc::new(
        StaticFetcher::new().with_body(HEALTH_URL, rss(&[("Stretch daily", None), ("Drink water", None)])),
    );
    let svc = service(registry(&[(HEALTH_URL, "health")]), fetcher.clone(), ttl);
    (svc, fetcher)
}

#[tokio::test(start_paused = true)]
async fn sse_endpoint_sends_snapshot_then_ping() {
    let (svc, _) = health_service(Duration::from_secs(60));
    let app = router(AppState::new(svc.clone(), Arc::new(MemoryPrefSink::new())));

    let req = Request::builder()
        .uri("/news/stream?category=health")
        .body(Body::empty())
        .expect("build GET");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    let ctype = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(ctype.starts_with("text/event-stream"), "{ctype}");
    assert_eq!(svc.active_streams(), 1);

    let start = Instant::now();
    let mut body = resp.into_body().into_data_stream();

    let first = body.next().await.expect("first frame").expect("bytes");
    let first = String::from_utf8_lossy(&first).to_string();
    assert!(first.starts_with("data: ["), "{first}");
    assert!(first.contains("Stretch daily"));
    assert_eq!(Instant::now(), start);

    let second = body.next().await.expect("second frame").expect("bytes");
    let second = String::from_utf8_lossy(&second).to_string();
    assert!(second.contains("event: ping"), "{second}");
    assert!(second.contains("data: {}"), "{second}");
    assert_eq!(Instant::now() - start, Duration::from_secs(15));

    drop(body);
    assert_eq!(svc.active_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn push_timer_delivers_fresh_full_snapshots() {
    let (svc, fetcher) = health_service(Duration::from_secs(10));
    let settings = StreamSettings {
        snapshot_limit: 60,
        heartbeat: Duration::from_secs(15),
        push_interval: Duration::from_secs(20),
    };
    let mut s = Box::pin(snapshot_stream(svc.clone(), "health".into(), settings));
    let start = Instant::now();

    let mut timeline = Vec::new();
    for _ in 0..4 {
        let f = s.next().await.expect("frame");
        timeline.push(((Instant::now() - start).as_secs(), f));
    }

    assert!(matches!(&timeline[0], (0, Frame::Snapshot(v)) if v.len() == 2));
    assert_eq!(timeline[1], (15, Frame::Ping));
    assert!(matches!(&timeline[2], (20, Frame::Snapshot(v)) if v.len() == 2));
    assert_eq!(timeline[3], (30, Frame::Ping));

    // The push at 20s found the 10s TTL expired and refreshed.
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn snapshot_respects_limit_and_category() {
    let (svc, _) = health_service(Duration::from_secs(60));
    let settings = StreamSettings {
        snapshot_limit: 1,
        ..StreamSettings::default()
    };

    let mut health = Box::pin(snapshot_stream(svc.clone(), "health".into(), settings));
    match health.next().await {
        Some(Frame::Snapshot(v)) => assert_eq!(v.len(), 1),
        other => panic!("expected snapshot, got {other:?}"),
    }

    let mut other = Box::pin(snapshot_stream(svc.clone(), "science".into(), settings));
    assert_eq!(other.next().await, Some(Frame::Snapshot(Vec::new())));
    assert_eq!(svc.active_streams(), 2);
}

/// Stand-in for a client connection: pumps frames into a log until closed.
struct TestConnection {
    frames: Arc<Mutex<Vec<Frame>>>,
    pump: JoinHandle<()>,
}

impl TestConnection {
    fn open(svc: Arc<NewsService>, category: &str) -> Self {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let log = frames.clone();
        let stream = snapshot_stream(svc, category.to_string(), StreamSettings::default());
        let pump = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(f) = stream.next().await {
                log.lock().unwrap().push(f);
            }
        });
        Self { frames, pump }
    }

    fn received(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    async fn close(self) {
        self.pump.abort();
        let _ = self.pump.await;
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_all_timers() {
    let (svc, fetcher) = health_service(Duration::from_secs(1));
    let conn = TestConnection::open(svc.clone(), "health");

    // snapshot@0, ping@15, and both timers firing at 30
    tokio::time::sleep(Duration::from_secs(31)).await;
    let seen = conn.received();
    assert_eq!(seen, 4);
    assert_eq!(svc.active_streams(), 1);
    let fetches = fetcher.calls();
    let log = conn.frames.clone();

    conn.close().await;
    assert_eq!(svc.active_streams(), 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(log.lock().unwrap().len(), seen, "no frames after close");
    assert_eq!(fetcher.calls(), fetches, "no refresh from a closed connection");
}

#[tokio::test(start_paused = true)]
async fn refresh_started_by_a_connection_outlives_it() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_body(HEALTH_URL, rss(&[("Slow feed story", None)]))
            .with_delay(Duration::from_secs(5)),
    );
    let svc = service(registry(&[(HEALTH_URL, "health")]), fetcher.clone(), Duration::from_secs(60));

    // Connect, then hang up while the first snapshot is still waiting on the fetch.
    let conn = TestConnection::open(svc.clone(), "health");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.received(), 0);
    conn.close().await;
    assert_eq!(svc.active_streams(), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(svc.store().len(), 1, "in-flight cycle still merged");
}
