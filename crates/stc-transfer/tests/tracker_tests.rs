use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stc_transfer::{Fetcher, ProgressSink, TransferError, TransferEvent, TransferTracker};
use tokio::sync::oneshot;

type Release = oneshot::Sender<Result<Vec<u8>, TransferError>>;

/// Reports a scripted `(loaded, total)` pair, then waits for the test to release it.
struct GatedFetcher {
    scripted: HashMap<String, (u64, Option<u64>)>,
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<Vec<u8>, TransferError>>>>,
}

impl GatedFetcher {
    fn new(script: &[(&str, u64, Option<u64>)]) -> (Arc<Self>, HashMap<String, Release>) {
        let mut gates = HashMap::new();
        let mut releases = HashMap::new();
        for (url, _, _) in script {
            let (tx, rx) = oneshot::channel();
            gates.insert((*url).to_string(), rx);
            releases.insert((*url).to_string(), tx);
        }
        let scripted = script.iter().map(|(u, l, t)| ((*u).to_string(), (*l, *t))).collect();
        (Arc::new(Self { scripted, gates: Mutex::new(gates) }), releases)
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, url: &str, progress: &ProgressSink) -> Result<Vec<u8>, TransferError> {
        let (loaded, total) = self.scripted[url];
        progress.update(loaded, total);
        let gate = self.gates.lock().unwrap().remove(url).expect("gate per url");
        gate.await.unwrap_or_else(|_| Err(TransferError::Aborted { url: url.to_string() }))
    }
}

#[tokio::test]
async fn aggregate_follows_mean_and_hits_100_only_when_all_complete() -> anyhow::Result<()> {
    let (fetcher, mut releases) = GatedFetcher::new(&[("a", 50, Some(100)), ("b", 300, None)]);
    let tracker = TransferTracker::new(fetcher);
    let session = tracker.start(["a", "b"]);
    let (handles, mut monitor) = session.into_parts();
    let mut progress = monitor.subscribe();

    // a at 0.5, b at 0 (unknown total)
    progress.wait_for(|p| (*p - 25.0).abs() < 1e-9).await?;

    releases.remove("a").unwrap().send(Ok(b"alpha".to_vec())).unwrap();
    progress.wait_for(|p| (*p - 50.0).abs() < 1e-9).await?;
    assert!(monitor.percent() < 100.0);

    releases.remove("b").unwrap().send(Ok(b"bravo".to_vec())).unwrap();
    let mut payloads = Vec::new();
    for handle in handles {
        payloads.push(handle.join().await?);
    }
    assert_eq!(&*payloads[0], b"alpha");
    assert_eq!(&*payloads[1], b"bravo");

    let mut completed = Vec::new();
    let mut last = None;
    while let Some(event) = monitor.next_event().await {
        match &event {
            TransferEvent::Completed { url, .. } => completed.push(url.clone()),
            TransferEvent::AllDone { percent } => assert_eq!(*percent, 100.0),
            _ => {}
        }
        last = Some(event);
    }
    completed.sort();
    assert_eq!(completed, ["a", "b"]);
    assert!(matches!(last, Some(TransferEvent::AllDone { .. })), "terminal event comes last");
    assert_eq!(monitor.percent(), 100.0);
    Ok(())
}

#[tokio::test]
async fn one_failure_does_not_cancel_siblings() -> anyhow::Result<()> {
    let (fetcher, mut releases) = GatedFetcher::new(&[("ok", 10, Some(10)), ("missing", 0, None)]);
    let tracker = TransferTracker::new(fetcher);
    let session = tracker.start(["ok", "missing"]);

    releases
        .remove("missing")
        .unwrap()
        .send(Err(TransferError::Status { url: "missing".into(), status: 404, status_text: "Not Found".into() }))
        .unwrap();
    releases.remove("ok").unwrap().send(Ok(vec![1, 2, 3])).unwrap();

    let (handles, mut monitor) = session.into_parts();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.join().await);
    }
    assert_eq!(outcomes[0].as_deref().ok(), Some(&[1u8, 2, 3][..]));
    let err = outcomes[1].clone().unwrap_err();
    assert_eq!(err.status(), 404);
    assert_eq!(err.status_text(), "Not Found");

    let percent = monitor.wait_all_done().await.expect("all done fires after failures too");
    assert_eq!(percent, 50.0);
    Ok(())
}

#[tokio::test]
async fn try_join_all_reports_first_failure_in_order() {
    let (fetcher, mut releases) = GatedFetcher::new(&[("x", 0, None), ("y", 0, None)]);
    let session = TransferTracker::new(fetcher).start(["x", "y"]);
    releases.remove("x").unwrap().send(Err(TransferError::Aborted { url: "x".into() })).unwrap();
    releases.remove("y").unwrap().send(Ok(Vec::new())).unwrap();
    let err = session.try_join_all().await.unwrap_err();
    assert_eq!(err.url(), "x");
}

#[tokio::test]
async fn sessions_are_independent_and_empty_sets_finish_immediately() {
    let (fetcher, mut releases) = GatedFetcher::new(&[("p", 5, Some(10))]);
    let tracker = TransferTracker::new(fetcher);
    let first = tracker.start(["p"]);
    let (_, mut empty_monitor) = tracker.start(Vec::<String>::new()).into_parts();

    assert_eq!(empty_monitor.wait_all_done().await, Some(100.0));

    releases.remove("p").unwrap().send(Ok(vec![0; 10])).unwrap();
    let done = first.join_all().await;
    assert_eq!(done.len(), 1);
    assert!(done[0].1.is_ok());
}
