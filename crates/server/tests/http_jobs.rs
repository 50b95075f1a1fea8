//! Drives jobs against a live server over HTTP.

use std::sync::Arc;
use std::time::Duration;

use batchwright_core::{
    EngineConfig, JobEngine, JobState, PollEvent, Poller, PollerConfig, Snapshot,
};
use batchwright_db::Database;
use batchwright_server::{create_app, state, AppState, HttpEndpoint};
use pretty_assertions::assert_eq;

struct Server {
    url: String,
    state: Arc<AppState>,
    _data: tempfile::TempDir,
}

async fn start(batch_size: usize) -> Server {
    let data = tempfile::tempdir().unwrap();
    let db = Database::new_in_memory().await.unwrap();
    let config = EngineConfig::with_data_dir(data.path()).batch_size(batch_size);
    let engine = JobEngine::new(
        &config,
        state::handlers(db.clone(), &data.path().join("backups")),
    )
    .unwrap();
    let state = AppState::new(engine, db);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        url: format!("http://{addr}"),
        state,
        _data: data,
    }
}

fn fast() -> PollerConfig {
    PollerConfig {
        tick: Duration::from_millis(5),
        busy_retry: Duration::from_millis(5),
        ..PollerConfig::default()
    }
}

#[tokio::test]
async fn test_import_driven_over_http() {
    let server = start(2).await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("customers.csv");
    let mut csv = String::from("email,first_name,last_name,city\n");
    for i in 0..5 {
        csv.push_str(&format!("c{i}@example.com,F{i},L{i},Town\n"));
    }
    csv.push_str("c0@example.com,Dup,Dup,Town\n");
    std::fs::write(&file, csv).unwrap();

    let client = HttpEndpoint::new(&server.url);
    let started = client
        .initiate(batchwright_core::JobType::Customers, &file)
        .await
        .unwrap();
    assert_eq!(started.total, 6);
    assert_eq!(started.source_name, "customers.csv");

    let mut progress = Vec::new();
    let done = Poller::new(client.clone(), fast())
        .run(|event| {
            if let PollEvent::Progress(status) = event {
                progress.push(status.processed);
            }
        })
        .await
        .unwrap();

    assert_eq!(done.state, JobState::Complete);
    assert_eq!((done.success, done.failed), (5, 1));
    assert_eq!(progress, vec![2, 4]);
    assert_eq!(server.state.db.record_counts().await.unwrap().customers, 5);

    // The finished snapshot stays readable until cleared.
    let Snapshot::Active(status) = client.status().await.unwrap() else {
        panic!("expected the finished job");
    };
    assert_eq!(status.state, JobState::Complete);
}

#[tokio::test]
async fn test_clear_on_finish_returns_server_to_idle() {
    let server = start(50).await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("stock.csv");
    std::fs::write(&file, "sku,name,price,quantity\nA,Apple,1.00,1\n").unwrap();

    let client = HttpEndpoint::new(&server.url);
    client
        .initiate(batchwright_core::JobType::Products, &file)
        .await
        .unwrap();

    let mut cleared = false;
    let config = PollerConfig {
        clear_on_finish: true,
        ..fast()
    };
    Poller::new(client.clone(), config)
        .run(|event| {
            if let PollEvent::Cleared(report) = event {
                cleared = report.cleared;
            }
        })
        .await
        .unwrap();

    assert!(cleared);
    assert_eq!(client.status().await.unwrap(), Snapshot::idle());
}

#[tokio::test]
async fn test_second_upload_is_rejected_while_running() {
    let server = start(50).await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("stock.csv");
    std::fs::write(&file, "sku,name,price,quantity\nA,Apple,1.00,1\n").unwrap();

    let client = HttpEndpoint::new(&server.url);
    client
        .initiate(batchwright_core::JobType::Products, &file)
        .await
        .unwrap();
    let err = client
        .initiate(batchwright_core::JobType::Products, &file)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
}
