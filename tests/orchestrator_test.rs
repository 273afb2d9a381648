use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use stembox::config::Config;
use stembox::input::{FileHandle, InputMode, Payload, StemCount};
use stembox::job::JobStatus;
use stembox::orchestrator::{Orchestrator, OrchestratorError, PhaseKind};
use stembox::tracker::WsConnector;

const BUNDLE: &[u8] = b"PK\x03\x04stems";

type Feed = UnboundedSender<Message>;

/// In-process stand-in for the separation backend
#[derive(Clone)]
struct Backend {
    feeds: Arc<Mutex<HashMap<String, UnboundedReceiver<Message>>>>,
    finished: Arc<Mutex<HashSet<String>>>,
    jobs: UnboundedSender<(String, Feed)>,
    /// Job ids whose status socket the client closed
    closed: UnboundedSender<String>,
}

/// Handles on the running mock backend
struct Harness {
    config: Config,
    jobs: UnboundedReceiver<(String, Feed)>,
    closed: UnboundedReceiver<String>,
}

fn text(frame: &str) -> Message {
    Message::Text(frame.to_string().into())
}

enum SocketEvent {
    Outbound(Option<Message>),
    Inbound(Option<Result<Message, axum::Error>>),
}

async fn process(State(backend): State<Backend>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body);
    if !body.contains("name=\"stems\"") {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "stems missing"}))).into_response();
    }
    if body.contains("filename=\"notes.txt\"") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "Unsupported file type"})),
        )
            .into_response();
    }

    let job_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    backend.feeds.lock().unwrap().insert(job_id.clone(), rx);
    backend.finished.lock().unwrap().insert(job_id.clone());
    let _ = backend.jobs.send((job_id.clone(), tx));

    Json(json!({ "job_id": job_id })).into_response()
}

async fn status(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(backend): State<Backend>,
) -> Response {
    let feed = backend.feeds.lock().unwrap().remove(&job_id);
    let closed = backend.closed.clone();
    ws.on_upgrade(move |socket| pump(socket, job_id, feed, closed))
}

async fn pump(
    mut socket: WebSocket,
    job_id: String,
    feed: Option<UnboundedReceiver<Message>>,
    closed: UnboundedSender<String>,
) {
    let Some(mut feed) = feed else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    loop {
        let event = tokio::select! {
            frame = feed.recv() => SocketEvent::Outbound(frame),
            inbound = socket.recv() => SocketEvent::Inbound(inbound),
        };

        match event {
            SocketEvent::Outbound(Some(frame)) => {
                if socket.send(frame).await.is_err() {
                    break;
                }
            }
            // Test dropped the feed: hang up without reporting a client close
            SocketEvent::Outbound(None) => return,
            SocketEvent::Inbound(Some(Ok(Message::Close(_)))) | SocketEvent::Inbound(None) => break,
            SocketEvent::Inbound(Some(Err(_))) => break,
            SocketEvent::Inbound(Some(Ok(_))) => {}
        }
    }

    let _ = closed.send(job_id);
}

async fn download(Path(job_id): Path<String>, State(backend): State<Backend>) -> Response {
    if !backend.finished.lock().unwrap().contains(&job_id) {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "File not found"}))).into_response();
    }
    ([(header::CONTENT_TYPE, "application/zip")], BUNDLE).into_response()
}

/// Starts the mock backend with a config pointing at it
async fn start_backend() -> Harness {
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let backend = Backend {
        feeds: Arc::new(Mutex::new(HashMap::new())),
        finished: Arc::new(Mutex::new(HashSet::new())),
        jobs: jobs_tx,
        closed: closed_tx,
    };

    let app = Router::new()
        .route("/process", post(process))
        .route("/ws/status/{job_id}", get(status))
        .route("/download/stems/{job_id}", get(download))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = Config::default()
        .with_backend_url(format!("http://{addr}"))
        .unwrap();
    Harness {
        config,
        jobs: jobs_rx,
        closed: closed_rx,
    }
}

async fn next_closed(closed: &mut UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), closed.recv())
        .await
        .expect("timed out waiting for the client to close its socket")
        .expect("backend stopped")
}

async fn wait_for_status(orchestrator: &Orchestrator<WsConnector>, label: &str) {
    let mut updates = orchestrator.subscribe().expect("no tracked job");
    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|status| status.as_str() == label),
    )
    .await
    .expect("timed out waiting for status")
    .expect("status channel closed");
}

#[tokio::test]
async fn test_full_flow_over_websocket() {
    let Harness {
        config,
        mut jobs,
        mut closed,
    } = start_backend().await;
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();

    {
        let selector = orchestrator.edit().unwrap();
        selector.set_mode(InputMode::LinkReference);
        selector
            .set_payload(Payload::Url("  https://youtube.com/watch?v=abc  ".to_string()))
            .unwrap();
        selector.set_variant_count(StemCount::Two);
    }
    assert!(orchestrator.can_submit());

    let job_id = orchestrator.submit().await.unwrap();
    let (backend_id, feed) = jobs.recv().await.unwrap();
    assert_eq!(job_id.as_str(), backend_id);

    assert_eq!(orchestrator.phase().kind(), PhaseKind::Tracking);
    assert_eq!(orchestrator.status(), Some(JobStatus::queued()));
    assert!(!orchestrator.can_retrieve());

    // Binary frames carrying JSON are status frames too
    feed.send(Message::Binary(br#"{"status":"processing"}"#.to_vec().into()))
        .unwrap();
    wait_for_status(&orchestrator, "processing").await;
    assert!(!orchestrator.can_retrieve());

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("stems.zip");
    let early = orchestrator.retrieve(&dest).await.unwrap_err();
    assert!(matches!(early, OrchestratorError::NotReady(_)));
    assert!(!dest.exists());

    feed.send(text("garbage")).unwrap();
    feed.send(text(r#"{"status":"done"}"#)).unwrap();

    let done = tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_until_done())
        .await
        .expect("timed out waiting for done")
        .unwrap();
    assert_eq!(done, job_id);
    assert_eq!(orchestrator.phase().kind(), PhaseKind::Done);
    assert!(orchestrator.can_retrieve());

    // The client hangs up once the job is done
    assert_eq!(next_closed(&mut closed).await, backend_id);

    let bundle = orchestrator.retrieve(&dest).await.unwrap();
    assert_eq!(bundle.bytes, BUNDLE.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), BUNDLE);

    let snapshot = orchestrator.metrics().snapshot();
    assert_eq!(snapshot.submissions_accepted, 1);
    assert_eq!(snapshot.bundles_retrieved, 1);

    orchestrator.reset().await;
    assert_eq!(orchestrator.phase().kind(), PhaseKind::Editing);
    assert!(orchestrator.status().is_none());
}

#[tokio::test]
async fn test_undecodable_binary_frame_is_ignored() {
    let Harness {
        config,
        mut jobs,
        mut closed,
    } = start_backend().await;
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();
    orchestrator
        .edit()
        .unwrap()
        .set_payload(Payload::Url("https://youtube.com/watch?v=abc".to_string()))
        .unwrap();

    orchestrator.submit().await.unwrap();
    let (backend_id, feed) = jobs.recv().await.unwrap();

    feed.send(Message::Binary(vec![0xff, 0xfe, 0xfd].into())).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.status(), Some(JobStatus::queued()));
    assert_eq!(orchestrator.metrics().snapshot().status_updates, 0);

    // The channel survived the bad frame
    feed.send(text(r#"{"status":"separating"}"#)).unwrap();
    wait_for_status(&orchestrator, "separating").await;
    assert_eq!(orchestrator.metrics().snapshot().reconnects, 0);

    orchestrator.reset().await;
    assert_eq!(next_closed(&mut closed).await, backend_id);
}

#[tokio::test]
async fn test_rejected_upload_returns_to_editing() {
    let Harness {
        config, mut jobs, ..
    } = start_backend().await;
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();

    let file = FileHandle::from_bytes("notes.txt", b"not audio".to_vec());
    {
        let selector = orchestrator.edit().unwrap();
        selector.set_mode(InputMode::Upload);
        selector.set_payload(Payload::File(file.clone())).unwrap();
    }

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Submit(_)));
    assert_eq!(orchestrator.phase().kind(), PhaseKind::Editing);
    assert_eq!(orchestrator.error_message().as_deref(), Some("Unsupported file type"));
    assert_eq!(
        orchestrator.selector().selection().payload,
        Some(Payload::File(file))
    );
    assert!(orchestrator.status().is_none());
    assert!(jobs.try_recv().is_err());
}

#[tokio::test]
async fn test_new_job_replaces_previous_channel() {
    let Harness {
        config,
        mut jobs,
        mut closed,
    } = start_backend().await;
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();

    {
        let selector = orchestrator.edit().unwrap();
        selector
            .set_payload(Payload::Url("https://youtube.com/watch?v=first".to_string()))
            .unwrap();
    }
    let first = orchestrator.submit().await.unwrap();
    let (first_id, first_feed) = jobs.recv().await.unwrap();
    first_feed.send(text(r#"{"status":"processing"}"#)).unwrap();
    wait_for_status(&orchestrator, "processing").await;

    orchestrator.reset().await;
    assert_eq!(next_closed(&mut closed).await, first_id);

    let second = orchestrator.submit().await.unwrap();
    let (_, _second_feed) = jobs.recv().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(orchestrator.status(), Some(JobStatus::queued()));

    // Late frames for the first job must not reach the new one
    let _ = first_feed.send(text(r#"{"status":"done"}"#));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.status(), Some(JobStatus::queued()));
    assert!(!orchestrator.can_retrieve());
    assert!(closed.try_recv().is_err());
}
