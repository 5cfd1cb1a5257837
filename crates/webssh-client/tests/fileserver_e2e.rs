//! End-to-end tests against the reference file server.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use webssh_client::{
    ChannelState, ClientConfig, DirectorySink, Target, TransferClient, TransferError, TransferId,
    TransferProgress, TransferState, UploadMetadata, UploadPayload,
};
use webssh_example_fileserver::ServerConfig;

struct Fixture {
    client: TransferClient,
    root: TempDir,
    target: Target,
}

impl Fixture {
    fn host(&self) -> &Path {
        self.root.path()
    }
}

async fn start(tune: impl FnOnce(ServerConfig) -> ServerConfig) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("box")).unwrap();

    let config = tune(ServerConfig {
        prefix: "webssh".to_string(),
        ..ServerConfig::new(root.path())
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(webssh_example_fileserver::serve(listener, config));

    Fixture {
        client: client_for(addr),
        root,
        target: Target::labeled("box", "test box"),
    }
}

fn client_for(addr: SocketAddr) -> TransferClient {
    let config = ClientConfig::new(&format!("http://{addr}"))
        .unwrap()
        .with_prefix("/webssh/")
        .with_timeout(Duration::from_secs(30));
    TransferClient::connect(config).unwrap()
}

#[tokio::test]
async fn ten_megabyte_upload_reports_progress_to_completion() {
    let fx = start(|c| ServerConfig {
        chunk_size: 1024 * 1024,
        chunk_delay: Duration::from_millis(5),
        ..c
    })
    .await;
    let payload = vec![0xA5u8; 10 * 1024 * 1024];

    let id = fx
        .client
        .submit_upload(
            &fx.target,
            &UploadMetadata::new("/srv/uploads", "big.bin"),
            UploadPayload::from_bytes(payload),
        )
        .await
        .unwrap();
    assert_eq!(id, TransferId::new("t1"));

    let mut channel = fx.client.subscribe_progress(&id).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = channel.next().await {
        events.push(event.unwrap());
    }

    assert!(events.windows(2).all(|w| w[0].bytes_transferred <= w[1].bytes_transferred));
    let last = events.last().unwrap();
    assert_eq!(last.state, TransferState::Completed);
    assert_eq!(last.bytes_transferred, 10_485_760);
    assert_eq!(last.total_bytes, Some(10_485_760));
    assert_eq!(channel.state(), ChannelState::Closed(TransferState::Completed));

    let written = std::fs::metadata(fx.host().join("box/srv/uploads/big.bin")).unwrap();
    assert_eq!(written.len(), 10_485_760);
}

#[tokio::test]
async fn missing_download_is_not_found() {
    let fx = start(|c| c).await;
    let err = fx
        .client
        .request_download(&fx.target, "/etc/missing.conf")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(err.to_string().contains("test box"));
}

#[tokio::test]
async fn download_and_save() {
    let fx = start(|c| c).await;
    std::fs::create_dir_all(fx.host().join("box/a/b")).unwrap();
    std::fs::write(fx.host().join("box/a/b/report.csv"), "x,y\n1,2\n").unwrap();

    let result = fx
        .client
        .request_download(&fx.target, "/a/b/report.csv")
        .await
        .unwrap();
    assert_eq!(result.suggested_name, "report.csv");
    assert_eq!(result.bytes, b"x,y\n1,2\n");

    let out = tempfile::tempdir().unwrap();
    let saved = fx
        .client
        .download_to(&fx.target, "/a/b/report.csv", &DirectorySink::new(out.path()))
        .await
        .unwrap();
    assert_eq!(saved, out.path().join("report.csv"));
    assert_eq!(std::fs::read(saved).unwrap(), b"x,y\n1,2\n");
}

#[tokio::test]
async fn listing_and_reachability() {
    let fx = start(|c| c).await;
    std::fs::create_dir_all(fx.host().join("box/srv/logs")).unwrap();
    std::fs::write(fx.host().join("box/srv/app.conf"), "port=1").unwrap();

    let entries = fx.client.list_directory(&fx.target, "/srv").await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
    assert_eq!(names, vec![("logs", true), ("app.conf", false)]);
    assert_eq!(entries[1].size, 6);

    let err = fx.client.list_directory(&fx.target, "/nope").await.unwrap_err();
    assert!(err.is_not_found());

    assert!(fx.client.check_reachable(&fx.target).await.unwrap());
    assert!(!fx.client.check_reachable(&Target::new("elsewhere")).await.unwrap());
}

#[tokio::test]
async fn abandoned_subscription_leaves_transfer_running() {
    let fx = start(|c| ServerConfig {
        chunk_size: 1024,
        chunk_delay: Duration::from_millis(10),
        ..c
    })
    .await;

    let id = fx
        .client
        .submit_upload(
            &fx.target,
            &UploadMetadata::new("/tmp", "slow.bin"),
            UploadPayload::from_bytes(vec![1u8; 16 * 1024]),
        )
        .await
        .unwrap();

    let mut channel = fx.client.subscribe_progress(&id).await.unwrap();
    let first = channel.next().await.unwrap().unwrap();
    assert!(!first.is_terminal());
    drop(channel);

    let outcome = poll_until_terminal(&fx.client, &id).await;
    assert_eq!(outcome.state, TransferState::Completed);
    assert_eq!(outcome.bytes_transferred, 16 * 1024);
}

async fn poll_until_terminal(client: &TransferClient, id: &TransferId) -> TransferProgress {
    for _ in 0..200 {
        let snapshot = client.query_progress(id).await.unwrap();
        if snapshot.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("transfer {id} never finished");
}

#[tokio::test]
async fn resubscribe_after_completion_yields_only_terminal_state() {
    let fx = start(|c| c).await;
    let id = fx
        .client
        .submit_upload(
            &fx.target,
            &UploadMetadata::new("/tmp", "a.txt"),
            UploadPayload::from_bytes("hello"),
        )
        .await
        .unwrap();
    poll_until_terminal(&fx.client, &id).await;

    let events: Vec<_> = fx.client.subscribe_progress(&id).await.unwrap().collect().await;
    assert_eq!(events.len(), 1);
    let only = events[0].as_ref().unwrap();
    assert_eq!(only.state, TransferState::Completed);
    assert_eq!(only.bytes_transferred, 5);
}

#[tokio::test]
async fn finished_transfers_are_forgotten_after_retention() {
    let fx = start(|c| ServerConfig {
        retention: Duration::ZERO,
        ..c
    })
    .await;
    let id = fx
        .client
        .submit_upload(
            &fx.target,
            &UploadMetadata::new("/tmp", "a.txt"),
            UploadPayload::from_bytes("hello"),
        )
        .await
        .unwrap();

    let mut forgotten = false;
    for _ in 0..200 {
        match fx.client.query_progress(&id).await {
            Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            Err(e) => {
                assert!(e.is_not_found(), "{e}");
                forgotten = true;
                break;
            }
        }
    }
    assert!(forgotten);
    let err = fx.client.subscribe_progress(&id).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn unknown_transfer_is_not_found() {
    let fx = start(|c| c).await;
    let id = TransferId::new("t404");
    assert!(fx.client.subscribe_progress(&id).await.unwrap_err().is_not_found());
    assert!(fx.client.query_progress(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn rejected_uploads() {
    let fx = start(|c| ServerConfig {
        max_upload: 1024,
        ..c
    })
    .await;

    let err = fx
        .client
        .submit_upload(
            &fx.target,
            &UploadMetadata::new("/tmp", "big.bin"),
            UploadPayload::from_bytes(vec![0u8; 4096]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Rejected { .. }), "{err}");
    assert!(!err.is_retryable());

    let err = fx
        .client
        .submit_upload(
            &Target::new("elsewhere"),
            &UploadMetadata::new("/tmp", "a.txt"),
            UploadPayload::from_bytes("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Rejected { .. }), "{err}");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(addr)
        .request_download(&Target::new("box"), "/a.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Transport { .. }), "{err}");
    assert!(err.is_retryable());
}

/// A progress endpoint that sends three frames and then drops the socket.
async fn flaky_progress_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for bytes in [100u64, 200, 300] {
            let frame = TransferProgress {
                id: TransferId::new("t7"),
                bytes_transferred: bytes,
                total_bytes: Some(1000),
                state: TransferState::InProgress,
                message: None,
            };
            let text = serde_json::to_string(&frame).unwrap();
            ws.send(Message::Text(text.into())).await.unwrap();
        }
        drop(ws);
    });
    addr
}

#[tokio::test]
async fn dropped_channel_is_connection_lost_not_failed() {
    let addr = flaky_progress_server().await;
    let client = client_for(addr);

    let mut channel = client.subscribe_progress(&TransferId::new("t7")).await.unwrap();
    for expected in [100, 200, 300] {
        let event = channel.next().await.unwrap().unwrap();
        assert_eq!(event.bytes_transferred, expected);
    }

    let err = channel.next().await.unwrap().unwrap_err();
    assert!(
        matches!(err, TransferError::ConnectionLost { events: 3, .. }),
        "{err}"
    );
    assert_eq!(channel.state(), ChannelState::ClosedWithError);
    assert!(channel.next().await.is_none());
}

/// Answers one HTTP request with a 200 envelope carrying `msg`.
async fn envelope_error_server(msg: &'static str) -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let body = serde_json::json!({ "Msg": msg }).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    });
    addr
}

#[tokio::test]
async fn progress_poll_failure_is_not_mistaken_for_a_missing_transfer() {
    let addr = envelope_error_server("ssh: handshake failed: connection reset by peer").await;
    let err = client_for(addr)
        .query_progress(&TransferId::new("t2"))
        .await
        .unwrap_err();
    assert!(!err.is_not_found(), "{err}");
    assert!(matches!(err, TransferError::Rejected { .. }), "{err}");
    assert!(err.to_string().contains("handshake failed"));

    let addr = envelope_error_server("transfer t2 not found").await;
    let err = client_for(addr)
        .query_progress(&TransferId::new("t2"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}
