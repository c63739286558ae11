//! End-to-end tests for the hub socket.
//!
//! Each test starts a hub on a socket inside a temp dir and talks to it with
//! `HubConnection`, the same way apps, clients and UI sessions do.

use std::path::{Path, PathBuf};
use std::time::Duration;

use deskhub_core::Directories;
use deskhub_daemon::{ServerOptions, run};
use deskhub_rpc::{Frame, FrameCodec, HubConnection, Role, UiCommand, UiEvent};
use deskhub_types::{AppEnvelope, AppManifest, ClientMessage};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct TestHub {
    socket: PathBuf,
    shutdown: CancellationToken,
    task: JoinHandle<deskhub_daemon::Result<()>>,
    _dir: TempDir,
}

impl TestHub {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("hub.sock");
        let options = ServerOptions {
            socket_path: socket.clone(),
            dirs: Directories::with_base(dir.path().join("config")),
        };
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(options, shutdown.clone()));

        wait_for_socket(&socket).await;

        Self {
            socket,
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("hub should stop")
            .expect("hub task should not panic");
        assert!(result.is_ok(), "hub returned {result:?}");
        assert!(!self.socket.exists(), "socket should be removed on shutdown");
    }

    async fn client(&self) -> HubConnection {
        let mut conn = HubConnection::connect(&self.socket, Role::Client { name: None })
            .await
            .unwrap();
        for kind in ["config", "settings", "button_mappings"] {
            recv_client(&mut conn, kind).await;
        }
        conn
    }

    async fn app(&self, id: &str) -> HubConnection {
        HubConnection::connect(
            &self.socket,
            Role::App {
                manifest: AppManifest::new(id),
            },
        )
        .await
        .unwrap()
    }

    async fn ui(&self) -> HubConnection {
        HubConnection::connect(
            &self.socket,
            Role::Ui {
                name: "test-ui".to_string(),
            },
        )
        .await
        .unwrap()
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub socket {} never appeared", path.display());
}

async fn next_frame(conn: &mut HubConnection) -> Frame {
    tokio::time::timeout(RECV_TIMEOUT, conn.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed")
        .expect("frame error")
}

/// Skip client messages until one of `kind` arrives.
async fn recv_client(conn: &mut HubConnection, kind: &str) -> ClientMessage {
    loop {
        match next_frame(conn).await {
            Frame::Client(msg) if msg.kind == kind => return msg,
            Frame::Client(_) => {}
            other => panic!("Expected client frame, got {other:?}"),
        }
    }
}

async fn recv_app(conn: &mut HubConnection) -> AppEnvelope {
    match next_frame(conn).await {
        Frame::App(envelope) => envelope,
        other => panic!("Expected app frame, got {other:?}"),
    }
}

/// Skip UI events until an app list matching `pred` arrives.
async fn recv_apps(conn: &mut HubConnection, pred: impl Fn(&[deskhub_types::AppSummary]) -> bool) {
    loop {
        match next_frame(conn).await {
            Frame::UiEvent(UiEvent::Apps { apps }) if pred(&apps) => return,
            Frame::UiEvent(_) => {}
            other => panic!("Expected UI event, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_app_data_reaches_client() {
    let hub = TestHub::start().await;
    let mut client = hub.client().await;
    let mut app = hub.app("weather").await;

    app.send(Frame::App(AppEnvelope::new("data", json!({"payload": {"temp": 21}}))))
        .await
        .unwrap();

    let msg = recv_client(&mut client, "data").await;
    assert_eq!(msg.app, "weather");
    assert_eq!(msg.payload, json!({"temp": 21}));

    hub.stop().await;
}

#[tokio::test]
async fn test_client_message_reaches_app() {
    let hub = TestHub::start().await;
    let mut client = hub.client().await;
    let mut app = hub.app("weather").await;

    // The app is attached once the client sees the refreshed config
    recv_client(&mut client, "config").await;

    client
        .send(Frame::Client(
            ClientMessage::new("weather", "get", json!({"city": "Oslo"})).with_request("forecast"),
        ))
        .await
        .unwrap();

    let envelope = recv_app(&mut app).await;
    assert_eq!(envelope.kind, "get");
    assert_eq!(envelope.request.as_deref(), Some("forecast"));
    assert_eq!(envelope.payload, Some(json!({"city": "Oslo"})));

    hub.stop().await;
}

#[tokio::test]
async fn test_client_ping_gets_pong() {
    let hub = TestHub::start().await;
    let mut client = hub.client().await;

    client
        .send(Frame::Client(ClientMessage::new("server", "ping", json!(7))))
        .await
        .unwrap();

    let pong = recv_client(&mut client, "pong").await;
    assert_eq!(pong.app, "client");
    assert_eq!(pong.payload, json!(7));

    hub.stop().await;
}

#[tokio::test]
async fn test_message_for_missing_app_returns_error() {
    let hub = TestHub::start().await;
    let mut client = hub.client().await;

    client
        .send(Frame::Client(ClientMessage::new("ghost", "get", json!(null))))
        .await
        .unwrap();

    let error = recv_client(&mut client, "error").await;
    assert!(error.payload.as_str().unwrap().contains("ghost"));

    hub.stop().await;
}

#[tokio::test]
async fn test_ui_sees_apps_and_disable_blocks_reconnect() {
    let hub = TestHub::start().await;
    let mut ui = hub.ui().await;
    recv_apps(&mut ui, |apps| apps.is_empty()).await;

    let _app = hub.app("weather").await;
    recv_apps(&mut ui, |apps| {
        apps.iter().any(|a| a.name == "weather" && a.running)
    })
    .await;

    ui.send(Frame::Ui(UiCommand::DisableApp {
        name: "weather".to_string(),
    }))
    .await
    .unwrap();
    recv_apps(&mut ui, |apps| {
        apps.iter()
            .any(|a| a.name == "weather" && !a.enabled && !a.running)
    })
    .await;

    let result = HubConnection::connect(
        &hub.socket,
        Role::App {
            manifest: AppManifest::new("weather"),
        },
    )
    .await;
    assert!(result.is_err(), "disabled app should be refused");

    hub.stop().await;
}

#[tokio::test]
async fn test_get_input_without_ui_errors_to_app() {
    let hub = TestHub::start().await;
    let mut app = hub.app("spotify").await;

    app.send(Frame::App(
        AppEnvelope::new("get", json!(["user-read-playback-state"])).with_request("input"),
    ))
    .await
    .unwrap();

    let reply = recv_app(&mut app).await;
    assert_eq!(reply.kind, "error");

    hub.stop().await;
}

#[tokio::test]
async fn test_user_input_round_trip_through_ui() {
    let hub = TestHub::start().await;
    let mut ui = hub.ui().await;
    let mut app = hub.app("spotify").await;
    recv_apps(&mut ui, |apps| apps.iter().any(|a| a.name == "spotify")).await;

    app.send(Frame::App(
        AppEnvelope::new("get", json!(["scope-a"])).with_request("input"),
    ))
    .await
    .unwrap();

    loop {
        match next_frame(&mut ui).await {
            Frame::UiEvent(UiEvent::RequestUserInput { app, scopes }) => {
                assert_eq!(app, "spotify");
                assert_eq!(scopes, json!(["scope-a"]));
                break;
            }
            Frame::UiEvent(_) => {}
            other => panic!("Expected UI event, got {other:?}"),
        }
    }

    ui.send(Frame::Ui(UiCommand::UserInput {
        app: "spotify".to_string(),
        data: json!({"client_id": "abc"}),
    }))
    .await
    .unwrap();

    let envelope = recv_app(&mut app).await;
    assert_eq!(envelope, AppEnvelope::new("input", json!({"client_id": "abc"})));

    hub.stop().await;
}

#[tokio::test]
async fn test_second_hub_on_live_socket_fails() {
    let hub = TestHub::start().await;

    let dir = TempDir::new().unwrap();
    let options = ServerOptions {
        socket_path: hub.socket.clone(),
        dirs: Directories::with_base(dir.path().to_path_buf()),
    };
    let result = run(options, CancellationToken::new()).await;
    assert!(result.is_err());

    hub.stop().await;
}

type RawConnection = Framed<UnixStream, FrameCodec>;

/// Connect over a bare framed stream, so tests can write raw bytes.
async fn raw_connect(socket: &Path, role: Role) -> RawConnection {
    let stream = UnixStream::connect(socket).await.unwrap();
    let mut framed = Framed::new(stream, FrameCodec::new());
    framed.send(Frame::Hello(role)).await.unwrap();
    match raw_frame(&mut framed).await {
        Frame::Welcome { .. } => framed,
        other => panic!("Expected welcome, got {other:?}"),
    }
}

async fn raw_frame(framed: &mut RawConnection) -> Frame {
    tokio::time::timeout(RECV_TIMEOUT, framed.next())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed")
        .expect("codec error")
        .expect("hub sent a malformed frame")
}

async fn write_raw_body(framed: &mut RawConnection, body: &[u8]) {
    let len = u32::try_from(body.len()).unwrap();
    let stream = framed.get_mut();
    stream.write_all(&len.to_be_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();
}

#[tokio::test]
async fn test_malformed_app_frame_keeps_connection() {
    let hub = TestHub::start().await;
    let mut app = raw_connect(
        &hub.socket,
        Role::App {
            manifest: AppManifest::new("weather"),
        },
    )
    .await;

    // `request` must be a string
    write_raw_body(&mut app, br#"{"kind":"app","body":{"type":"get","request":7}}"#).await;
    app.send(Frame::App(
        AppEnvelope::new("get", json!(null)).with_request("data"),
    ))
    .await
    .unwrap();

    match raw_frame(&mut app).await {
        Frame::App(envelope) => {
            assert_eq!(envelope.kind, "error");
            let reason = envelope.payload.unwrap();
            assert!(reason.as_str().unwrap().starts_with("Malformed frame"));
        }
        other => panic!("Expected app frame, got {other:?}"),
    }
    match raw_frame(&mut app).await {
        Frame::App(envelope) => assert_eq!(envelope, AppEnvelope::new("data", json!(null))),
        other => panic!("Expected app frame, got {other:?}"),
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_malformed_client_frame_keeps_connection() {
    let hub = TestHub::start().await;
    let mut client = raw_connect(&hub.socket, Role::Client { name: None }).await;

    write_raw_body(&mut client, br#"{"kind":"client","body":{"app":"server"}}"#).await;
    client
        .send(Frame::Client(ClientMessage::new("server", "ping", json!(1))))
        .await
        .unwrap();

    let mut saw_error = false;
    loop {
        match raw_frame(&mut client).await {
            Frame::Client(msg) if msg.kind == "error" => saw_error = true,
            Frame::Client(msg) if msg.kind == "pong" => {
                assert_eq!(msg.payload, json!(1));
                break;
            }
            Frame::Client(_) => {}
            other => panic!("Expected client frame, got {other:?}"),
        }
    }
    assert!(saw_error, "malformed frame should be answered with an error");

    hub.stop().await;
}

#[tokio::test]
async fn test_disabled_app_connection_is_closed() {
    let hub = TestHub::start().await;
    let mut ui = hub.ui().await;
    let mut client = hub.client().await;
    let mut app = hub.app("weather").await;
    recv_apps(&mut ui, |apps| {
        apps.iter().any(|a| a.name == "weather" && a.running)
    })
    .await;

    ui.send(Frame::Ui(UiCommand::DisableApp {
        name: "weather".to_string(),
    }))
    .await
    .unwrap();
    recv_apps(&mut ui, |apps| {
        apps.iter().any(|a| a.name == "weather" && !a.enabled)
    })
    .await;

    // Anything the app still sends is dropped; the hub hangs up
    let _ = app
        .send(Frame::App(AppEnvelope::new("data", json!({"payload": "late"}))))
        .await;
    loop {
        let next = tokio::time::timeout(RECV_TIMEOUT, app.recv())
            .await
            .expect("hub should close the app connection");
        match next {
            None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }

    client
        .send(Frame::Client(ClientMessage::new("server", "ping", json!(2))))
        .await
        .unwrap();
    loop {
        match next_frame(&mut client).await {
            Frame::Client(msg) if msg.kind == "pong" => break,
            Frame::Client(msg) => {
                assert_ne!(msg.kind, "data", "data from a disabled app reached a client");
            }
            other => panic!("Expected client frame, got {other:?}"),
        }
    }

    hub.stop().await;
}
