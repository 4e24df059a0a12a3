//! End-to-end chat flows over real TCP connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use linechat::server::ServerState;
use linechat::{ChatConfig, ChatServer, HistoryLog, HistoryRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const PROMPT: &str = "Enter your name: ";
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    history_path: std::path::PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Vec::new(), |_| {}).await
    }

    async fn start_with(seed: Vec<HistoryRecord>, tweak: impl FnOnce(&mut ChatConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("history.jsonl");

        let log = HistoryLog::new(&history_path);
        for record in &seed {
            log.append(record).await.unwrap();
        }

        let mut config = ChatConfig {
            port: 0,
            history_path: history_path.clone(),
            ..ChatConfig::default()
        };
        tweak(&mut config);

        let server = ChatServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let state = server.state();
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            history_path,
            shutdown: Some(tx),
            task: Some(task),
            _dir: dir,
        }
    }

    async fn records(&self) -> Vec<HistoryRecord> {
        HistoryLog::new(&self.history_path).scan_all().await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.unwrap();
        }
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Connect, pick `name`, and return the replay lines shown before the welcome
    async fn join(addr: SocketAddr, name: &str) -> (Self, Vec<String>) {
        let mut client = Self::connect(addr).await;
        let replay = client.pick_name(name).await;
        (client, replay)
    }

    async fn pick_name(&mut self, name: &str) -> Vec<String> {
        self.send(name).await;
        let welcome = format!("Welcome to the chat, {}!", name);
        let mut replay = Vec::new();
        loop {
            let line = self.line().await;
            let line = line.strip_prefix(PROMPT).unwrap_or(&line).to_string();
            if line == welcome {
                return replay;
            }
            replay.push(line);
        }
    }

    async fn send(&mut self, text: &str) {
        self.writer
            .write_all(format!("{}\n", text).as_bytes())
            .await
            .unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        assert!(n > 0, "connection closed while waiting for a line");
        line.trim_end_matches('\n').to_string()
    }

    /// Assert nothing arrives for a short while
    async fn assert_silent(&mut self) {
        let mut line = String::new();
        let read =
            tokio::time::timeout(Duration::from_millis(200), self.reader.read_line(&mut line))
                .await;
        assert!(read.is_err(), "unexpected line: {:?}", line);
    }
}

async fn wait_for_sessions(state: &ServerState, expected: usize) {
    let registry = state.registry();
    tokio::time::timeout(WAIT, async {
        while registry.session_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

#[tokio::test]
async fn broadcast_reaches_every_session_and_is_logged_once() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;
    let (mut bob, _) = TestClient::join(server.addr, "bob").await;
    let (mut carol, _) = TestClient::join(server.addr, "carol").await;

    alice.send("hello everyone").await;

    assert_eq!(alice.line().await, "alice: hello everyone");
    assert_eq!(bob.line().await, "alice: hello everyone");
    assert_eq!(carol.line().await, "alice: hello everyone");

    let records = server.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "alice");
    assert_eq!(records[0].body, "hello everyone");
    assert!(records[0].recipient.is_none());

    server.stop().await;
}

#[tokio::test]
async fn private_message_reaches_only_the_recipient() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;
    let (mut bob, _) = TestClient::join(server.addr, "bob").await;
    let (mut carol, _) = TestClient::join(server.addr, "carol").await;

    alice.send("/private bob meet at noon").await;
    assert_eq!(bob.line().await, "Private message from alice: meet at noon");

    // The next thing everyone else sees is carol's marker, not the private
    carol.send("marker").await;
    assert_eq!(alice.line().await, "carol: marker");
    assert_eq!(carol.line().await, "carol: marker");
    assert_eq!(bob.line().await, "carol: marker");

    let records = server.records().await;
    assert_eq!(records[0].sender, "alice");
    assert_eq!(records[0].body, "meet at noon");
    assert_eq!(records[0].recipient.as_deref(), Some("bob"));

    server.stop().await;
}

#[tokio::test]
async fn private_to_unknown_recipient_is_reported_to_sender() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;
    let (mut bob, _) = TestClient::join(server.addr, "bob").await;

    alice.send("/private nobody hello?").await;
    assert_eq!(alice.line().await, "Recipient not found.");
    bob.assert_silent().await;
    assert!(server.records().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn new_client_sees_last_twenty_public_messages_before_welcome() {
    let mut seed: Vec<HistoryRecord> = (1..=25)
        .map(|i| HistoryRecord::public("bob", format!("m{}", i)))
        .collect();
    seed.insert(10, HistoryRecord::private("bob", "secret", "carol"));
    let server = TestServer::start_with(seed, |_| {}).await;

    let (_alice, replay) = TestClient::join(server.addr, "alice").await;

    let expected: Vec<String> = (6..=25).map(|i| format!("bob: m{}", i)).collect();
    assert_eq!(replay, expected);

    server.stop().await;
}

#[tokio::test]
async fn restore_limit_is_configurable() {
    let seed = (1..=5)
        .map(|i| HistoryRecord::public("bob", format!("m{}", i)))
        .collect();
    let server = TestServer::start_with(seed, |config| config.restore_last_messages = 2).await;

    let (_alice, replay) = TestClient::join(server.addr, "alice").await;
    assert_eq!(replay, ["bob: m4", "bob: m5"]);

    server.stop().await;
}

#[tokio::test]
async fn reconnect_replays_only_what_was_missed() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;
    let (mut bob, _) = TestClient::join(server.addr, "bob").await;

    bob.send("before").await;
    assert_eq!(alice.line().await, "bob: before");
    assert_eq!(bob.line().await, "bob: before");

    alice.send("/disconnect").await;
    assert_eq!(alice.line().await, "alice: /disconnect");
    assert_eq!(bob.line().await, "alice: /disconnect");

    // Offline chat is dropped
    alice.send("talking to myself").await;
    bob.send("hi").await;
    assert_eq!(bob.line().await, "bob: hi");
    assert_eq!(alice.line().await, "bob: hi");

    alice.send("/reconnect").await;
    assert_eq!(bob.line().await, "alice: /reconnect");
    assert_eq!(alice.line().await, "alice: /reconnect");
    assert_eq!(alice.line().await, "bob: hi");
    alice.assert_silent().await;

    // A second /reconnect while online changes nothing
    alice.send("/reconnect").await;
    alice.assert_silent().await;
    bob.assert_silent().await;

    let bodies: Vec<String> = server.records().await.into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, ["before", "/disconnect", "hi"]);

    server.stop().await;
}

#[tokio::test]
async fn malformed_private_keeps_the_session_alive() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;

    alice.send("/private bob").await;
    assert_eq!(
        alice.line().await,
        "Invalid command: usage: /private <name> <message>"
    );

    alice.send("still here").await;
    assert_eq!(alice.line().await, "alice: still here");

    server.stop().await;
}

#[tokio::test]
async fn taken_and_empty_names_are_prompted_again() {
    let server = TestServer::start().await;
    let (_alice, _) = TestClient::join(server.addr, "alice").await;

    let mut imposter = TestClient::connect(server.addr).await;
    imposter.send("alice").await;
    assert_eq!(
        imposter.line().await,
        format!("{}Name 'alice' is already taken.", PROMPT)
    );
    imposter.send("").await;
    assert_eq!(
        imposter.line().await,
        format!("{}Name must not be empty.", PROMPT)
    );
    imposter.pick_name("mallory").await;

    wait_for_sessions(&server.state, 2).await;
    server.stop().await;
}

#[tokio::test]
async fn closing_the_connection_unregisters_the_session() {
    let server = TestServer::start().await;
    let (alice, _) = TestClient::join(server.addr, "alice").await;
    let (mut bob, _) = TestClient::join(server.addr, "bob").await;
    wait_for_sessions(&server.state, 2).await;

    drop(alice);
    wait_for_sessions(&server.state, 1).await;

    bob.send("/private alice are you there").await;
    assert_eq!(bob.line().await, "Recipient not found.");

    // The name can be used again by a new connection
    let (_alice_again, _) = TestClient::join(server.addr, "alice").await;
    wait_for_sessions(&server.state, 2).await;

    server.stop().await;
}

#[tokio::test]
async fn several_messages_in_one_write_are_framed_separately() {
    let server = TestServer::start().await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;

    alice
        .writer
        .write_all(b"one\r\ntwo\nthree\n")
        .await
        .unwrap();

    assert_eq!(alice.line().await, "alice: one");
    assert_eq!(alice.line().await, "alice: two");
    assert_eq!(alice.line().await, "alice: three");

    server.stop().await;
}

#[tokio::test]
async fn connection_over_the_limit_is_refused_and_closed() {
    let server = TestServer::start_with(Vec::new(), |config| config.max_connections = 1).await;
    let (mut alice, _) = TestClient::join(server.addr, "alice").await;

    let mut extra = TestClient::connect(server.addr).await;
    assert_eq!(extra.line().await, "Server is full, try again later.");

    let mut rest = String::new();
    let n = tokio::time::timeout(WAIT, extra.reader.read_line(&mut rest))
        .await
        .expect("refused connection was left open")
        .unwrap();
    assert_eq!(n, 0, "unexpected data after refusal: {:?}", rest);

    // The admitted session is unaffected
    alice.send("still here").await;
    assert_eq!(alice.line().await, "alice: still here");

    server.stop().await;
}
