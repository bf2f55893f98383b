//! Black-box tests of `impostor serve` over real HTTP, backed by the
//! scripted collaborators.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

struct GameServer {
    child: tokio::process::Child,
    base_url: String,
    client: reqwest::Client,
}

impl GameServer {
    /// Spawns the server on an ephemeral port and reads stderr until the
    /// "game server listening" line reveals the bound address.
    async fn start(budget: u32) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_impostor"))
            .args([
                "serve",
                "--backend",
                "scripted",
                "--bind",
                "127.0.0.1:0",
                "--question-budget",
                &budget.to_string(),
                "-v",
                "--color",
                "never",
            ])
            .env_remove("IMPOSTOR_CONFIG")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn impostor");

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        let mut port: Option<u16> = None;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            line.clear();
            let read = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
                .await
                .expect("timed out waiting for server startup")
                .expect("failed to read stderr");
            assert!(read > 0, "server exited before printing listening address");

            if line.contains("game server listening") {
                if let Some(start) = line.find("127.0.0.1:") {
                    let digits: String = line[start + "127.0.0.1:".len()..]
                        .chars()
                        .take_while(char::is_ascii_digit)
                        .collect();
                    port = digits.parse().ok();
                }
                break;
            }
        }

        // Keep draining stderr so the child never blocks on a full pipe.
        tokio::spawn(async move {
            let mut sink = String::new();
            while reader.read_line(&mut sink).await.is_ok_and(|n| n > 0) {
                sink.clear();
            }
        });

        let port = port.expect("failed to discover server port from stderr");
        Self {
            child,
            base_url: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut req = self.client.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn init(&self) -> String {
        let (status, body) = self.post("/api/game/init", None).await;
        assert_eq!(status, 200, "init failed: {body}");
        body["game_id"].as_str().unwrap().to_string()
    }

    async fn chat(&self, game_id: &str, color: &str, message: &str) -> (u16, Value) {
        self.post(
            "/api/game/chat",
            Some(json!({ "game_id": game_id, "color": color, "message": message })),
        )
        .await
    }

    async fn shutdown(mut self) {
        let _ = self.child.kill().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_game_over_http() {
    let server = GameServer::start(2).await;

    let (status, body) = server.get("/").await;
    assert_eq!(status, 200);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let game = server.init().await;

    let (status, body) = server.chat(&game, "red", "Where were you?").await;
    assert_eq!(status, 200);
    assert_eq!(body["color"], "red");
    assert_eq!(body["questions_remaining"], 1);
    assert!(body["response"].as_str().unwrap().starts_with("I'm Player1"));

    let (status, body) = server.chat(&game, "blue", "Did you see anything?").await;
    assert_eq!(status, 200);
    assert_eq!(body["questions_remaining"], 0);
    assert_eq!(body["phase"], "accusing");

    let (status, body) = server.chat(&game, "green", "Too late?").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "phase");

    let (status, state) = server.get(&format!("/api/game/{game}/state")).await;
    assert_eq!(status, 200);
    assert_eq!(state["phase"], "accusing");
    assert!(state["verdict"].is_null());
    assert!(!state.to_string().contains("impostor"));

    let (status, history) = server.get(&format!("/api/game/{game}/history/blue")).await;
    assert_eq!(status, 200);
    assert_eq!(history["messages"].as_array().unwrap().len(), 2);

    let (status, verdict) = server
        .post(&format!("/api/game/{game}/verify?guess=yellow"), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(verdict["guess"], "yellow");
    let revealed = verdict["revealed_impostor"].as_str().unwrap().to_string();
    assert_eq!(verdict["correct"], revealed == "yellow");

    let (status, again) = server.get(&format!("/api/game/{game}/verdict")).await;
    assert_eq!(status, 200);
    assert_eq!(again, verdict);

    let (status, body) = server.delete(&format!("/api/game/{game}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Game deleted");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn verdict_is_hidden_until_resolved() {
    let server = GameServer::start(3).await;
    let game = server.init().await;

    let (status, body) = server.get(&format!("/api/game/{game}/verdict")).await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);

    let (status, _) = server
        .post(&format!("/api/game/{game}/verify?guess=red"), None)
        .await;
    assert_eq!(status, 409);

    let (status, snapshot) = server.post(&format!("/api/game/{game}/accuse"), None).await;
    assert_eq!(status, 200);
    assert_eq!(snapshot["phase"], "accusing");

    let (status, snapshot) = server.post(&format!("/api/game/{game}/back"), None).await;
    assert_eq!(status, 200);
    assert_eq!(snapshot["phase"], "playing");
    assert_eq!(snapshot["back_available"], false);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_requests_are_reported() {
    let server = GameServer::start(3).await;
    let game = server.init().await;

    let (status, body) = server.chat(&game, "purple", "hi").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_input");

    let (status, body) = server.chat(&game, "red", "   ").await;
    assert_eq!(status, 400);
    assert_eq!(body["retryable"], false);

    let (status, body) = server.chat("not-a-game", "red", "hi").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");

    let (status, body) = server.delete("/api/game/not-a-game").await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Game not found");

    server.shutdown().await;
}
