//! Test server management.
//!
//! Spawns and manages roomcast instances for integration testing.

use serde_json::Value;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    child: Child,
    ws_port: u16,
    http_port: u16,
    http: reqwest::Client,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a server with the WebSocket gateway on `ws_port` and the HTTP
    /// surface on `ws_port + 1`.
    pub async fn spawn(ws_port: u16) -> anyhow::Result<Self> {
        Self::spawn_with(ws_port, "").await
    }

    /// Spawn with extra TOML appended to the base config.
    pub async fn spawn_with(ws_port: u16, extra: &str) -> anyhow::Result<Self> {
        let http_port = ws_port + 1;
        let data_dir = tempfile::tempdir()?;
        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.roomcast"

[listen]
address = "127.0.0.1:{ws_port}"

[auth]
jwt_secret = "{secret}"

[http]
address = "127.0.0.1:{http_port}"

[limits]
send_queue = 32
{extra}
"#,
            secret = super::JWT_SECRET,
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_roomcast"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .spawn()?;

        let server = Self {
            child,
            ws_port,
            http_port,
            http: reqwest::Client::new(),
            _data_dir: data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until both listeners accept connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            let ws_up = tokio::net::TcpStream::connect(("127.0.0.1", self.ws_port))
                .await
                .is_ok();
            let http_up = self.get("/health").await.is_ok();
            if ws_up && http_up {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.ws_port)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.http_port, path)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self.http.get(self.http_url(path)).send().await?;
        let response = response.error_for_status()?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// POST a JSON body, returning the status code.
    pub async fn post(&self, path: &str, body: &Value) -> anyhow::Result<u16> {
        let response = self.http.post(self.http_url(path)).json(body).send().await?;
        Ok(response.status().as_u16())
    }

    pub async fn stats(&self) -> anyhow::Result<Value> {
        self.get("/stats").await
    }

    pub async fn room(&self, room_id: i64) -> anyhow::Result<Value> {
        self.get(&format!("/rooms/{room_id}")).await
    }

    /// Poll `path` until `predicate` holds, for up to 3 seconds.
    pub async fn wait_for<F>(&self, path: &str, mut predicate: F) -> anyhow::Result<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        let mut last = Value::Null;
        for _ in 0..60 {
            last = self.get(path).await?;
            if predicate(&last) {
                return Ok(last);
            }
            sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("condition on {path} never held; last value: {last}")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
