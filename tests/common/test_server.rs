use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;

use serde_json::Value;
use tempfile::TempDir;

pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    pub admin_token: String,
    server_process: Option<Child>,
}

static BUILD_RELEASE: LazyLock<()> = LazyLock::new(|| {
    let build_status = Command::new("cargo")
        .args(["build", "--release"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("build release binary");
    assert!(build_status.success(), "Failed to build release binary");
});

impl TestServer {
    pub async fn start() -> Self {
        LazyLock::force(&BUILD_RELEASE);

        let temp_dir = TempDir::new().expect("create temp dir");
        let data_dir = temp_dir.path();
        let binary = Path::new(env!("CARGO_MANIFEST_DIR")).join("target/release/loopd");

        let init_output = Command::new(&binary)
            .args(["admin", "init", "--data-dir"])
            .arg(data_dir)
            .arg("--non-interactive")
            .output()
            .expect("run init");
        assert!(
            init_output.status.success(),
            "Failed to initialize database"
        );

        let token_path = data_dir.join(".admin_token");
        let admin_token = std::fs::read_to_string(&token_path)
            .expect("read admin token")
            .trim()
            .to_string();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let base_url = format!("http://127.0.0.1:{}", port);

        let server_process = Command::new(&binary)
            .args(["serve", "--data-dir"])
            .arg(data_dir)
            .args(["--host", "127.0.0.1", "--port"])
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start server");

        Self::wait_for_ready(&base_url).await;

        Self {
            temp_dir,
            base_url,
            admin_token,
            server_process: Some(server_process),
        }
    }

    async fn wait_for_ready(base_url: &str) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", base_url))
                .send()
                .await
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready");
    }

    #[allow(dead_code)]
    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    #[allow(dead_code)]
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws{}{}", self.base_url.trim_start_matches("http"), path)
    }

    /// Provisions a user through the admin API and mints a token for them.
    /// Returns (user_id, token).
    pub async fn create_user(&self, username: &str) -> (String, String) {
        let client = reqwest::Client::new();

        let resp: Value = client
            .post(format!("{}/api/v1/admin/users", self.base_url))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({ "username": username }))
            .send()
            .await
            .expect("create user")
            .json()
            .await
            .expect("parse user response");
        let user_id = resp["data"]["id"].as_str().expect("user id").to_string();

        let resp: Value = client
            .post(format!(
                "{}/api/v1/admin/users/{}/tokens",
                self.base_url, user_id
            ))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .expect("create user token")
            .json()
            .await
            .expect("parse token response");
        let token = resp["data"]["token"].as_str().expect("token").to_string();

        (user_id, token)
    }

    #[allow(dead_code)]
    pub async fn grant_coins(&self, user_id: &str, coins: i64) {
        let client = reqwest::Client::new();
        let resp = client
            .post(format!(
                "{}/api/v1/admin/users/{}/coins",
                self.base_url, user_id
            ))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({ "coins": coins }))
            .send()
            .await
            .expect("grant coins");
        assert!(resp.status().is_success(), "Failed to grant coins");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut process) = self.server_process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
