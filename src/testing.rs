//! Test doubles shared by unit tests

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, DuplexStream};

use crate::container::{
    ArchiveEntry, ContainerRuntime, ContainerSpec, ExecConfig, ExecOutput, ExecStatus,
};
use crate::core::{FlowError, FlowResult};
use crate::vector::{Document, ScoredDocument, SearchOptions, VectorStore};

struct Script {
    pattern: String,
    output: String,
    exit_code: i64,
    hang: bool,
}

#[derive(Default)]
struct FakeState {
    running: HashMap<String, bool>,
    // Container name to runtime id
    names: HashMap<String, String>,
    spawned: Vec<ContainerSpec>,
    deleted: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    execs: HashMap<String, (ExecConfig, i64)>,
    commands: Vec<ExecConfig>,
    scripts: Vec<Script>,
    // Writers kept alive so hanging exec streams never reach EOF
    open_pipes: Vec<DuplexStream>,
    fail_delete: bool,
}

/// Scriptable in-process container runtime
#[derive(Default)]
pub struct FakeContainerRuntime {
    state: Mutex<FakeState>,
    next_id: AtomicUsize,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` print `output` and exit with `exit_code`
    pub fn respond(&self, pattern: &str, output: &str, exit_code: i64) {
        self.state.lock().unwrap().scripts.push(Script {
            pattern: pattern.to_string(),
            output: output.to_string(),
            exit_code,
            hang: false,
        });
    }

    /// Commands containing `pattern` print `output` and never finish
    pub fn hang(&self, pattern: &str, output: &str) {
        self.state.lock().unwrap().scripts.push(Script {
            pattern: pattern.to_string(),
            output: output.to_string(),
            exit_code: 0,
            hang: true,
        });
    }

    /// Register an already running container
    pub fn add_running(&self, local_id: &str) {
        self.state
            .lock()
            .unwrap()
            .running
            .insert(local_id.to_string(), true);
    }

    /// Register a running container that no store knows about
    pub fn add_named(&self, name: &str, local_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.names.insert(name.to_string(), local_id.to_string());
        state.running.insert(local_id.to_string(), true);
    }

    pub fn set_running(&self, local_id: &str, running: bool) {
        self.state
            .lock()
            .unwrap()
            .running
            .insert(local_id.to_string(), running);
    }

    pub fn fail_delete(&self) {
        self.state.lock().unwrap().fail_delete = true;
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.as_bytes().to_vec());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|c| String::from_utf8_lossy(c).to_string())
    }

    pub fn spawned(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn commands(&self) -> Vec<ExecConfig> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn spawn_container(&self, spec: &ContainerSpec) -> FlowResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.names.contains_key(&spec.name) {
            return Err(FlowError::container(format!(
                "the container name \"/{}\" is already in use",
                spec.name
            )));
        }
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.spawned.push(spec.clone());
        state.names.insert(spec.name.clone(), id.clone());
        state.running.insert(id.clone(), true);
        Ok(id)
    }

    async fn delete_container(&self, local_id: &str) -> FlowResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(FlowError::container("daemon unreachable"));
        }
        // Accepts a runtime id or a name; unknown containers are not an error
        let id = state
            .names
            .get(local_id)
            .cloned()
            .unwrap_or_else(|| local_id.to_string());
        if state.running.remove(&id).is_none() {
            return Ok(());
        }
        state.names.retain(|_, v| *v != id);
        state.deleted.push(local_id.to_string());
        Ok(())
    }

    async fn is_container_running(&self, local_id: &str) -> FlowResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .running
            .get(local_id)
            .copied()
            .unwrap_or(false))
    }

    async fn exec_create(&self, _local_id: &str, config: ExecConfig) -> FlowResult<String> {
        let id = format!("exec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().unwrap();
        state.commands.push(config.clone());
        state.execs.insert(id.clone(), (config, 0));
        Ok(id)
    }

    async fn exec_attach(&self, exec_id: &str) -> FlowResult<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        let (config, _) = state
            .execs
            .get(exec_id)
            .cloned()
            .ok_or_else(|| FlowError::container("exec not found"))?;
        let command = config.cmd.join(" ");

        let script = state
            .scripts
            .iter()
            .find(|s| command.contains(&s.pattern))
            .map(|s| (s.output.clone(), s.exit_code, s.hang));
        let (output, exit_code, hang) = script.unwrap_or_default();

        if let Some(entry) = state.execs.get_mut(exec_id) {
            entry.1 = exit_code;
        }

        if hang {
            let (reader, writer) = tokio::io::duplex(64);
            state.open_pipes.push(writer);
            return Ok(Box::new(Cursor::new(output.into_bytes()).chain(reader)));
        }

        Ok(Box::new(Cursor::new(output.into_bytes())))
    }

    async fn exec_inspect(&self, exec_id: &str) -> FlowResult<ExecStatus> {
        let state = self.state.lock().unwrap();
        let (_, exit_code) = state
            .execs
            .get(exec_id)
            .ok_or_else(|| FlowError::container("exec not found"))?;
        Ok(ExecStatus {
            running: false,
            exit_code: Some(*exit_code),
        })
    }

    async fn copy_to_container(
        &self,
        _local_id: &str,
        dir: &str,
        entries: Vec<ArchiveEntry>,
    ) -> FlowResult<()> {
        let mut state = self.state.lock().unwrap();
        for entry in entries {
            let path = format!("{}/{}", dir.trim_end_matches('/'), entry.path);
            state.files.insert(path, entry.content.unwrap_or_default());
        }
        Ok(())
    }

    async fn copy_from_container(
        &self,
        _local_id: &str,
        path: &str,
        max_file_size: u64,
    ) -> FlowResult<Vec<ArchiveEntry>> {
        let state = self.state.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut entries: Vec<ArchiveEntry> = state
            .files
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(p, content)| {
                let size = content.len() as u64;
                ArchiveEntry {
                    path: p.clone(),
                    size,
                    content: (size <= max_file_size).then(|| content.clone()),
                }
            })
            .collect();
        if entries.is_empty() {
            return Err(FlowError::container(format!(
                "no such file or directory: {}",
                path
            )));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// Vector store whose every operation fails
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn add_documents(&self, _docs: Vec<Document>) -> FlowResult<Vec<String>> {
        Err(FlowError::vector_store("connection refused"))
    }

    async fn similarity_search(
        &self,
        _query: &str,
        _opts: &SearchOptions,
    ) -> FlowResult<Vec<ScoredDocument>> {
        Err(FlowError::vector_store("connection refused"))
    }

    async fn close(&self) -> FlowResult<()> {
        Err(FlowError::vector_store("connection refused"))
    }
}

/// Serve canned HTTP responses on a loopback port
///
/// Each route is a path prefix and a body. Returns the base URL and the
/// list of request lines received so far.
pub async fn serve_http(
    routes: Vec<(&'static str, Vec<u8>)>,
) -> (String, std::sync::Arc<Mutex<Vec<String>>>) {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let requests = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            let line = request.lines().next().unwrap_or_default().to_string();
            let path = line.split_whitespace().nth(1).unwrap_or("/").to_string();
            requests.lock().unwrap().push(request);

            let (status, body) = routes
                .iter()
                .find(|(prefix, _)| path.starts_with(prefix))
                .map(|(_, body)| ("200 OK", body.clone()))
                .unwrap_or(("404 Not Found", b"not found".to_vec()));

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), seen)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    let (key, value) = l.split_once(':')?;
                    key.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}
