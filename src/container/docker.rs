//! Docker backend driven through the `docker` CLI

use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use uuid::Uuid;

use super::{ArchiveEntry, ContainerRuntime, ContainerSpec, ExecConfig, ExecOutput, ExecStatus};
use crate::core::{FlowError, FlowResult};

/// How long `exec_inspect` waits for a process whose output already ended
const EXIT_WAIT: Duration = Duration::from_secs(2);

enum ExecState {
    Created { container: String, config: ExecConfig },
    Started { container: String, child: Child },
}

impl ExecState {
    fn container(&self) -> &str {
        match self {
            ExecState::Created { container, .. } | ExecState::Started { container, .. } => container,
        }
    }
}

/// Container runtime backed by the docker command line client
pub struct DockerCli {
    binary: String,
    execs: Mutex<HashMap<String, ExecState>>,
}

impl DockerCli {
    /// Create a backend that invokes `binary` (usually just `docker`)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            execs: Mutex::new(HashMap::new()),
        }
    }

    fn execs(&self) -> FlowResult<MutexGuard<'_, HashMap<String, ExecState>>> {
        self.execs
            .lock()
            .map_err(|_| FlowError::container("exec table lock poisoned"))
    }

    /// Forget started sessions whose process already exited without being inspected
    fn prune_finished(execs: &mut HashMap<String, ExecState>) {
        execs.retain(|_, state| match state {
            ExecState::Started { child, .. } => matches!(child.try_wait(), Ok(None)),
            ExecState::Created { .. } => true,
        });
    }

    /// Drop every session of `local_id`, killing processes still attached
    fn forget_container(&self, local_id: &str) -> FlowResult<usize> {
        let mut execs = self.execs()?;
        let stale: Vec<String> = execs
            .iter()
            .filter(|(_, state)| state.container() == local_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(ExecState::Started { mut child, .. }) = execs.remove(id) {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("[DockerCli] Exec {} already gone: {}", id, e);
                }
            }
        }
        Ok(stale.len())
    }

    /// Run a docker subcommand to completion, optionally feeding stdin
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> FlowResult<Output> {
        tracing::debug!("[DockerCli] {} {}", self.binary, args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd
            .spawn()
            .map_err(|e| FlowError::container(format!("failed to run {}: {}", self.binary, e)))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input).await?;
                pipe.shutdown().await?;
            }
        }

        Ok(child.wait_with_output().await?)
    }

    /// Run and require a zero exit status, returning trimmed stdout
    async fn run_ok(&self, args: &[&str], stdin: Option<&[u8]>) -> FlowResult<String> {
        let output = self.run(args, stdin).await?;
        if !output.status.success() {
            return Err(FlowError::container(format!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn join_path(dir: &str, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        format!("{}/{}", dir.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn spawn_container(&self, spec: &ContainerSpec) -> FlowResult<String> {
        let mut args = vec![
            "run",
            "-d",
            "--name",
            spec.name.as_str(),
            "-w",
            spec.work_dir.as_str(),
        ];
        if let Some(network) = spec.network.as_deref() {
            args.extend(["--network", network]);
        }
        args.extend([spec.image.as_str(), "tail", "-f", "/dev/null"]);

        let id = self.run_ok(&args, None).await?;
        tracing::info!("[DockerCli] Started container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn delete_container(&self, local_id: &str) -> FlowResult<()> {
        let dropped = self.forget_container(local_id)?;
        if dropped > 0 {
            tracing::debug!("[DockerCli] Dropped {} exec session(s) of {}", dropped, local_id);
        }

        let output = self.run(&["rm", "-f", local_id], None).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.contains("No such container") {
            return Ok(());
        }
        Err(FlowError::container(format!(
            "failed to remove container {}: {}",
            local_id,
            stderr.trim()
        )))
    }

    async fn is_container_running(&self, local_id: &str) -> FlowResult<bool> {
        let output = self
            .run(&["inspect", "-f", "{{.State.Running}}", local_id], None)
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn exec_create(&self, local_id: &str, config: ExecConfig) -> FlowResult<String> {
        let exec_id = Uuid::new_v4().to_string();
        let mut execs = self.execs()?;
        Self::prune_finished(&mut execs);
        execs.insert(
            exec_id.clone(),
            ExecState::Created {
                container: local_id.to_string(),
                config,
            },
        );
        Ok(exec_id)
    }

    async fn exec_attach(&self, exec_id: &str) -> FlowResult<ExecOutput> {
        let state = self.execs()?.remove(exec_id);
        let (container, config) = match state {
            Some(ExecState::Created { container, config }) => (container, config),
            Some(other) => {
                self.execs()?.insert(exec_id.to_string(), other);
                return Err(FlowError::container(format!("exec {} already started", exec_id)));
            }
            None => return Err(FlowError::container(format!("exec {} not found", exec_id))),
        };

        let mut cmd = Command::new(&self.binary);
        cmd.arg("exec");
        if config.tty {
            cmd.arg("-t");
        }
        cmd.args(["-w", config.working_dir.as_str(), container.as_str()])
            .args(&config.cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| FlowError::container(format!("failed to start exec: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlowError::container("exec stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FlowError::container("exec stderr not captured"))?;

        self.execs()?
            .insert(exec_id.to_string(), ExecState::Started { container, child });

        // With a TTY docker folds stderr into stdout, so stderr is usually empty
        Ok(Box::new(stdout.chain(stderr)))
    }

    async fn exec_inspect(&self, exec_id: &str) -> FlowResult<ExecStatus> {
        let state = self
            .execs()?
            .remove(exec_id)
            .ok_or_else(|| FlowError::container(format!("exec {} not found", exec_id)))?;

        let (container, mut child) = match state {
            ExecState::Started { container, child } => (container, child),
            created @ ExecState::Created { .. } => {
                self.execs()?.insert(exec_id.to_string(), created);
                return Ok(ExecStatus {
                    running: false,
                    exit_code: None,
                });
            }
        };

        match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
            Ok(status) => Ok(ExecStatus {
                running: false,
                exit_code: status?.code().map(i64::from),
            }),
            Err(_) => {
                self.execs()?
                    .insert(exec_id.to_string(), ExecState::Started { container, child });
                Ok(ExecStatus {
                    running: true,
                    exit_code: None,
                })
            }
        }
    }

    async fn copy_to_container(
        &self,
        local_id: &str,
        dir: &str,
        entries: Vec<ArchiveEntry>,
    ) -> FlowResult<()> {
        for entry in entries {
            let target = Self::join_path(dir, &entry.path);
            let content = entry.content.unwrap_or_default();
            self.run_ok(
                &[
                    "exec",
                    "-i",
                    local_id,
                    "sh",
                    "-c",
                    "mkdir -p \"$(dirname \"$1\")\" && cat > \"$1\"",
                    "sh",
                    target.as_str(),
                ],
                Some(&content),
            )
            .await?;
        }
        Ok(())
    }

    async fn copy_from_container(
        &self,
        local_id: &str,
        path: &str,
        max_file_size: u64,
    ) -> FlowResult<Vec<ArchiveEntry>> {
        let listing = self
            .run_ok(
                &[
                    "exec",
                    local_id,
                    "sh",
                    "-c",
                    "if [ -d \"$1\" ]; then find \"$1\" -type f; elif [ -e \"$1\" ]; then echo \"$1\"; else echo \"no such file or directory: $1\" >&2; exit 2; fi",
                    "sh",
                    path,
                ],
                None,
            )
            .await?;

        let mut entries = Vec::new();
        for file in listing.lines().filter(|l| !l.is_empty()) {
            let size: u64 = self
                .run_ok(&["exec", local_id, "stat", "-c", "%s", file], None)
                .await?
                .parse()
                .map_err(|e| FlowError::container(format!("bad size for {}: {}", file, e)))?;

            let content = if size > max_file_size {
                None
            } else {
                let output = self.run(&["exec", local_id, "cat", file], None).await?;
                if !output.status.success() {
                    return Err(FlowError::container(format!(
                        "failed to read {}: {}",
                        file,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                Some(output.stdout)
            };

            entries.push(ArchiveEntry {
                path: file.to_string(),
                size,
                content,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(DockerCli::join_path("/work", "a.txt"), "/work/a.txt");
        assert_eq!(DockerCli::join_path("/work/", "a.txt"), "/work/a.txt");
        assert_eq!(DockerCli::join_path("/work", "/etc/hosts"), "/etc/hosts");
    }

    #[tokio::test]
    async fn test_exec_lifecycle_without_attach() {
        let docker = DockerCli::new("docker");
        let exec_id = docker
            .exec_create("abc", ExecConfig::shell("ls", "/work"))
            .await
            .unwrap();

        let status = docker.exec_inspect(&exec_id).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.exit_code, None);
        assert!(docker.exec_inspect("missing").await.is_err());
    }

    /// Stand-in `docker` that runs exec'd commands on the host
    #[cfg(unix)]
    fn host_docker(dir: &std::path::Path) -> DockerCli {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("docker");
        std::fs::write(
            &script,
            r#"#!/bin/sh
case "$1" in
  exec)
    shift
    while [ $# -gt 0 ]; do
      case "$1" in
        -t|-i) shift ;;
        -w) cd "$2" || exit 126; shift 2 ;;
        *) shift; break ;;
      esac
    done
    exec "$@"
    ;;
  rm) exit 0 ;;
  *) exit 1 ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        DockerCli::new(script.to_string_lossy())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_inspect_reports_exit_code_and_forgets_exec() {
        let dir = tempfile::tempdir().unwrap();
        let docker = host_docker(dir.path());

        let exec_id = docker
            .exec_create("c1", ExecConfig::shell("echo done; exit 3", "/tmp"))
            .await
            .unwrap();
        let mut output = docker.exec_attach(&exec_id).await.unwrap();
        let mut text = String::new();
        output.read_to_string(&mut text).await.unwrap();
        assert_eq!(text.trim(), "done");

        let status = docker.exec_inspect(&exec_id).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.exit_code, Some(3));
        assert!(docker.execs.lock().unwrap().is_empty());
        assert!(docker.exec_inspect(&exec_id).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_container_drops_running_execs() {
        let dir = tempfile::tempdir().unwrap();
        let docker = host_docker(dir.path());

        let exec_id = docker
            .exec_create("c1", ExecConfig::shell("sleep 30", "/tmp"))
            .await
            .unwrap();
        let _output = docker.exec_attach(&exec_id).await.unwrap();
        docker
            .exec_create("c2", ExecConfig::shell("ls", "/tmp"))
            .await
            .unwrap();
        assert_eq!(docker.execs.lock().unwrap().len(), 2);

        docker.delete_container("c1").await.unwrap();
        let execs = docker.execs.lock().unwrap();
        assert_eq!(execs.len(), 1);
        assert!(execs.values().all(|state| state.container() == "c2"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_container_error() {
        let docker = DockerCli::new("/nonexistent/docker-binary");
        let err = docker.is_container_running("abc").await.unwrap_err();
        assert!(matches!(err, FlowError::Container(_)));
    }
}
