// ABOUTME: Docker Engine backend for remote exec using Bollard
// Resolves pod containers through the labels kubelet's Docker runtime attaches to them

use super::{
    ExecError, ExecInput, ExecTarget, PodDirectory, PodInfo, ReadOutcome, RemoteExec,
    StreamOptions, TerminalSizeQueue,
};
use crate::config::DockerConfig;
use async_trait::async_trait;
use bollard::container::{ListContainersOptions, LogOutput};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecResults};
use bollard::models::ContainerSummary;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const POD_LABEL: &str = "io.kubernetes.pod.name";
pub const CONTAINER_LABEL: &str = "io.kubernetes.container.name";

/// Name kubelet gives the sandbox (pause) container of every pod
const SANDBOX_CONTAINER: &str = "POD";

const STDIN_CHUNK: usize = 32 * 1024;

#[derive(Clone)]
pub struct DockerExec {
    docker: Docker,
}

impl DockerExec {
    pub async fn connect(config: &DockerConfig) -> Result<Self, ExecError> {
        let docker = Self::connect_to_docker(config)?;

        // Test the connection
        docker.ping().await?;

        info!("Successfully connected to Docker daemon");
        Ok(Self { docker })
    }

    fn connect_to_docker(config: &DockerConfig) -> Result<Docker, bollard::errors::Error> {
        if let Some(docker_host) = &config.host {
            info!("Using Docker host from config: {}", docker_host);
            std::env::set_var("DOCKER_HOST", docker_host);
            return Docker::connect_with_local_defaults();
        }

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            info!("Using DOCKER_HOST: {}", docker_host);
            return Docker::connect_with_local_defaults();
        }

        for socket_path in Self::get_docker_socket_paths() {
            if std::path::Path::new(&socket_path).exists() {
                info!("Found Docker socket at: {}", socket_path);
                std::env::set_var("DOCKER_HOST", format!("unix://{}", socket_path));

                match Docker::connect_with_local_defaults() {
                    Ok(docker) => return Ok(docker),
                    Err(e) => {
                        warn!("Failed to connect to Docker socket {}: {}", socket_path, e);
                    }
                }
            }
        }

        warn!("No Docker socket found, trying default connection");
        Docker::connect_with_local_defaults()
    }

    fn get_docker_socket_paths() -> Vec<String> {
        let mut paths = vec!["/var/run/docker.sock".to_string()];

        // cri-dockerd and rootless setups
        paths.push("/run/cri-dockerd.sock".to_string());
        if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            paths.push(format!("{}/docker.sock", xdg_runtime_dir));
        }

        paths
    }

    async fn resolve_container(&self, target: &ExecTarget) -> Result<String, ExecError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![
                format!("{}={}", NAMESPACE_LABEL, target.namespace),
                format!("{}={}", POD_LABEL, target.pod),
                format!("{}={}", CONTAINER_LABEL, target.container),
            ],
        );
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await?;

        containers
            .into_iter()
            .find_map(|c| c.id)
            .ok_or_else(|| ExecError::TargetNotFound(target.to_string()))
    }

    async fn list_pod_containers(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ContainerSummary>, ExecError> {
        let label = match namespace {
            Some(namespace) => format!("{}={}", NAMESPACE_LABEL, namespace),
            None => NAMESPACE_LABEL.to_string(),
        };
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label]);

        Ok(self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await?)
    }

    async fn apply_sizes(&self, exec_id: &str, queue: Option<&dyn TerminalSizeQueue>) {
        let Some(queue) = queue else { return };

        while let Some(size) = queue.next_size().await {
            debug!("Resizing exec {} to {}x{}", exec_id, size.width, size.height);
            let options = ResizeExecOptions {
                height: size.height,
                width: size.width,
            };
            if let Err(e) = self.docker.resize_exec(exec_id, options).await {
                warn!("Failed to resize exec {}: {}", exec_id, e);
            }
        }
    }
}

/// Copies terminal input into the exec's stdin until the input terminates.
/// Returns `Ok` once the exec stops accepting input.
async fn forward_stdin(
    stdin: Option<&dyn ExecInput>,
    input: &mut Pin<Box<dyn AsyncWrite + Send>>,
) -> Result<(), ExecError> {
    let Some(stdin) = stdin else { return Ok(()) };
    let mut buf = vec![0u8; STDIN_CHUNK];

    loop {
        match stdin.read(&mut buf).await {
            ReadOutcome::Data(0) => {}
            ReadOutcome::Data(n) => {
                // A process that has already exited closes its stdin; the output stream reports the end
                let written = match input.write_all(&buf[..n]).await {
                    Ok(()) => input.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    debug!("Exec stdin closed, no longer forwarding input: {}", e);
                    return Ok(());
                }
            }
            ReadOutcome::Terminated { written, error } => {
                if written > 0 {
                    let _ = input.write_all(&buf[..written]).await;
                    let _ = input.flush().await;
                }
                let _ = input.shutdown().await;
                return Err(ExecError::InputTerminated(error));
            }
        }
    }
}

#[async_trait]
impl RemoteExec for DockerExec {
    async fn stream(
        &self,
        target: &ExecTarget,
        command: &[String],
        options: StreamOptions<'_>,
    ) -> Result<(), ExecError> {
        let container_id = self.resolve_container(target).await?;
        debug!("Resolved {} to container {}", target, container_id);

        let exec = self
            .docker
            .create_exec(
                &container_id,
                CreateExecOptions {
                    attach_stdin: Some(options.stdin.is_some()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(options.tty),
                    cmd: Some(command.to_vec()),
                    ..Default::default()
                },
            )
            .await?;
        info!("Created exec {} running {:?} in {}", exec.id, command, target);

        let StartExecResults::Attached { mut output, mut input } =
            self.docker.start_exec(&exec.id, None).await?
        else {
            return Err(ExecError::Detached(exec.id));
        };

        let forward_output = async {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdErr { message } => {
                        options.stderr.write(&message).await.map_err(ExecError::Output)?;
                    }
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        options.stdout.write(&message).await.map_err(ExecError::Output)?;
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
            debug!("Exec {} output stream ended", exec.id);
            Ok::<(), ExecError>(())
        };

        // Input and resizing never end the stream on their own; only output or an error does.
        let control = async {
            tokio::try_join!(forward_stdin(options.stdin, &mut input), async {
                self.apply_sizes(&exec.id, options.size_queue).await;
                Ok::<(), ExecError>(())
            })?;
            std::future::pending::<Result<(), ExecError>>().await
        };

        tokio::select! {
            result = forward_output => result,
            result = control => result,
        }
    }
}

#[async_trait]
impl PodDirectory for DockerExec {
    async fn namespaces(&self) -> Result<Vec<String>, ExecError> {
        let containers = self.list_pod_containers(None).await?;
        Ok(collect_namespaces(&containers))
    }

    async fn pods(&self, namespace: &str) -> Result<Vec<PodInfo>, ExecError> {
        let containers = self.list_pod_containers(Some(namespace)).await?;
        Ok(group_pods(&containers))
    }
}

fn label<'a>(summary: &'a ContainerSummary, key: &str) -> Option<&'a str> {
    summary.labels.as_ref()?.get(key).map(String::as_str)
}

pub(crate) fn collect_namespaces(containers: &[ContainerSummary]) -> Vec<String> {
    containers
        .iter()
        .filter_map(|c| label(c, NAMESPACE_LABEL))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Groups labelled containers into pods, skipping sandbox containers
pub(crate) fn group_pods(containers: &[ContainerSummary]) -> Vec<PodInfo> {
    let mut pods: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for summary in containers {
        let (Some(namespace), Some(pod)) =
            (label(summary, NAMESPACE_LABEL), label(summary, POD_LABEL))
        else {
            continue;
        };
        let entry = pods
            .entry((namespace.to_string(), pod.to_string()))
            .or_default();
        if let Some(container) = label(summary, CONTAINER_LABEL) {
            if container != SANDBOX_CONTAINER {
                entry.insert(container.to_string());
            }
        }
    }

    pods.into_iter()
        .map(|((namespace, name), containers)| PodInfo {
            name,
            namespace,
            containers: containers.into_iter().collect(),
        })
        .collect()
}
