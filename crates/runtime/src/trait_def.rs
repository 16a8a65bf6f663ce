use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::RuntimeError,
    types::{ContainerConfig, ContainerInfo, ExecOutput, PtySize},
};

/// A live PTY attached to a running container's exec session (spec §4.3:
/// `attach_pty(id, size) -> (stdin_writer, stdout_reader, resize_fn,
/// close_fn)`). `stdin`/`stdout` are bounded channels so a slow consumer
/// applies backpressure rather than the adapter buffering unboundedly.
pub struct PtyHandle {
    pub stdin: mpsc::Sender<Vec<u8>>,
    pub stdout: mpsc::Receiver<Vec<u8>>,
    resize_fn: Box<dyn Fn(PtySize) -> Result<(), RuntimeError> + Send + Sync>,
    close_fn: Box<dyn Fn() + Send + Sync>,
    pub wait: tokio::sync::oneshot::Receiver<i32>,
}

impl PtyHandle {
    pub fn new(
        stdin: mpsc::Sender<Vec<u8>>,
        stdout: mpsc::Receiver<Vec<u8>>,
        wait: tokio::sync::oneshot::Receiver<i32>,
        resize_fn: impl Fn(PtySize) -> Result<(), RuntimeError> + Send + Sync + 'static,
        close_fn: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            stdin,
            stdout,
            resize_fn: Box::new(resize_fn),
            close_fn: Box::new(close_fn),
            wait,
        }
    }

    pub fn resize(&self, size: PtySize) -> Result<(), RuntimeError> {
        (self.resize_fn)(size)
    }

    pub fn close(&self) {
        (self.close_fn)()
    }
}

/// Uniform facade over the container engine (spec §4.3). The adapter does
/// no retry and no caching; the Orchestrator decides what to do with a
/// failure.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError>;
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;
    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;
    async fn list(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<ContainerInfo>, RuntimeError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError>;
    async fn logs(&self, id: &str, follow: bool) -> Result<String, RuntimeError>;
    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError>;
    async fn attach_pty(&self, id: &str, size: PtySize) -> Result<PtyHandle, RuntimeError>;
}
