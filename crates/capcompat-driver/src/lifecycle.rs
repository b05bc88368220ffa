//! Service lifecycle: start a long-running server, stop it exactly once.
//!
//! Starting races the first valid `{id, url}` record on the server's stdout
//! against the process failing or printing something undecodable. Whichever
//! comes first settles the start; everything after is only logged.

use std::time::Duration;

use async_trait::async_trait;
use capcompat_protocol::{record, Did};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StopStrategy;
use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::process::{self, OutputLines};

/// A running service as reported by `server start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: Did,
    pub url: Url,
}

/// Something that can bring a started service down.
#[async_trait]
pub trait Stoppable: Send {
    async fn stop(self: Box<Self>) -> Result<()>;
}

/// Owns the task consuming a service's output. Cancels the process when
/// dropped, so a service is never leaked by an early return.
pub struct ProcessGuard {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProcessGuard {
    fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Wait up to `grace` for the process to exit by itself, then cancel
    /// it and wait for its output to be fully consumed.
    async fn finish(mut self, grace: Option<Duration>) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        if let Some(grace) = grace {
            if tokio::time::timeout(grace, &mut task).await.is_ok() {
                return;
            }
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "service still running after shutdown, killing it"
            );
        }
        self.cancel.cancel();
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "service output task failed");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Stops a service through its `POST /shutdown` control endpoint.
pub struct HttpShutdown {
    url: Url,
    client: reqwest::Client,
    grace: Duration,
    guard: ProcessGuard,
}

#[async_trait]
impl Stoppable for HttpShutdown {
    async fn stop(self: Box<Self>) -> Result<()> {
        let url = self
            .url
            .join("/shutdown")
            .map_err(|e| DriverError::InvalidUrl {
                value: self.url.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(%url, "requesting shutdown");
        let status = self.client.post(url.clone()).send().await?.status();
        if status != StatusCode::ACCEPTED {
            return Err(DriverError::ShutdownStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let this = *self;
        this.guard.finish(Some(this.grace)).await;
        Ok(())
    }
}

/// Stops a service by canceling its process.
pub struct ProcessCancel {
    guard: ProcessGuard,
}

#[async_trait]
impl Stoppable for ProcessCancel {
    async fn stop(self: Box<Self>) -> Result<()> {
        self.guard.finish(None).await;
        Ok(())
    }
}

impl Driver {
    /// Run `server start` and wait for the service to report `{id, url}`.
    ///
    /// Bounded by the configured start timeout. On any failure the process
    /// is killed.
    pub async fn start_service(&self) -> Result<ServiceInfo> {
        let argv = self.config.argv(["server", "start"])?;
        let cancel = CancellationToken::new();
        let lines = process::stream(&self.cwd, &argv, cancel.clone())?;
        let command = lines.command().to_string();

        let (settle, settled) = oneshot::channel();
        let guard = ProcessGuard::new(cancel, tokio::spawn(consume(lines, settle)));

        let info = match tokio::time::timeout(self.config.start_timeout(), settled).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(DriverError::ExitedBeforeReady { command }),
            Err(_) => {
                return Err(DriverError::StartTimeout {
                    command,
                    secs: self.config.start_timeout_secs,
                })
            }
        };

        let handle: Box<dyn Stoppable> = match self.config.stop {
            StopStrategy::Http => Box::new(HttpShutdown {
                url: info.url.clone(),
                client: self.http.clone(),
                grace: self.config.shutdown_grace(),
                guard,
            }),
            StopStrategy::Signal => Box::new(ProcessCancel { guard }),
        };

        let mut services = self.services();
        if services.contains_key(info.id.as_str()) {
            return Err(DriverError::DuplicateService(info.id.to_string()));
        }
        services.insert(info.id.to_string(), handle);

        tracing::info!(
            implementation = %self.name(),
            service = %info.id,
            url = %info.url,
            "service started"
        );
        Ok(info)
    }

    /// Stop a service previously returned by [`Driver::start_service`].
    ///
    /// The id is forgotten even if stopping fails, so a second stop is
    /// always `UnknownService`.
    pub async fn stop_service(&self, id: impl AsRef<str>) -> Result<()> {
        let id = id.as_ref();
        let handle = self
            .services()
            .remove(id)
            .ok_or_else(|| DriverError::UnknownService(id.to_string()))?;

        tracing::info!(implementation = %self.name(), service = %id, "stopping service");
        handle.stop().await
    }
}

async fn consume(mut lines: OutputLines, settle: oneshot::Sender<Result<ServiceInfo>>) {
    let command = lines.command().to_string();
    let mut pending = Some(settle);

    while let Some(item) = lines.next().await {
        match (item, pending.take()) {
            (Err(DriverError::Canceled), settle) => {
                tracing::debug!(command = %command, "service output canceled");
                if let Some(settle) = settle {
                    let _ = settle.send(Err(DriverError::Canceled));
                }
            }
            (Ok(line), Some(settle)) => {
                let _ = settle.send(parse_service(&command, line));
            }
            (Err(err), Some(settle)) => {
                let _ = settle.send(Err(err));
            }
            (Ok(line), None) => tracing::warn!(command = %command, "{line}"),
            (Err(err), None) => {
                tracing::warn!(command = %command, error = %err, "service failed after start")
            }
        }
    }
}

fn parse_service(command: &str, line: String) -> Result<ServiceInfo> {
    let decode_error = |output: &str, source| DriverError::Decode {
        command: command.to_string(),
        output: output.to_string(),
        source,
    };

    let out = record::decode(line.as_bytes()).map_err(|e| decode_error(&line, e))?;
    let id = record::string_field(&out, "id").map_err(|e| decode_error(&line, e))?;
    let url = record::string_field(&out, "url").map_err(|e| decode_error(&line, e))?;

    let id = Did::parse(id).map_err(|source| DriverError::InvalidDid {
        value: id.to_string(),
        source,
    })?;
    let url = Url::parse(url).map_err(|e| DriverError::InvalidUrl {
        value: url.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ServiceInfo { id, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "did:key:z6Mkk89bC3JrVqKie71YEcc5M1SMVxuCgNx6zLZ8SYJsxALi";

    #[test]
    fn test_parse_service_record() {
        let line = format!(r#"{{"id":"{ALICE}","url":"http://127.0.0.1:4567"}}"#);
        let info = parse_service("impl server start", line).unwrap();
        assert_eq!(info.id.as_str(), ALICE);
        assert_eq!(info.url.as_str(), "http://127.0.0.1:4567/");
    }

    #[test]
    fn test_parse_service_attaches_output() {
        let err = parse_service("impl server start", "listening...".to_string()).unwrap_err();
        assert_eq!(err.output(), Some("listening..."));
        match err {
            DriverError::Decode { command, .. } => assert_eq!(command, "impl server start"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_service_rejects_bad_fields() {
        let line = r#"{"id":"alice","url":"http://127.0.0.1:1"}"#.to_string();
        assert!(matches!(
            parse_service("x", line),
            Err(DriverError::InvalidDid { value, .. }) if value == "alice"
        ));

        let line = format!(r#"{{"id":"{ALICE}","url":"/relative"}}"#);
        assert!(matches!(
            parse_service("x", line),
            Err(DriverError::InvalidUrl { value, .. }) if value == "/relative"
        ));

        let line = format!(r#"{{"id":"{ALICE}"}}"#);
        assert!(matches!(
            parse_service("x", line),
            Err(DriverError::Decode { .. })
        ));
    }
}
