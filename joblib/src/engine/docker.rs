use super::{ContainerEngine, ContainerSpec, EngineError, HealthProbe, Result};
use crate::types::ContainerId;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HealthConfig, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

/// Status the daemon answers with when stopping an already stopped container.
const NOT_MODIFIED: u16 = 304;

/// [`ContainerEngine`] backed by a Docker daemon.
///
/// `bollard::Docker` is a cheap, thread-safe client; one instance serves every job.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Round trip to the daemon, to fail fast at startup.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }
}

/// Split an image reference into repository and tag.
///
/// An untagged reference means `latest`; the create-image endpoint would
/// otherwise pull every tag of the repository.
fn image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = image_reference(image);
        let options = Some(CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        });
        let mut progress = self.docker.create_image(options, None, None);
        while let Some(info) = progress.next().await {
            let info = info?;
            if let Some(status) = info.status {
                debug!(image, %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let host_config = HostConfig {
            binds: Some(vec![spec.bind()]),
            ..Default::default()
        };
        let healthcheck = spec.healthcheck.as_ref().map(health_config);
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(spec.tty),
            healthcheck,
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(container_id = %response.id, %warning, "create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let mut statuses = self.docker.wait_container(id, options);
        match statuses.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error; for us it is just a status
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err.into()),
            None => Err(EngineError::new("wait stream ended without an exit status")),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<String> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            follow: false,
            ..Default::default()
        });
        let mut chunks = self.docker.logs(id, options);
        let mut stdout = Vec::new();
        while let Some(chunk) = chunks.next().await {
            match chunk? {
                // with a tty allocated the daemon sends a single raw stream
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.extend_from_slice(&message)
                }
                LogOutput::StdErr { .. } | LogOutput::StdIn { .. } => {}
            }
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        let options = Some(StopContainerOptions {
            t: grace.as_secs() as i64,
        });
        match self.docker.stop_container(id, options).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code, .. })
                if status_code == NOT_MODIFIED =>
            {
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.docker.remove_container(id, options).await?;
        Ok(())
    }
}

/// Docker takes the interval in nanoseconds as an `i64`; longer intervals saturate.
fn health_config(check: &HealthProbe) -> HealthConfig {
    let interval = i64::try_from(check.interval.as_nanos()).unwrap_or(i64::MAX);
    HealthConfig {
        test: Some(vec!["CMD-SHELL".to_string(), check.command.clone()]),
        interval: Some(interval),
        retries: Some(i64::from(check.retries)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_check(interval: Duration) -> HealthProbe {
        HealthProbe {
            command: "test -f /tmp/ready".to_string(),
            interval,
            retries: 3,
        }
    }

    #[test]
    fn health_interval_is_sent_in_nanoseconds() {
        let config = health_config(&health_check(Duration::from_secs(1)));
        assert_eq!(config.interval, Some(1_000_000_000));
        assert_eq!(config.retries, Some(3));
        assert_eq!(
            config.test,
            Some(vec![
                "CMD-SHELL".to_string(),
                "test -f /tmp/ready".to_string()
            ])
        );
    }

    #[test]
    fn oversized_health_interval_saturates() {
        let config = health_config(&health_check(Duration::MAX));
        assert_eq!(config.interval, Some(i64::MAX));
    }

    #[test]
    fn untagged_images_pull_latest() {
        assert_eq!(image_reference("alpine"), ("alpine", "latest"));
        assert_eq!(image_reference("library/alpine"), ("library/alpine", "latest"));
    }

    #[test]
    fn explicit_tags_are_split_off() {
        assert_eq!(image_reference("alpine:3.19"), ("alpine", "3.19"));
        assert_eq!(
            image_reference("registry.local:5000/team/tool:v2"),
            ("registry.local:5000/team/tool", "v2")
        );
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        assert_eq!(
            image_reference("registry.local:5000/tool"),
            ("registry.local:5000/tool", "latest")
        );
    }

    #[test]
    fn digests_are_passed_through() {
        let image = "alpine@sha256:0123abcd";
        assert_eq!(image_reference(image), (image, ""));
    }
}
