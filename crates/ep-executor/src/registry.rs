//! Registry and repository operations
//!
//! These run from the bootstrap node only: the registry and the file
//! repository are served from there.

use std::sync::Arc;

use ep_core::config::RegistrySettings;
use ep_core::traits::{RegistryClient, RegistryEndpoint, RepositoryClient};
use ep_core::NodeInfo;

use crate::error::ExecutorError;
use crate::executor::Executor;

/// Revision used when a pull names none
pub const DEFAULT_REVISION: &str = "0.0.0";

/// `oci://` location of a repository file
pub fn pull_url(settings: &RegistrySettings, content_ref: &str, revision: &str) -> String {
    format!(
        "oci://{}:{}/{}/{}:{}",
        settings.provider_ip,
        settings.registry_port,
        settings.project,
        content_ref,
        revision_or_default(revision)
    )
}

fn revision_or_default(revision: &str) -> &str {
    if revision.is_empty() {
        DEFAULT_REVISION
    } else {
        revision
    }
}

impl Executor {
    /// Every target must be the bootstrap node
    fn ensure_day0_only(
        &self,
        operation: &'static str,
        targets: &[Arc<NodeInfo>],
    ) -> Result<Arc<NodeInfo>, ExecutorError> {
        let day0 = self.topology.day0();
        if let Some(other) = targets.iter().find(|n| n.ip() != day0.ip()) {
            tracing::error!(operation, node = %other.ip(), "Operation only supported on day-0");
            return Err(ExecutorError::DayZeroOnly {
                operation,
                node: other.ip().to_string(),
            });
        }
        Ok(Arc::clone(day0))
    }

    fn registry_settings(&self, operation: &str) -> Result<&RegistrySettings, ExecutorError> {
        self.registry.as_ref().ok_or_else(|| {
            ExecutorError::Validation(format!("{}: no registry settings configured", operation))
        })
    }

    fn registry_client(&self, operation: &str) -> Result<&Arc<dyn RegistryClient>, ExecutorError> {
        self.registry_client.as_ref().ok_or_else(|| {
            ExecutorError::Validation(format!("{}: no registry client configured", operation))
        })
    }

    fn repository_client(
        &self,
        operation: &str,
    ) -> Result<&Arc<dyn RepositoryClient>, ExecutorError> {
        self.repository_client.as_ref().ok_or_else(|| {
            ExecutorError::Validation(format!("{}: no repository client configured", operation))
        })
    }

    fn endpoint(&self, operation: &str) -> Result<RegistryEndpoint, ExecutorError> {
        Ok(self.registry_settings(operation)?.endpoint())
    }

    /// Push images into the cluster registry, creating projects as needed
    pub async fn push_image(
        &self,
        targets: &[Arc<NodeInfo>],
        images: &[String],
    ) -> Result<(), ExecutorError> {
        const OP: &str = "push-image";
        let day0 = self.ensure_day0_only(OP, targets)?;
        let images = self.templater.cmd_override_with_node(images, &day0)?;
        let endpoint = self.endpoint(OP)?;
        let client = self.registry_client(OP)?;

        let auth = client
            .resolve_auth(&endpoint)
            .await
            .map_err(ExecutorError::Registry)?;
        let mapped = client
            .map_and_create_projects(&endpoint, &images)
            .await
            .map_err(ExecutorError::Registry)?;

        for image in &mapped {
            let tag = client
                .retag_to_local(image, &auth.server_address)
                .await
                .map_err(ExecutorError::Registry)?;
            tracing::info!(image = %image, tag = %tag, "Pushing image");
            client
                .push_image(&tag, &auth)
                .await
                .map_err(ExecutorError::Registry)?;
        }
        Ok(())
    }

    /// Push `args = [file, content_ref, revision]` into the file repository.
    /// An empty revision means `0.0.0`.
    pub async fn push_file(
        &self,
        targets: &[Arc<NodeInfo>],
        args: &[String],
    ) -> Result<(), ExecutorError> {
        const OP: &str = "push-file";
        let day0 = self.ensure_day0_only(OP, targets)?;
        if args.len() < 3 {
            return Err(ExecutorError::Validation(format!(
                "{}: expected <file> <content_ref> <revision>",
                OP
            )));
        }
        let args = self.templater.cmd_override_with_node(args, &day0)?;
        let client = self.repository_client(OP)?;

        let (file, content_ref) = (&args[0], &args[1]);
        let revision = revision_or_default(&args[2]);
        tracing::debug!(file = %file, content_ref = %content_ref, revision = %revision, "Pushing file");
        let digest = client
            .push_file(file, content_ref, revision)
            .await
            .map_err(ExecutorError::Repository)?;
        tracing::info!(file = %file, digest = %digest, "File pushed");
        Ok(())
    }

    /// Pull `args = [dest, content_ref, revision]` from the file repository.
    /// An empty revision means `0.0.0`.
    pub async fn pull_file(
        &self,
        targets: &[Arc<NodeInfo>],
        args: &[String],
    ) -> Result<(), ExecutorError> {
        const OP: &str = "pull-file";
        let day0 = self.ensure_day0_only(OP, targets)?;
        if args.len() < 3 {
            return Err(ExecutorError::Validation(format!(
                "{}: expected <dest> <content_ref> <revision>",
                OP
            )));
        }
        let args = self.templater.cmd_override_with_node(args, &day0)?;
        let settings = self.registry_settings(OP)?;
        let client = self.repository_client(OP)?;

        let url = pull_url(settings, &args[1], &args[2]);
        tracing::debug!(url = %url, dest = %args[0], "Pulling file");
        client
            .pull_file(&args[0], &url)
            .await
            .map_err(ExecutorError::Repository)
    }

    /// Create the registry projects the images map to. Safe to repeat.
    pub async fn create_registry_projects(&self, images: &[String]) -> Result<(), ExecutorError> {
        const OP: &str = "create-registry-projects";
        let endpoint = self.endpoint(OP)?;
        let client = self.registry_client(OP)?;

        tracing::debug!(images = ?images, "Creating registry projects");
        client
            .map_and_create_projects(&endpoint, images)
            .await
            .map_err(ExecutorError::Registry)?;
        Ok(())
    }
}
