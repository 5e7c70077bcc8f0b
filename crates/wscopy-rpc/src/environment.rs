//! Assembles the four service clients of one deployment into an [`Environment`].

use std::sync::Arc;

use wscopy_core::Environment;

use crate::blobstore::ShockClient;
use crate::handle::HandleClient;
use crate::samples::SampleClient;
use crate::transport::Transport;
use crate::workspace::WorkspaceClient;

/// Service URLs of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Workspace JSON-RPC endpoint; also the environment identity.
    pub workspace: String,
    /// Handle service JSON-RPC endpoint.
    pub handle: String,
    /// Blob store REST root.
    pub blobstore: String,
    /// Sample service JSON-RPC endpoint.
    pub samples: String,
}

impl ServiceEndpoints {
    /// Conventional endpoints below a deployment's `services/` root.
    #[must_use]
    pub fn under(base: &str) -> Self {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        Self {
            workspace: format!("{base}ws"),
            handle: format!("{base}handle_service"),
            blobstore: format!("{base}shock-api"),
            samples: format!("{base}sampleservice"),
        }
    }
}

/// Build an environment whose clients share `transport` and authenticate with `token`.
///
/// # Errors
///
/// Returns the first endpoint that fails to parse.
pub fn connect(
    endpoints: &ServiceEndpoints,
    token: Option<&str>,
    transport: &Transport,
) -> Result<Environment, url::ParseError> {
    let token = token.map(str::to_string);
    Ok(Environment {
        workspace: Arc::new(WorkspaceClient::new(
            &endpoints.workspace,
            token.clone(),
            transport.clone(),
        )?),
        handles: Arc::new(HandleClient::new(
            &endpoints.handle,
            token.clone(),
            transport.clone(),
        )?),
        blobs: Arc::new(ShockClient::new(
            &endpoints.blobstore,
            token.clone(),
            transport.clone(),
        )?),
        samples: Arc::new(SampleClient::new(
            &endpoints.samples,
            token,
            transport.clone(),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;
    use crate::retry::RetryPolicy;

    #[test]
    fn conventional_endpoints() {
        let endpoints = ServiceEndpoints::under("https://kbase.us/services");
        assert_eq!(endpoints.workspace, "https://kbase.us/services/ws");
        assert_eq!(endpoints.handle, "https://kbase.us/services/handle_service");
        assert_eq!(endpoints.blobstore, "https://kbase.us/services/shock-api");
        assert_eq!(endpoints.samples, "https://kbase.us/services/sampleservice");
        assert_eq!(ServiceEndpoints::under("https://kbase.us/services/"), endpoints);
    }

    #[test]
    fn environment_identity_is_the_workspace_url() -> anyhow::Result<()> {
        let transport = Transport::new(Client::new(), RetryPolicy::none());
        let env = connect(
            &ServiceEndpoints::under("https://ci.kbase.us/services"),
            Some("token"),
            &transport,
        )?;
        assert_eq!(env.identity(), "https://ci.kbase.us/services/ws");
        assert_eq!(env.blobs.url(), "https://ci.kbase.us/services/shock-api");
        Ok(())
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        let mut endpoints = ServiceEndpoints::under("https://ci.kbase.us/services");
        endpoints.samples = "sampleservice".into();
        let transport = Transport::new(Client::new(), RetryPolicy::none());
        assert!(connect(&endpoints, None, &transport).is_err());
    }
}
