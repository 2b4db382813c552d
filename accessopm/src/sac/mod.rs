/*
 * sac - the Secure Access Cloud control-plane as seen by the reconcilers.
 */
mod client;
pub mod dto;
mod oauth;

pub use client::HttpSacClient;
pub use oauth::SacSettings;

use crate::model::ApplicationType;
use async_trait::async_trait;
use dto::{ApplicationDto, ConnectorDto, DeploymentParametersDto, PolicyDto, SiteDto};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SacError {

    /* every find signals this when nothing matches */
    #[error("not found")]
    NotFound,

    /* create with a name that's already taken */
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed with status-code: {status} and body: {body}")]
    Status { status: u16, body: String },

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unable to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unable to get an access token: {0}")]
    Token(String),
}

#[async_trait]
pub trait SacClient: Send + Sync {

    async fn create_application(&self, application: &ApplicationDto) -> Result<ApplicationDto, SacError>;

    async fn update_application(&self, id: &str, application: &ApplicationDto) -> Result<ApplicationDto, SacError>;

    async fn find_application_by_id(&self, id: &str) -> Result<ApplicationDto, SacError>;

    async fn find_application_by_name(&self, name: &str) -> Result<ApplicationDto, SacError>;

    async fn delete_application(&self, id: &str) -> Result<(), SacError>;

    async fn find_policy_by_name(&self, name: &str) -> Result<PolicyDto, SacError>;

    /*
     * Resolves the policies in order, the first lookup that fails aborts.
     */
    async fn find_policies_by_names(&self, names: &[String]) -> Result<Vec<PolicyDto>, SacError> {
	let mut policies = Vec::with_capacity(names.len());
	for name in names {
	    policies.push(self.find_policy_by_name(name).await?);
	}
	Ok(policies)
    }

    /* replaces the full list of policies enforced on the application */
    async fn update_policies(&self, application_id: &str, application_type: ApplicationType, policy_ids: &[String]) -> Result<(), SacError>;

    async fn create_site(&self, site: &SiteDto) -> Result<SiteDto, SacError>;

    async fn find_site_by_name(&self, name: &str) -> Result<SiteDto, SacError>;

    async fn delete_site(&self, id: &str) -> Result<(), SacError>;

    async fn bind_application_to_site(&self, application_id: &str, site_id: &str) -> Result<(), SacError>;

    async fn create_connector(&self, site_id: &str, name: &str) -> Result<ConnectorDto, SacError>;

    async fn list_connectors_by_site(&self, site_id: &str) -> Result<Vec<ConnectorDto>, SacError>;

    async fn delete_connector(&self, id: &str) -> Result<(), SacError>;

    /* the one-time credentials a new connector registers with */
    async fn connector_deployment_parameters(&self, id: &str) -> Result<DeploymentParametersDto, SacError>;
}
