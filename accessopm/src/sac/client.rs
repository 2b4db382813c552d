use crate::model::ApplicationType;
use crate::sac::dto::{
    ApplicationDto, ConnectorDto, DeploymentParametersDto, Page, PolicyBindingDto, PolicyDto, SiteDto,
};
use crate::sac::oauth::{SacSettings, TokenSource};
use crate::sac::{SacClient, SacError};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/*
 * Secure Access Cloud REST client. The underlying http client and the token
 * source are created once in new() and shared by every call.
 */
pub struct HttpSacClient {
    http: reqwest::Client,
    settings: SacSettings,
    tokens: TokenSource,
}

impl HttpSacClient {

    pub fn new(settings: SacSettings) -> Result<Self, SacError> {
	let http = reqwest::Client::builder()
	    .timeout(REQUEST_TIMEOUT)
	    .build()?;

	Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: SacSettings) -> Self {
	let tokens = TokenSource::new(http.clone(), &settings);
	HttpSacClient{ http, settings, tokens }
    }

    fn filtered(&self, path: &str, key: &str, value: &str) -> Result<Url, SacError> {
	let mut url = self.settings.endpoint(path)?;
	url.query_pairs_mut().append_pair(key, value);
	Ok(url)
    }

    async fn send<B: Serialize + Sync>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Vec<u8>, SacError> {
	log::debug!("{} {}", method, url);

	let token = self.tokens.token().await?;
	let mut request = self.http.request(method, url).bearer_auth(token);
	if let Some(body) = body {
	    request = request.json(body);
	}

	let response = request.send().await?;
	let status = response.status();
	let payload = response.bytes().await?.to_vec();

	match status {
	    s if s.is_success() => Ok(payload),
	    StatusCode::NOT_FOUND => Err(SacError::NotFound),
	    StatusCode::CONFLICT => Err(SacError::Conflict(String::from_utf8_lossy(&payload).into_owned())),
	    s => {
		if s == StatusCode::UNAUTHORIZED {
		    self.tokens.invalidate().await;
		}
		Err(SacError::Status{ status: s.as_u16(), body: String::from_utf8_lossy(&payload).into_owned() })
	    }
	}
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, SacError> {
	let payload = self.send::<()>(Method::GET, url, None).await?;
	Ok(serde_json::from_slice(&payload)?)
    }

    async fn modify<B: Serialize + Sync, T: DeserializeOwned>(&self, method: Method, url: Url, body: &B) -> Result<T, SacError> {
	let payload = self.send(method, url, Some(body)).await?;
	Ok(serde_json::from_slice(&payload)?)
    }
}

#[async_trait]
impl SacClient for HttpSacClient {

    async fn create_application(&self, application: &ApplicationDto) -> Result<ApplicationDto, SacError> {
	let url = self.settings.endpoint("/v2/applications")?;
	self.modify(Method::POST, url, application).await
    }

    async fn update_application(&self, id: &str, application: &ApplicationDto) -> Result<ApplicationDto, SacError> {
	let url = self.settings.endpoint(&format!("/v2/applications/{}", id))?;
	self.modify(Method::PUT, url, application).await
    }

    async fn find_application_by_id(&self, id: &str) -> Result<ApplicationDto, SacError> {
	let url = self.settings.endpoint(&format!("/v2/applications/{}", id))?;
	self.fetch(url).await
    }

    async fn find_application_by_name(&self, name: &str) -> Result<ApplicationDto, SacError> {
	let url = self.filtered("/v2/applications", "filter", name)?;
	let page: Page<ApplicationDto> = self.fetch(url).await?;
	page.find_named(name)
    }

    async fn delete_application(&self, id: &str) -> Result<(), SacError> {
	let url = self.settings.endpoint(&format!("/v2/applications/{}", id))?;
	self.send::<()>(Method::DELETE, url, None).await?;
	Ok(())
    }

    async fn find_policy_by_name(&self, name: &str) -> Result<PolicyDto, SacError> {
	let url = self.filtered("/v2/policies", "filter", name)?;
	let page: Page<PolicyDto> = self.fetch(url).await?;
	page.find_named(name)
    }

    async fn update_policies(&self, application_id: &str, application_type: ApplicationType, policy_ids: &[String]) -> Result<(), SacError> {
	let url = self.settings.endpoint(&format!("/v2/policies/by-app-id/{}", application_id))?;
	let binding = PolicyBindingDto{
	    application_type,
	    policy_ids: policy_ids.to_vec(),
	};

	self.send(Method::PUT, url, Some(&binding)).await?;
	Ok(())
    }

    async fn create_site(&self, site: &SiteDto) -> Result<SiteDto, SacError> {
	let url = self.settings.endpoint("/v2/sites")?;
	self.modify(Method::POST, url, site).await
    }

    async fn find_site_by_name(&self, name: &str) -> Result<SiteDto, SacError> {
	let url = self.filtered("/v2/sites", "filter", name)?;
	let page: Page<SiteDto> = self.fetch(url).await?;
	page.find_named(name)
    }

    async fn delete_site(&self, id: &str) -> Result<(), SacError> {
	let url = self.settings.endpoint(&format!("/v2/sites/{}", id))?;
	self.send::<()>(Method::DELETE, url, None).await?;
	Ok(())
    }

    async fn bind_application_to_site(&self, application_id: &str, site_id: &str) -> Result<(), SacError> {
	let url = self.settings.endpoint(&format!("/v2/applications/{}/site-binding/{}", application_id, site_id))?;
	self.send::<()>(Method::PUT, url, None).await?;
	Ok(())
    }

    async fn create_connector(&self, site_id: &str, name: &str) -> Result<ConnectorDto, SacError> {
	let url = self.filtered("/v2/connectors", "bind_to_site_id", site_id)?;
	self.modify(Method::POST, url, &json!({ "name": name })).await
    }

    async fn list_connectors_by_site(&self, site_id: &str) -> Result<Vec<ConnectorDto>, SacError> {
	let url = self.filtered("/v2/connectors", "site_id", site_id)?;
	let page: Page<ConnectorDto> = self.fetch(url).await?;
	Ok(page.content)
    }

    async fn delete_connector(&self, id: &str) -> Result<(), SacError> {
	let url = self.settings.endpoint(&format!("/v2/connectors/{}", id))?;
	self.send::<()>(Method::DELETE, url, None).await?;
	Ok(())
    }

    async fn connector_deployment_parameters(&self, id: &str) -> Result<DeploymentParametersDto, SacError> {
	let url = self.settings.endpoint(&format!("/v2/connectors/{}/deployment-parameters", id))?;
	self.fetch(url).await
    }
}
