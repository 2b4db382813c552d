use crate::AccessResource;

use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    Http,
    Ssh,
    Rdp,
    Tcp,
    DynamicSsh,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationSubType {
    HttpLuminateDomain,
    HttpCustomDomain,
    HttpWildcardDomain,
    SingleMachine,
    MultipleMachines,
    DynamicSsh,
}

impl ApplicationType {

    /*
     * The sub type used when the application does not declare one.
     */
    pub fn default_sub_type(&self) -> ApplicationSubType {
	match self {
	    ApplicationType::Http => ApplicationSubType::HttpLuminateDomain,
	    ApplicationType::Ssh | ApplicationType::Rdp | ApplicationType::Tcp => ApplicationSubType::SingleMachine,
	    ApplicationType::DynamicSsh => ApplicationSubType::DynamicSsh,
	}
    }

    pub fn accepts(&self, sub_type: ApplicationSubType) -> bool {
	match self {
	    ApplicationType::Http => matches!(sub_type,
		ApplicationSubType::HttpLuminateDomain
		| ApplicationSubType::HttpCustomDomain
		| ApplicationSubType::HttpWildcardDomain),
	    ApplicationType::Ssh | ApplicationType::Rdp | ApplicationType::Tcp => matches!(sub_type,
		ApplicationSubType::SingleMachine
		| ApplicationSubType::MultipleMachines),
	    ApplicationType::DynamicSsh => sub_type == ApplicationSubType::DynamicSsh,
	}
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct Service {

    // The service name
    pub name: String,

    // The service namespace (default is the application's namespace)
    pub namespace: Option<String>,

    // The port that will be exposed by this application
    pub port: String,

    // Protocol schema (default is based on port and application type)
    pub schema: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    pub subdomain: Option<String>,
    pub custom_external_address: Option<String>,
    pub custom_root_path: Option<String>,
    pub health_url: Option<String>,
    pub health_method: Option<String>,
    pub custom_ssl_certificate: Option<String>,
    pub wildcard_private_key: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkTranslationSettings {

    // default is true
    pub is_default_content_rewrite_rules_enabled: Option<bool>,

    // default is true
    pub is_default_header_rewrite_rules_enabled: Option<bool>,

    // default is false
    pub use_external_address_for_host_and_sni: Option<bool>,

    pub linked_applications: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestCustomizationSettings {
    pub header_customization: Option<BTreeMap<String, String>>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "access.secure-access-cloud.symantec.com", version = "v1", kind = "Application", namespaced)]
#[kube(status = "ApplicationStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {

    // name in Secure Access Cloud (default is <namespace>-<service name>)
    pub name: Option<String>,

    // default is HTTP
    #[serde(rename = "type")]
    pub application_type: Option<ApplicationType>,

    // default depends on the type, HTTP_LUMINATE_DOMAIN for HTTP
    pub sub_type: Option<ApplicationSubType>,

    pub service: Service,

    // The site to bind this application, it must already exist in the tenant
    pub site: String,

    pub access_policies: Option<Vec<String>>,

    pub activity_policies: Option<Vec<String>>,

    // default is true
    pub is_visible: Option<bool>,

    // default is false
    pub is_notification_enabled: Option<bool>,

    // default is true
    pub enabled: Option<bool>,

    pub connection_settings: Option<ConnectionSettings>,

    pub link_translation_settings: Option<LinkTranslationSettings>,

    pub request_customization_settings: Option<RequestCustomizationSettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {

    // The application-id in Secure Access Cloud
    pub id: Option<String>,

    // when the operator last modified the application successfully (RFC 3339)
    pub modified_on: Option<String>,

    pub failed_reason: Option<String>,
}

impl AccessResource for Application {
    type Status = ApplicationStatus;

    const FINALIZER: &'static str = "applications.access.secure-access-cloud.symantec.com/finalizer";

    fn remote_id(&self) -> Option<String> {
	self.status.as_ref()
	    .and_then(|status| status.id.clone())
	    .filter(|id| !id.is_empty())
    }
}
