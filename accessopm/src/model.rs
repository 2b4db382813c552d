/*
 * The domain model the reconcilers work on. Every optional field of the
 * desired-state records is resolved by the converter before reaching here.
 */
pub use accessop_api::ApplicationSubType;
pub use accessop_api::ApplicationType;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSettings {
    pub internal_address: String,
    pub subdomain: Option<String>,
    pub custom_external_address: Option<String>,
    pub custom_root_path: Option<String>,
    pub health_url: Option<String>,
    pub health_method: Option<String>,
    pub custom_ssl_certificate: Option<String>,
    pub wildcard_private_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkTranslationSettings {
    pub default_content_rewrite_rules: bool,
    pub default_header_rewrite_rules: bool,
    pub use_external_address_for_host_and_sni: bool,
    pub linked_applications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Application {

    // empty until the application is created in Secure Access Cloud
    pub id: String,

    pub name: String,
    pub application_type: ApplicationType,
    pub sub_type: ApplicationSubType,
    pub connection_settings: ConnectionSettings,
    pub link_translation_settings: Option<LinkTranslationSettings>,
    pub header_customization: Option<BTreeMap<String, String>>,

    pub site_name: String,
    pub access_policy_names: Vec<String>,
    pub activity_policy_names: Vec<String>,

    pub is_visible: bool,
    pub is_notification_enabled: bool,
    pub enabled: bool,

    pub to_delete: bool,
}

impl Application {

    /* access policies first, then activity policies */
    pub fn policy_names(&self) -> Vec<String> {
	let mut names = self.access_policy_names.clone();
	names.extend(self.activity_policy_names.iter().cloned());
	names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    pub namespace: String,

    // empty until the site is created in Secure Access Cloud
    pub sac_site_id: String,

    pub tenant_identifier: String,
    pub endpoint_url: String,
    pub number_of_connectors: u32,
    pub connectors_namespace: String,
    pub connector_image: String,
    pub image_pull_secret: Option<String>,

    pub to_delete: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectorStatus {
    Healthy,
    Unhealthy,
}

/*
 * A connector as observed in the current pass, never kept across passes.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {

    // registration id in Secure Access Cloud
    pub sac_id: String,

    // the workload (pod) name
    pub deployment_name: String,

    pub created: DateTime<Utc>,
    pub status: ConnectorStatus,
}
