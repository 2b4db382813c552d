use crate::model::{Application, ApplicationSubType, ApplicationType, Site};
use crate::sac::SacError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettingsDto {
    #[serde(default)]
    pub internal_address: String,
    #[serde(rename = "subDomain", skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_external_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_root_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_method: Option<String>,
    #[serde(rename = "customSSLCertificate", skip_serializing_if = "Option::is_none")]
    pub custom_ssl_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard_private_key: Option<String>,

    // whatever else the remote keeps in here, we hand it back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkTranslationSettingsDto {
    pub is_default_content_rewrite_rules_enabled: bool,
    pub is_default_header_rewrite_rules_enabled: bool,
    pub use_external_address_for_host_and_sni: bool,
    pub linked_applications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestCustomizationSettingsDto {
    pub header_customization: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub application_type: ApplicationType,
    pub sub_type: ApplicationSubType,
    #[serde(default)]
    pub connection_settings: ConnectionSettingsDto,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_notification_enabled: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_translation_settings: Option<LinkTranslationSettingsDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_customization_settings: Option<RequestCustomizationSettingsDto>,

    // attributes this operator doesn't own (icon, audit fields, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&Application> for ApplicationDto {
    fn from(application: &Application) -> Self {
	let settings = &application.connection_settings;

	ApplicationDto{
	    id: Some(application.id.clone()).filter(|id| !id.is_empty()),
	    name: application.name.clone(),
	    application_type: application.application_type,
	    sub_type: application.sub_type,
	    connection_settings: ConnectionSettingsDto{
		internal_address: settings.internal_address.clone(),
		subdomain: settings.subdomain.clone(),
		custom_external_address: settings.custom_external_address.clone(),
		custom_root_path: settings.custom_root_path.clone(),
		health_url: settings.health_url.clone(),
		health_method: settings.health_method.clone(),
		custom_ssl_certificate: settings.custom_ssl_certificate.clone(),
		wildcard_private_key: settings.wildcard_private_key.clone(),
		extra: Map::new(),
	    },
	    is_visible: application.is_visible,
	    is_notification_enabled: application.is_notification_enabled,
	    enabled: application.enabled,
	    link_translation_settings: application.link_translation_settings.as_ref().map(|lt| LinkTranslationSettingsDto{
		is_default_content_rewrite_rules_enabled: lt.default_content_rewrite_rules,
		is_default_header_rewrite_rules_enabled: lt.default_header_rewrite_rules,
		use_external_address_for_host_and_sni: lt.use_external_address_for_host_and_sni,
		linked_applications: lt.linked_applications.clone(),
	    }),
	    request_customization_settings: application.header_customization.as_ref().map(|headers| RequestCustomizationSettingsDto{
		header_customization: headers.clone(),
	    }),
	    extra: Map::new(),
	}
    }
}

/*
 * Overwrites the fields owned by the operator on top of what the remote
 * currently has. Anything the operator doesn't know about is preserved.
 * The known connection settings are owned as a whole, an option the
 * application leaves out is cleared remotely. Link translation and request
 * customization keep their remote value unless the application declares them.
 */
pub fn merge_application(existing: ApplicationDto, desired: ApplicationDto) -> ApplicationDto {
    let mut merged = existing;
    let settings = desired.connection_settings;

    merged.name = desired.name;
    merged.application_type = desired.application_type;
    merged.sub_type = desired.sub_type;
    merged.is_visible = desired.is_visible;
    merged.is_notification_enabled = desired.is_notification_enabled;
    merged.enabled = desired.enabled;

    merged.connection_settings.internal_address = settings.internal_address;
    merged.connection_settings.subdomain = settings.subdomain;
    merged.connection_settings.custom_external_address = settings.custom_external_address;
    merged.connection_settings.custom_root_path = settings.custom_root_path;
    merged.connection_settings.health_url = settings.health_url;
    merged.connection_settings.health_method = settings.health_method;
    merged.connection_settings.custom_ssl_certificate = settings.custom_ssl_certificate;
    merged.connection_settings.wildcard_private_key = settings.wildcard_private_key;

    if desired.link_translation_settings.is_some() {
	merged.link_translation_settings = desired.link_translation_settings;
    }
    if desired.request_customization_settings.is_some() {
	merged.request_customization_settings = desired.request_customization_settings;
    }

    merged
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Site> for SiteDto {
    fn from(site: &Site) -> Self {
	SiteDto{
	    id: None,
	    name: site.name.clone(),
	    description: Some(format!("managed by accessop ({}/{})", site.namespace, site.name)),
	}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBindingDto {
    pub application_type: ApplicationType,
    pub policy_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDto {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentParametersDto {

    // one-time password the connector registers with
    pub otp: String,

    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub number_of_elements: usize,
    #[serde(default)]
    pub total_elements: usize,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
}

pub trait Named {
    fn name(&self) -> &str;
}

impl Named for ApplicationDto {
    fn name(&self) -> &str { &self.name }
}

impl Named for SiteDto {
    fn name(&self) -> &str { &self.name }
}

impl Named for PolicyDto {
    fn name(&self) -> &str { &self.name }
}

impl<T: Named> Page<T> {

    /*
     * The remote filter matches partially, only an exact name counts as found.
     */
    pub fn find_named(self, name: &str) -> Result<T, SacError> {
	self.content.into_iter()
	    .find(|item| item.name() == name)
	    .ok_or(SacError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remote_application() -> ApplicationDto {
	serde_json::from_value(json!({
	    "id": "app-1",
	    "name": "old-name",
	    "type": "HTTP",
	    "subType": "HTTP_LUMINATE_DOMAIN",
	    "icon": "data:image/png;base64,AAAA",
	    "isVisible": false,
	    "isNotificationEnabled": true,
	    "enabled": true,
	    "connectionSettings": {
		"internalAddress": "http://old.default:80",
		"externalAddress": "old.tenant.luminatesite.com",
		"subDomain": "old"
	    }
	})).unwrap()
    }

    #[test]
    fn merge_overwrites_owned_fields_only() {
	let mut application = testing::application("svc");
	application.is_visible = true;
	application.is_notification_enabled = false;
	let desired = ApplicationDto::from(&application);

	let merged = merge_application(remote_application(), desired);

	assert_eq!(merged.id.as_deref(), Some("app-1"));
	assert_eq!(merged.name, "svc");
	assert!(merged.is_visible);
	assert!(!merged.is_notification_enabled);
	assert_eq!(merged.connection_settings.internal_address, "http://svc.default:80");
	assert_eq!(merged.connection_settings.subdomain, None);
	assert_eq!(merged.extra.get("icon"), Some(&json!("data:image/png;base64,AAAA")));
	assert_eq!(merged.connection_settings.extra.get("externalAddress"), Some(&json!("old.tenant.luminatesite.com")));
    }

    #[test]
    fn merged_application_serializes_unknown_attributes_back() {
	let merged = merge_application(remote_application(), ApplicationDto::from(&testing::application("svc")));
	let body = serde_json::to_value(&merged).unwrap();

	assert_eq!(body["icon"], json!("data:image/png;base64,AAAA"));
	assert_eq!(body["connectionSettings"]["externalAddress"], json!("old.tenant.luminatesite.com"));
	assert_eq!(body["type"], json!("HTTP"));
    }

    #[test]
    fn new_application_has_no_id() {
	let body = serde_json::to_value(ApplicationDto::from(&testing::application("svc"))).unwrap();
	assert!(body.get("id").is_none());
    }

    #[test]
    fn find_named_requires_an_exact_match() {
	let page: Page<PolicyDto> = serde_json::from_value(json!({
	    "content": [
		{ "id": "1", "name": "p1-admins" },
		{ "id": "2", "name": "p1" }
	    ],
	    "numberOfElements": 2
	})).unwrap();

	assert_eq!(page.clone().find_named("p1").unwrap().id, "2");
	assert!(matches!(page.find_named("p"), Err(SacError::NotFound)));
    }

    #[test]
    fn application_pages_decode_without_paging_fields() {
	let page: Page<ApplicationDto> = serde_json::from_value(json!({
	    "content": [{
		"id": "app-1",
		"name": "svc",
		"type": "HTTP",
		"subType": "HTTP_LUMINATE_DOMAIN",
		"connectionSettings": { "internalAddress": "http://svc.default:80" }
	    }]
	})).unwrap();

	assert_eq!(page.number_of_elements, 0);
	assert_eq!(page.find_named("svc").unwrap().id.as_deref(), Some("app-1"));
    }

    #[test]
    fn undeclared_link_translation_keeps_the_remote_value() {
	let mut remote = remote_application();
	remote.link_translation_settings = serde_json::from_value(json!({ "isDefaultContentRewriteRulesEnabled": false })).unwrap();
	let desired = ApplicationDto::from(&testing::application("svc"));
	assert!(desired.link_translation_settings.is_none());

	let merged = merge_application(remote.clone(), desired);

	assert_eq!(merged.link_translation_settings, remote.link_translation_settings);
	assert!(merged.link_translation_settings.is_some());
    }

    #[test]
    fn empty_page_is_not_found() {
	let page: Page<SiteDto> = serde_json::from_value(json!({ "numberOfElements": 0 })).unwrap();
	assert!(matches!(page.find_named("site-a"), Err(SacError::NotFound)));
    }
}
