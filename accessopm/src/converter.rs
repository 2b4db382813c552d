/*
 * Converts the desired-state records into the reconcilers' model and the
 * reconcilers' output back into status. Every default is resolved here.
 */
use crate::application::ApplicationOutput;
use crate::errors::Error;
use crate::model::{self, ApplicationType};
use crate::site::SiteOutput;
use accessop_api as api;
use accessop_api::AccessResource;

use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use std::collections::BTreeMap;

const MAX_APPLICATION_NAME: usize = 64;
const DEFAULT_NUMBER_OF_CONNECTORS: u32 = 1;

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, Error> {
    if value.trim().is_empty() {
	return Err(Error::unrecoverable(format!("{} cannot be empty", what)));
    }
    Ok(value)
}

/* Secure Access Cloud doesn't accept spaces and caps names at 64 characters */
fn valid_application_name(name: &str) -> String {
    name.replace(' ', "-")
	.chars()
	.take(MAX_APPLICATION_NAME)
	.collect()
}

fn schema_for(application_type: ApplicationType, service: &api::Service) -> String {
    if let Some(schema) = service.schema.as_ref().filter(|s| !s.is_empty()) {
	return schema.clone();
    }

    match application_type {
	ApplicationType::Http => match service.port.as_str() {
	    "443" | "8443" => "https".to_string(),
	    _ => "http".to_string(),
	},
	ApplicationType::Ssh
	| ApplicationType::Rdp
	| ApplicationType::Tcp
	| ApplicationType::DynamicSsh => "tcp".to_string(),
    }
}

fn internal_address(application_type: ApplicationType, service: &api::Service, namespace: &str) -> String {
    let service_namespace = service.namespace.as_deref()
	.filter(|ns| !ns.is_empty())
	.unwrap_or(namespace);

    format!("{}://{}.{}:{}", schema_for(application_type, service), service.name, service_namespace, service.port)
}

pub fn application_from(application: &api::Application) -> Result<model::Application, Error> {
    let spec = &application.spec;
    let namespace = application.namespace().unwrap_or_default();

    required(&spec.service.name, "service name")?;
    required(&spec.service.port, "service port")?;
    required(&spec.site, "site")?;

    let application_type = spec.application_type.unwrap_or(ApplicationType::Http);
    let sub_type = spec.sub_type.unwrap_or_else(|| application_type.default_sub_type());
    if !application_type.accepts(sub_type) {
	let errmsg = format!("sub type {:?} is not valid for application type {:?}", sub_type, application_type);
	return Err(Error::unrecoverable(errmsg));
    }

    let name = match spec.name.as_deref().filter(|n| !n.is_empty()) {
	Some(name) => name.to_string(),
	None => format!("{}-{}", namespace, spec.service.name),
    };

    let settings = spec.connection_settings.clone().unwrap_or_default();
    let connection_settings = model::ConnectionSettings{
	internal_address: internal_address(application_type, &spec.service, &namespace),
	subdomain: settings.subdomain,
	custom_external_address: settings.custom_external_address,
	custom_root_path: settings.custom_root_path,
	health_url: settings.health_url,
	health_method: settings.health_method,
	custom_ssl_certificate: settings.custom_ssl_certificate,
	wildcard_private_key: settings.wildcard_private_key,
    };

    let link_translation_settings = spec.link_translation_settings.as_ref().map(|lt| model::LinkTranslationSettings{
	default_content_rewrite_rules: lt.is_default_content_rewrite_rules_enabled.unwrap_or(true),
	default_header_rewrite_rules: lt.is_default_header_rewrite_rules_enabled.unwrap_or(true),
	use_external_address_for_host_and_sni: lt.use_external_address_for_host_and_sni.unwrap_or(false),
	linked_applications: lt.linked_applications.clone().unwrap_or_default(),
    });

    let header_customization = spec.request_customization_settings.as_ref()
	.and_then(|rc| rc.header_customization.clone());

    Ok(model::Application{
	id: application.remote_id().unwrap_or_default(),
	name: valid_application_name(&name),
	application_type,
	sub_type,
	connection_settings,
	link_translation_settings,
	header_customization,
	site_name: spec.site.clone(),
	access_policy_names: spec.access_policies.clone().unwrap_or_default(),
	activity_policy_names: spec.activity_policies.clone().unwrap_or_default(),
	is_visible: spec.is_visible.unwrap_or(true),
	is_notification_enabled: spec.is_notification_enabled.unwrap_or(false),
	enabled: spec.enabled.unwrap_or(true),
	to_delete: application.metadata.deletion_timestamp.is_some(),
    })
}

pub fn site_from(site: &api::Site, default_image: &str) -> Result<model::Site, Error> {
    let spec = &site.spec;
    let namespace = site.namespace().unwrap_or_default();

    required(&spec.tenant_identifier, "tenant identifier")?;
    required(&spec.endpoint_url, "endpoint url")?;

    let connectors_namespace = spec.connectors_namespace.clone()
	.filter(|ns| !ns.is_empty())
	.unwrap_or_else(|| namespace.clone());

    let connector_image = spec.connector_image.clone()
	.filter(|image| !image.is_empty())
	.unwrap_or_else(|| default_image.to_string());

    Ok(model::Site{
	name: site.name_any(),
	namespace,
	sac_site_id: site.remote_id().unwrap_or_default(),
	tenant_identifier: spec.tenant_identifier.clone(),
	endpoint_url: spec.endpoint_url.clone(),
	number_of_connectors: spec.number_of_connectors.unwrap_or(DEFAULT_NUMBER_OF_CONNECTORS),
	connectors_namespace,
	connector_image,
	image_pull_secret: spec.image_pull_secret.clone().filter(|s| !s.is_empty()),
	to_delete: site.metadata.deletion_timestamp.is_some(),
    })
}

fn rfc3339(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn non_empty(id: &str) -> Option<String> {
    Some(id.to_string()).filter(|id| !id.is_empty())
}

/*
 * modifiedOn only moves forward on a fully successful pass.
 */
pub fn application_status(output: &ApplicationOutput, result: &Result<(), Error>, previous: Option<&api::ApplicationStatus>, now: DateTime<Utc>) -> api::ApplicationStatus {
    let modified_on = match result {
	Ok(()) => Some(rfc3339(now)),
	Err(_) => previous.and_then(|status| status.modified_on.clone()),
    };

    api::ApplicationStatus{
	id: non_empty(&output.remote_id),
	modified_on,
	failed_reason: result.as_ref().err().map(|err| err.to_string()),
    }
}

fn by_deployment(connectors: &[model::Connector]) -> BTreeMap<String, String> {
    connectors.iter()
	.map(|c| (c.deployment_name.clone(), c.sac_id.clone()))
	.collect()
}

pub fn site_status(output: &SiteOutput, result: &Result<(), Error>, now: DateTime<Utc>) -> api::SiteStatus {
    api::SiteStatus{
	id: non_empty(&output.remote_id),
	healthy_connectors: by_deployment(&output.healthy),
	unhealthy_connectors: by_deployment(&output.unhealthy),
	number_of_healthy_connectors: output.healthy.len(),
	failed_reason: result.as_ref().err().map(|err| err.to_string()),
	last_updated: Some(rfc3339(now)),
    }
}
