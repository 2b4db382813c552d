use crate::model::{Connector, ConnectorStatus, Site};
use accessop_api as api;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::core::v1::Pod as KubePod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Resource as KubeResource;
use kube::api::DeleteParams as KubeDeleteParams;
use kube::api::ListParams as KubeListParams;
use kube::api::PostParams as KubePostParams;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

// a connector that isn't up after this long is given up on
const STARTUP_GRACE_SECS: i64 = 120;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid pod template: {0}")]
    Template(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateConnectorParams {
    pub connector_id: String,
    pub name: String,
    pub image: String,
    pub image_pull_secret: Option<String>,
    pub env: BTreeMap<String, String>,
}

/*
 * ConnectorDeployer materializes connectors as workloads in the cluster and
 * reports what is currently running for a site.
 */
#[async_trait]
pub trait ConnectorDeployer: Send + Sync {

    /* returns the deployment name of the new workload */
    async fn create_connector(&self, site: &Site, params: &CreateConnectorParams) -> Result<String, DeployError>;

    /* deleting a workload that is already gone succeeds */
    async fn delete_connector(&self, site: &Site, deployment_name: &str) -> Result<(), DeployError>;

    async fn get_connectors_for_site(&self, site: &Site) -> Result<Vec<Connector>, DeployError>;
}

/*
 * Health of a connector workload from its pod phase:
 *
 *   Running + ready      -> Healthy
 *   Failed | Succeeded   -> Unhealthy (connectors never exit on their own)
 *   anything else        -> Healthy during the startup grace, Unhealthy after
 */
pub fn connector_status(phase: Option<&str>, ready: bool, created: DateTime<Utc>, now: DateTime<Utc>) -> ConnectorStatus {
    let within_grace = now - created <= ChronoDuration::seconds(STARTUP_GRACE_SECS);

    match phase {
	Some("Running") if ready => ConnectorStatus::Healthy,
	Some("Failed") | Some("Succeeded") => ConnectorStatus::Unhealthy,
	_ if within_grace => ConnectorStatus::Healthy,
	_ => ConnectorStatus::Unhealthy,
    }
}

pub fn site_selector(site: &Site) -> String {
    format!("{}={},{}={}", api::SITE_LABEL, site.name, api::MANAGED_BY_LABEL, api::MANAGED_BY)
}

/*
 * Builds the connector pod, for example:
 *
 *   kind: Pod
 *   metadata:
 *     name: site-a-default-qxzv
 *     labels:
 *       access.secure-access-cloud.symantec.com/site: site-a
 *       access.secure-access-cloud.symantec.com/managed-by: accessop
 *     annotations:
 *       access.secure-access-cloud.symantec.com/connector: <connector id>
 *   spec:
 *     containers:
 *       - name: connector
 *         env: [ ENDPOINT_URL, TENANT_IDENTIFIER, ... ]
 *
 */
pub fn connector_pod(site: &Site, params: &CreateConnectorParams, owner: Option<OwnerReference>) -> Result<KubePod, DeployError> {
    let env: Vec<_> = params.env.iter()
	.map(|(name, value)| json!({ "name": name, "value": value }))
	.collect();

    let image_pull_secrets: Vec<_> = params.image_pull_secret.iter()
	.map(|secret| json!({ "name": secret }))
	.collect();

    let owner_references: Vec<_> = owner.into_iter().collect();

    let pod = serde_json::from_value(json!({
	"apiVersion": "v1",
	"kind": "Pod",
	"metadata": {
	    "name": params.name,
	    "namespace": site.connectors_namespace,
	    "labels": {
		(api::SITE_LABEL): site.name,
		(api::MANAGED_BY_LABEL): api::MANAGED_BY,
	    },
	    "annotations": {
		(api::CONNECTOR_ANNOTATION): params.connector_id,
	    },
	    "ownerReferences": owner_references,
	},
	"spec": {
	    "restartPolicy": "Always",
	    "imagePullSecrets": image_pull_secrets,
	    "securityContext": {
		"runAsUser": 1000,
		"runAsGroup": 1000,
	    },
	    "containers": [{
		"name": "connector",
		"image": params.image,
		"env": env,
	    }],
	},
    }))?;

    Ok(pod)
}

fn connector_from(pod: &KubePod, now: DateTime<Utc>) -> Connector {
    let created = pod.metadata.creation_timestamp.as_ref()
	.map(|ts| ts.0)
	.unwrap_or(now);

    let sac_id = pod.metadata.annotations.as_ref()
	.and_then(|annotations| annotations.get(api::CONNECTOR_ANNOTATION))
	.cloned()
	.unwrap_or_default();

    let status = pod.status.as_ref();
    let phase = status.and_then(|s| s.phase.as_deref());
    let ready = status
	.and_then(|s| s.container_statuses.as_ref())
	.and_then(|containers| containers.first())
	.map(|container| container.ready)
	.unwrap_or(false);

    Connector{
	sac_id,
	deployment_name: pod.metadata.name.clone().unwrap_or_default(),
	created,
	status: connector_status(phase, ready, created, now),
    }
}

/*
 * PodDeployer runs every connector as a bare Pod in the site's connectors
 * namespace.
 */
#[derive(Clone)]
pub struct PodDeployer {
    kube_client: KubeClient,
}

impl PodDeployer {

    pub fn new(kube_client: KubeClient) -> Self {
	PodDeployer{ kube_client }
    }

    fn pods(&self, site: &Site) -> KubeApi<KubePod> {
	KubeApi::namespaced(self.kube_client.clone(), &site.connectors_namespace)
    }

    /*
     * Pods can only be owned by a Site living in the same namespace, across
     * namespaces they are removed while the Site's finalizer is held.
     */
    async fn owner_of(&self, site: &Site) -> Result<Option<OwnerReference>, DeployError> {
	if site.connectors_namespace != site.namespace {
	    return Ok(None);
	}

	let sites: KubeApi<api::Site> = KubeApi::namespaced(self.kube_client.clone(), &site.namespace);
	let site_cr = sites.get(&site.name).await?;
	Ok(site_cr.controller_owner_ref(&()))
    }
}

#[async_trait]
impl ConnectorDeployer for PodDeployer {

    async fn create_connector(&self, site: &Site, params: &CreateConnectorParams) -> Result<String, DeployError> {
	let owner = self.owner_of(site).await?;
	let pod = connector_pod(site, params, owner)?;

	log::info!("creating connector pod {}/{} for site {}", site.connectors_namespace, params.name, site.name);
	let created = self.pods(site).create(&KubePostParams::default(), &pod).await?;

	created.metadata.name
	    .ok_or_else(|| DeployError::Other(format!("created pod for connector {} has no name", params.connector_id)))
    }

    async fn delete_connector(&self, site: &Site, deployment_name: &str) -> Result<(), DeployError> {
	log::info!("deleting connector pod {}/{}", site.connectors_namespace, deployment_name);

	match self.pods(site).delete(deployment_name, &KubeDeleteParams::default()).await {
	    Ok(_) => Ok(()),
	    Err(kube::Error::Api(resp)) if resp.code == 404 => {
		log::debug!("connector pod {}/{} is already gone", site.connectors_namespace, deployment_name);
		Ok(())
	    },
	    Err(err) => Err(err.into()),
	}
    }

    async fn get_connectors_for_site(&self, site: &Site) -> Result<Vec<Connector>, DeployError> {
	let params = KubeListParams::default().labels(&site_selector(site));
	let pods = self.pods(site).list(&params).await?;
	let now = Utc::now();

	// pods on their way out are neither counted nor deleted again
	let connectors = pods.items.iter()
	    .filter(|pod| pod.metadata.deletion_timestamp.is_none())
	    .map(|pod| connector_from(pod, now))
	    .collect();

	Ok(connectors)
    }
}
