use crate::deployer::{ConnectorDeployer, CreateConnectorParams};
use crate::errors::{self, Error};
use crate::model::{Connector, ConnectorStatus, Site};
use crate::sac::dto::SiteDto;
use crate::sac::{SacClient, SacError};

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteOutput {
    pub deleted: bool,
    pub remote_id: String,

    // the fleet as left by this pass
    pub healthy: Vec<Connector>,

    // unhealthy connectors this pass didn't manage to purge
    pub unhealthy: Vec<Connector>,
}

/*
 * Picks which healthy connectors go when the fleet is larger than desired.
 * The oldest connectors are kept, the newest are evicted first and equal
 * timestamps are ordered by deployment name. Returned in eviction order.
 */
pub fn select_for_eviction(healthy: &[Connector], desired: usize) -> Vec<Connector> {
    let mut by_age = healthy.to_vec();
    by_age.sort_by(|a, b| a.created.cmp(&b.created)
		   .then_with(|| a.deployment_name.cmp(&b.deployment_name)));

    if by_age.len() <= desired {
	return vec![];
    }

    let mut surplus = by_age.split_off(desired);
    surplus.reverse();
    surplus
}

/*
 * {site}-{namespace}-{4 random lowercase chars}, used both for the
 * registration in Secure Access Cloud and for the pod.
 */
pub fn connector_name(site: &Site) -> String {
    let suffix: String = std::iter::repeat_with(fastrand::lowercase).take(4).collect();
    format!("{}-{}-{}", site.name, site.namespace, suffix)
}

/*
 * SiteReconciler converges a Site and sizes its fleet of connectors. The
 * fleet is rebuilt from the deployer's snapshot on every pass.
 */
#[derive(Clone)]
pub struct SiteReconciler {
    sac_client: Arc<dyn SacClient>,
    deployer: Arc<dyn ConnectorDeployer>,
}

impl SiteReconciler {

    pub fn new(sac_client: Arc<dyn SacClient>, deployer: Arc<dyn ConnectorDeployer>) -> Self {
	SiteReconciler{ sac_client, deployer }
    }

    pub async fn reconcile(&self, desired: Option<&Site>) -> (SiteOutput, Result<(), Error>) {
	let mut output = SiteOutput::default();

	let site = match desired {
	    Some(site) => site,
	    None => return (output, Err(Error::unrecoverable("no site to reconcile"))),
	};
	output.remote_id = site.sac_site_id.clone();

	let result = if site.to_delete {
	    self.delete(site, &mut output).await
	} else {
	    self.converge(site, &mut output).await
	};

	(output, result)
    }

    async fn delete(&self, site: &Site, output: &mut SiteOutput) -> Result<(), Error> {
	if site.sac_site_id.is_empty() {
	    let errmsg = format!("site '{}' is being deleted but was never created", site.name);
	    return Err(Error::unrecoverable(errmsg));
	}

	log::info!("deleting site '{}' ({})", site.name, site.sac_site_id);
	self.sac_client.delete_site(&site.sac_site_id).await
	    .map_err(|err| errors::lookup(err, format!("site '{}'", site.sac_site_id)))?;

	output.deleted = true;
	Ok(())
    }

    async fn ensure_site(&self, site: &Site) -> Result<String, Error> {
	if !site.sac_site_id.is_empty() {
	    return Ok(site.sac_site_id.clone());
	}

	log::info!("creating site '{}'", site.name);
	let created = match self.sac_client.create_site(&SiteDto::from(site)).await {
	    Ok(created) => created,
	    Err(SacError::Conflict(reason)) => {
		let errmsg = format!("site with name '{}' already exists: {}", site.name, reason);
		return Err(Error::unrecoverable(errmsg));
	    },
	    Err(err) => return Err(Error::transient(err)),
	};

	created.id
	    .filter(|id| !id.is_empty())
	    .ok_or_else(|| Error::transient(format!("site '{}' was created without an id", site.name)))
    }

    async fn converge(&self, site: &Site, output: &mut SiteOutput) -> Result<(), Error> {
	output.remote_id = self.ensure_site(site).await?;

	// from here on the site exists, fleet failures only leave it partially converged
	self.converge_fleet(site, output).await
	    .map_err(Error::after_success)
    }

    async fn converge_fleet(&self, site: &Site, output: &mut SiteOutput) -> Result<(), Error> {
	let snapshot = self.deployer.get_connectors_for_site(site).await?;
	let (healthy, unhealthy): (Vec<_>, Vec<_>) = snapshot.into_iter()
	    .partition(|c| c.status == ConnectorStatus::Healthy);

	log::debug!("site '{}' has {} healthy and {} unhealthy connectors, wants {}",
		    site.name, healthy.len(), unhealthy.len(), site.number_of_connectors);
	output.healthy = healthy;
	output.unhealthy = unhealthy;

	while let Some(connector) = output.unhealthy.first().cloned() {
	    log::info!("removing unhealthy connector {} of site '{}'", connector.deployment_name, site.name);
	    self.remove_connector(site, &connector).await?;
	    output.unhealthy.remove(0);
	}

	let desired = site.number_of_connectors as usize;
	let current = output.healthy.len();

	if current < desired {
	    log::info!("scaling site '{}' up from {} to {} connectors", site.name, current, desired);
	    for _ in current..desired {
		let connector = self.add_connector(site, &output.remote_id).await?;
		output.healthy.push(connector);
	    }
	} else if current > desired {
	    log::info!("scaling site '{}' down from {} to {} connectors", site.name, current, desired);
	    for connector in select_for_eviction(&output.healthy, desired) {
		log::info!("evicting connector {} of site '{}'", connector.deployment_name, site.name);
		self.remove_connector(site, &connector).await?;
		output.healthy.retain(|c| c.deployment_name != connector.deployment_name);
	    }
	}

	Ok(())
    }

    /*
     * Registration first, then the workload. A registration that is
     * already gone is fine.
     */
    async fn remove_connector(&self, site: &Site, connector: &Connector) -> Result<(), Error> {
	if !connector.sac_id.is_empty() {
	    match self.sac_client.delete_connector(&connector.sac_id).await {
		Ok(()) | Err(SacError::NotFound) => {},
		Err(err) => return Err(err.into()),
	    }
	}

	self.deployer.delete_connector(site, &connector.deployment_name).await?;
	Ok(())
    }

    async fn add_connector(&self, site: &Site, site_id: &str) -> Result<Connector, Error> {
	let name = connector_name(site);
	let registered = self.sac_client.create_connector(site_id, &name).await?;
	let parameters = self.sac_client.connector_deployment_parameters(&registered.id).await?;

	let env = BTreeMap::from([
	    ("ENDPOINT_URL".to_string(), site.endpoint_url.clone()),
	    ("TENANT_IDENTIFIER".to_string(), site.tenant_identifier.clone()),
	    ("HTTPS_SKIP_CERT_VERIFY".to_string(), "true".to_string()),
	    ("OTP".to_string(), parameters.otp),
	]);
	let params = CreateConnectorParams{
	    connector_id: registered.id.clone(),
	    name,
	    image: site.connector_image.clone(),
	    image_pull_secret: site.image_pull_secret.clone(),
	    env,
	};

	let deployment_name = match self.deployer.create_connector(site, &params).await {
	    Ok(deployment_name) => deployment_name,
	    Err(err) => {
		// don't leave a registration behind that no workload will ever use
		if let Err(cleanup) = self.sac_client.delete_connector(&registered.id).await {
		    log::warn!("unable to remove registration {} of failed connector: {}", registered.id, cleanup);
		}
		return Err(err.into());
	    }
	};

	Ok(Connector{
	    sac_id: registered.id,
	    deployment_name,
	    created: Utc::now(),
	    status: ConnectorStatus::Healthy,
	})
    }

    /*
     * Removes registrations bound to the site that no workload carries
     * anymore. Failures are logged and skipped, returns the removed ids.
     */
    pub async fn sweep_dangling(&self, site: &Site) -> Result<Vec<String>, Error> {
	if site.sac_site_id.is_empty() {
	    return Ok(vec![]);
	}

	let registered = self.sac_client.list_connectors_by_site(&site.sac_site_id).await?;
	let observed: BTreeSet<String> = self.deployer.get_connectors_for_site(site).await?
	    .into_iter()
	    .map(|c| c.sac_id)
	    .collect();

	let mut removed = vec![];
	for connector in registered.into_iter().filter(|c| !observed.contains(&c.id)) {
	    log::info!("removing dangling connector {} ({}) of site '{}'", connector.name, connector.id, site.name);
	    match self.sac_client.delete_connector(&connector.id).await {
		Ok(()) => removed.push(connector.id),
		Err(SacError::NotFound) => {},
		Err(err) => log::warn!("unable to remove dangling connector {}: {}", connector.id, err),
	    }
	}

	Ok(removed)
    }
}
