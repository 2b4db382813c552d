use crate::application::ApplicationReconciler;
use crate::converter;
use crate::deployer::{ConnectorDeployer, PodDeployer};
use crate::errors::Error;
use crate::model::Site;
use crate::sac::SacClient;
use crate::site::SiteReconciler;
use crate::store::{has_finalizer, DesiredStateStore, KubeStore, ObjectKey};
use accessop_api as api;
use accessop_api::AccessResource;

use chrono::Utc;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Resource as KubeResource;
use kube::runtime::WatchStreamExt;
use kube::runtime::controller::Action as KubeAction;
use kube::runtime::controller::Controller as KubeController;
use kube::runtime::predicates;
use kube::runtime::reflector;
use kube::runtime::reflector::Store as KubeStoreReader;
use kube::runtime::watcher as kube_watcher;
use kube::runtime::watcher::Config as KubeWatcherConfig;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ManagerSettings {

    // requeue interval after a successful pass
    pub reconcile_interval: Duration,

    // fixed delay before a failed pass is retried
    pub retry_delay: Duration,

    // used by sites that don't set their own image
    pub connector_image: String,

    pub sweep_dangling_connectors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Requeue(Duration),
    AwaitChange,
}

impl Verdict {
    pub fn into_action(self) -> KubeAction {
	match self {
	    Verdict::Requeue(after) => KubeAction::requeue(after),
	    Verdict::AwaitChange => KubeAction::await_change(),
	}
    }
}

/* what a reconcile pass leaves to be written back */
pub struct Outcome<S> {
    pub remote_id: String,
    pub deleted: bool,
    pub status: S,
    pub result: Result<(), Error>,
}

/*
 * Writes a pass back into the store and decides when the record is looked
 * at next:
 *
 *   - the finalizer goes on as soon as the remote object is known to exist
 *   - deleted => the finalizer comes off, nothing else is written
 *   - otherwise status is written, unrecoverable errors wait for a change,
 *     other errors are handed back to be retried after the fixed delay
 *
 */
pub async fn settle<K, S>(store: &S, key: &ObjectKey, record: &K, outcome: Outcome<K::Status>, interval: Duration) -> Result<Verdict, Error>
where
    K: KubeResource + AccessResource + Send + Sync,
    S: DesiredStateStore<K>,
{
    if outcome.deleted {
	log::info!("{} is gone from Secure Access Cloud, releasing it", key);
	store.remove_finalizer(key, record).await?;
	return Ok(Verdict::AwaitChange);
    }

    if !outcome.remote_id.is_empty() && !has_finalizer(record) {
	store.add_finalizer(key, record).await?;
    }

    store.update_status(key, &outcome.status).await?;

    match outcome.result {
	Ok(()) => Ok(Verdict::Requeue(interval)),
	Err(err) if err.is_unrecoverable() => {
	    log::error!("{} needs attention, waiting for it to change: {}", key, err);
	    Ok(Verdict::AwaitChange)
	},
	Err(err) => Err(err),
    }
}

/*
 * Connector pods outside the Site's namespace can't be owned by it, so they
 * are removed here before the site goes away remotely.
 */
async fn release_fleet(deployer: &dyn ConnectorDeployer, site: &Site) -> Result<(), Error> {
    for connector in deployer.get_connectors_for_site(site).await? {
	log::info!("removing connector {} of deleted site '{}'", connector.deployment_name, site.name);
	deployer.delete_connector(site, &connector.deployment_name).await?;
    }
    Ok(())
}

pub async fn reconcile_site<S>(store: &S, reconciler: &SiteReconciler, deployer: &dyn ConnectorDeployer, settings: &ManagerSettings, key: &ObjectKey) -> Result<Verdict, Error>
where
    S: DesiredStateStore<api::Site>,
{
    let record = match store.get(key).await? {
	Some(record) => record,
	None => {
	    log::debug!("site {} no longer exists", key);
	    return Ok(Verdict::AwaitChange);
	}
    };

    let site = match converter::site_from(&record, &settings.connector_image) {
	Ok(site) => site,
	Err(err) => {
	    log::error!("site {} is invalid: {}", key, err);
	    let status = api::SiteStatus{
		failed_reason: Some(err.to_string()),
		..record.status.clone().unwrap_or_default()
	    };
	    store.update_status(key, &status).await?;
	    return Ok(Verdict::AwaitChange);
	}
    };

    if site.to_delete && !site.sac_site_id.is_empty() {
	release_fleet(deployer, &site).await?;
    }

    let (output, result) = reconciler.reconcile(Some(&site)).await;

    if result.is_ok() && !output.deleted && settings.sweep_dangling_connectors {
	let mut created = site.clone();
	created.sac_site_id = output.remote_id.clone();

	match reconciler.sweep_dangling(&created).await {
	    Ok(removed) if !removed.is_empty() => log::info!("removed {} dangling connectors of site {}", removed.len(), key),
	    Ok(_) => {},
	    Err(err) => log::warn!("unable to sweep dangling connectors of site {}: {}", key, err),
	}
    }

    let status = converter::site_status(&output, &result, Utc::now());
    let outcome = Outcome{
	remote_id: output.remote_id,
	deleted: output.deleted,
	status,
	result,
    };

    settle(store, key, &record, outcome, settings.reconcile_interval).await
}

pub async fn reconcile_application<S>(store: &S, reconciler: &ApplicationReconciler, settings: &ManagerSettings, key: &ObjectKey) -> Result<Verdict, Error>
where
    S: DesiredStateStore<api::Application>,
{
    let record = match store.get(key).await? {
	Some(record) => record,
	None => {
	    log::debug!("application {} no longer exists", key);
	    return Ok(Verdict::AwaitChange);
	}
    };

    let application = match converter::application_from(&record) {
	Ok(application) => application,
	Err(err) => {
	    log::error!("application {} is invalid: {}", key, err);
	    let status = api::ApplicationStatus{
		failed_reason: Some(err.to_string()),
		..record.status.clone().unwrap_or_default()
	    };
	    store.update_status(key, &status).await?;
	    return Ok(Verdict::AwaitChange);
	}
    };

    let (output, result) = reconciler.reconcile(Some(&application)).await;

    let status = converter::application_status(&output, &result, record.status.as_ref(), Utc::now());
    let outcome = Outcome{
	remote_id: output.remote_id,
	deleted: output.deleted,
	status,
	result,
    };

    settle(store, key, &record, outcome, settings.reconcile_interval).await
}

/*
 * AccessManager runs the Site and Application controllers.
 */
#[derive(Clone)]
pub struct AccessManager {
    kube_client: KubeClient,
    settings: ManagerSettings,

    site_reconciler: SiteReconciler,
    application_reconciler: ApplicationReconciler,
    deployer: Arc<PodDeployer>,

    site_store: KubeStore<api::Site>,
    application_store: KubeStore<api::Application>,
}

#[derive(Clone)]
struct AccessManagerCtx {
    manager: AccessManager,
}

async fn site_reconcile(site: Arc<api::Site>, ctx: Arc<AccessManagerCtx>) -> Result<KubeAction, Error> {
    let mgr = &ctx.manager;
    let key = ObjectKey::of(site.as_ref());

    log::debug!("reconciling site {}", key);
    let verdict = reconcile_site(&mgr.site_store, &mgr.site_reconciler, &*mgr.deployer, &mgr.settings, &key).await?;
    Ok(verdict.into_action())
}

async fn application_reconcile(application: Arc<api::Application>, ctx: Arc<AccessManagerCtx>) -> Result<KubeAction, Error> {
    let mgr = &ctx.manager;
    let key = ObjectKey::of(application.as_ref());

    log::debug!("reconciling application {}", key);
    let verdict = reconcile_application(&mgr.application_store, &mgr.application_reconciler, &mgr.settings, &key).await?;
    Ok(verdict.into_action())
}

/*
 * Only spec changes and deletion move the generation, status writes and
 * finalizer edits don't wake the controller up again.
 */
fn only_generation_changes<K, S>(events: S) -> impl Stream<Item = Result<K, kube_watcher::Error>>
where
    K: KubeResource + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
    S: Stream<Item = Result<K, kube_watcher::Error>>,
{
    events.predicate_filter(predicates::generation)
}

fn desired_state_changes<K>(api: KubeApi<K>) -> (KubeStoreReader<K>, impl Stream<Item = Result<K, kube_watcher::Error>> + Send + 'static)
where
    K: KubeResource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let events = kube_watcher::watcher(api, KubeWatcherConfig::default())
	.default_backoff()
	.reflect(writer)
	.applied_objects();

    (reader, only_generation_changes(events))
}

fn error_policy<K: KubeResource>(obj: Arc<K>, err: &Error, ctx: Arc<AccessManagerCtx>) -> KubeAction {
    let retry_delay = ctx.manager.settings.retry_delay;
    log::warn!("reconcile of {} failed, retrying in {:?}: {}", ObjectKey::of(obj.as_ref()), retry_delay, err);
    KubeAction::requeue(retry_delay)
}

impl AccessManager {

    pub fn new(kube_client: KubeClient, sac_client: Arc<dyn SacClient>, settings: ManagerSettings) -> Self {
	let deployer = Arc::new(PodDeployer::new(kube_client.clone()));

	Self{
	    kube_client: kube_client.clone(),
	    settings,
	    site_reconciler: SiteReconciler::new(sac_client.clone(), deployer.clone()),
	    application_reconciler: ApplicationReconciler::new(sac_client),
	    deployer,
	    site_store: KubeStore::new(kube_client.clone()),
	    application_store: KubeStore::new(kube_client),
	}
    }

    /*
     * Sites are also woken up by changes to the connector pods they own.
     */
    pub fn site_controller(&self) -> impl Future<Output = ()> {
	let ctx = Arc::new(AccessManagerCtx{
	    manager: self.clone()
	});

	let sites: KubeApi<api::Site> = KubeApi::all(self.kube_client.clone());
	let pods: KubeApi<KubePod> = KubeApi::all(self.kube_client.clone());
	let managed_pods = KubeWatcherConfig::default()
	    .labels(&format!("{}={}", api::MANAGED_BY_LABEL, api::MANAGED_BY));

	let (reader, changes) = desired_state_changes(sites);
	KubeController::for_stream(changes, reader)
	    .owns(pods, managed_pods)
	    .run(site_reconcile, error_policy, ctx)
	    .for_each(|reconcile| async move {
		match reconcile {
		    Ok((site, _)) => log::debug!("reconciled site {}/{}", site.namespace.unwrap_or_default(), site.name),
		    Err(err) => log::debug!("site reconcile failed: {}", err),
		}
	    })
    }

    pub fn application_controller(&self) -> impl Future<Output = ()> {
	let ctx = Arc::new(AccessManagerCtx{
	    manager: self.clone()
	});

	let applications: KubeApi<api::Application> = KubeApi::all(self.kube_client.clone());

	let (reader, changes) = desired_state_changes(applications);
	KubeController::for_stream(changes, reader)
	    .run(application_reconcile, error_policy, ctx)
	    .for_each(|reconcile| async move {
		match reconcile {
		    Ok((application, _)) => log::debug!("reconciled application {}/{}", application.namespace.unwrap_or_default(), application.name),
		    Err(err) => log::debug!("application reconcile failed: {}", err),
		}
	    })
    }
}
