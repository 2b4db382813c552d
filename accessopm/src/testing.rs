/*
 * In-memory stand-ins for Secure Access Cloud and the cluster, they record
 * every call so tests can assert on what a reconcile pass did.
 */
use crate::deployer::{ConnectorDeployer, CreateConnectorParams, DeployError};
use crate::model::{
    Application, ApplicationSubType, ApplicationType, ConnectionSettings, Connector, ConnectorStatus, Site,
};
use crate::sac::dto::{ApplicationDto, ConnectorDto, DeploymentParametersDto, PolicyDto, SiteDto};
use crate::sac::{SacClient, SacError};
use crate::errors::Error;
use crate::store::{finalizers_with, DesiredStateStore, ObjectKey};
use accessop_api::AccessResource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::Resource as KubeResource;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

pub fn application(name: &str) -> Application {
    Application{
	id: String::new(),
	name: name.to_string(),
	application_type: ApplicationType::Http,
	sub_type: ApplicationSubType::HttpLuminateDomain,
	connection_settings: ConnectionSettings{
	    internal_address: format!("http://{}.default:80", name),
	    ..Default::default()
	},
	link_translation_settings: None,
	header_customization: None,
	site_name: "site-a".to_string(),
	access_policy_names: vec![],
	activity_policy_names: vec![],
	is_visible: true,
	is_notification_enabled: false,
	enabled: true,
	to_delete: false,
    }
}

pub fn site(name: &str, number_of_connectors: u32) -> Site {
    Site{
	name: name.to_string(),
	namespace: "default".to_string(),
	sac_site_id: String::new(),
	tenant_identifier: "acme".to_string(),
	endpoint_url: "https://acme.example.com".to_string(),
	number_of_connectors,
	connectors_namespace: "default".to_string(),
	connector_image: "luminate/connector:2.10.1".to_string(),
	image_pull_secret: None,
	to_delete: false,
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap_or_default()
}

pub fn connector(name: &str, sac_id: &str, created_secs: i64, status: ConnectorStatus) -> Connector {
    Connector{
	sac_id: sac_id.to_string(),
	deployment_name: name.to_string(),
	created: at(created_secs),
	status,
    }
}

fn unavailable(op: &str) -> SacError {
    SacError::Status{ status: 503, body: format!("{} unavailable", op) }
}

#[derive(Default)]
struct SacState {
    applications: BTreeMap<String, ApplicationDto>,
    sites: BTreeMap<String, SiteDto>,
    policies: BTreeMap<String, String>,
    connectors: BTreeMap<String, (String, ConnectorDto)>,
    site_bindings: Vec<(String, String)>,
    policy_bindings: Vec<(String, Vec<String>)>,
    calls: Vec<String>,
    failing: BTreeSet<String>,
    next_ids: VecDeque<String>,
    counter: usize,
}

impl SacState {
    fn record(&mut self, op: &str) -> Result<(), SacError> {
	self.calls.push(op.to_string());
	if self.failing.contains(op) {
	    return Err(unavailable(op));
	}
	Ok(())
    }

    fn new_id(&mut self, prefix: &str) -> String {
	match self.next_ids.pop_front() {
	    Some(id) => id,
	    None => {
		self.counter += 1;
		format!("{}-{}", prefix, self.counter)
	    }
	}
    }
}

#[derive(Default)]
pub struct FakeSac {
    state: Mutex<SacState>,
}

impl FakeSac {

    pub fn new() -> Self {
	Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SacState> {
	match self.state.lock() {
	    Ok(guard) => guard,
	    Err(poisoned) => poisoned.into_inner(),
	}
    }

    pub fn with_site(self, name: &str, id: &str) -> Self {
	self.state().sites.insert(name.to_string(), SiteDto{ id: Some(id.to_string()), name: name.to_string(), description: None });
	self
    }

    pub fn with_policy(self, name: &str, id: &str) -> Self {
	self.state().policies.insert(name.to_string(), id.to_string());
	self
    }

    pub fn with_application(self, dto: ApplicationDto) -> Self {
	if let Some(id) = dto.id.clone() {
	    self.state().applications.insert(id, dto);
	}
	self
    }

    pub fn with_connector(self, site_id: &str, id: &str) -> Self {
	let dto = ConnectorDto{ id: id.to_string(), name: id.to_string(), version: None };
	self.state().connectors.insert(id.to_string(), (site_id.to_string(), dto));
	self
    }

    /* ids handed out by create calls, in order */
    pub fn with_next_id(self, id: &str) -> Self {
	self.state().next_ids.push_back(id.to_string());
	self
    }

    pub fn failing(self, op: &str) -> Self {
	self.state().failing.insert(op.to_string());
	self
    }

    pub fn calls(&self) -> Vec<String> {
	self.state().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
	self.state().calls.iter().filter(|call| call.as_str() == op).count()
    }

    pub fn application(&self, id: &str) -> Option<ApplicationDto> {
	self.state().applications.get(id).cloned()
    }

    pub fn site_bindings(&self) -> Vec<(String, String)> {
	self.state().site_bindings.clone()
    }

    pub fn policy_bindings(&self) -> Vec<(String, Vec<String>)> {
	self.state().policy_bindings.clone()
    }

    pub fn connector_ids(&self) -> Vec<String> {
	self.state().connectors.keys().cloned().collect()
    }
}

#[async_trait]
impl SacClient for FakeSac {

    async fn create_application(&self, application: &ApplicationDto) -> Result<ApplicationDto, SacError> {
	let mut state = self.state();
	state.record("create_application")?;

	let mut created = application.clone();
	let id = state.new_id("app");
	created.id = Some(id.clone());
	state.applications.insert(id, created.clone());
	Ok(created)
    }

    async fn update_application(&self, id: &str, application: &ApplicationDto) -> Result<ApplicationDto, SacError> {
	let mut state = self.state();
	state.record("update_application")?;

	if !state.applications.contains_key(id) {
	    return Err(SacError::NotFound);
	}
	state.applications.insert(id.to_string(), application.clone());
	Ok(application.clone())
    }

    async fn find_application_by_id(&self, id: &str) -> Result<ApplicationDto, SacError> {
	let mut state = self.state();
	state.record("find_application_by_id")?;
	state.applications.get(id).cloned().ok_or(SacError::NotFound)
    }

    async fn find_application_by_name(&self, name: &str) -> Result<ApplicationDto, SacError> {
	let mut state = self.state();
	state.record("find_application_by_name")?;
	state.applications.values()
	    .find(|app| app.name == name)
	    .cloned()
	    .ok_or(SacError::NotFound)
    }

    async fn delete_application(&self, id: &str) -> Result<(), SacError> {
	let mut state = self.state();
	state.record("delete_application")?;
	state.applications.remove(id).map(|_| ()).ok_or(SacError::NotFound)
    }

    async fn find_policy_by_name(&self, name: &str) -> Result<PolicyDto, SacError> {
	let mut state = self.state();
	state.record("find_policy_by_name")?;
	state.policies.get(name)
	    .map(|id| PolicyDto{ id: id.clone(), name: name.to_string() })
	    .ok_or(SacError::NotFound)
    }

    async fn update_policies(&self, application_id: &str, _application_type: ApplicationType, policy_ids: &[String]) -> Result<(), SacError> {
	let mut state = self.state();
	state.record("update_policies")?;
	state.policy_bindings.push((application_id.to_string(), policy_ids.to_vec()));
	Ok(())
    }

    async fn create_site(&self, site: &SiteDto) -> Result<SiteDto, SacError> {
	let mut state = self.state();
	state.record("create_site")?;

	if state.sites.contains_key(&site.name) {
	    return Err(SacError::Conflict(format!("site {} already exists", site.name)));
	}
	let mut created = site.clone();
	created.id = Some(state.new_id("site"));
	state.sites.insert(site.name.clone(), created.clone());
	Ok(created)
    }

    async fn find_site_by_name(&self, name: &str) -> Result<SiteDto, SacError> {
	let mut state = self.state();
	state.record("find_site_by_name")?;
	state.sites.get(name).cloned().ok_or(SacError::NotFound)
    }

    async fn delete_site(&self, id: &str) -> Result<(), SacError> {
	let mut state = self.state();
	state.record("delete_site")?;

	let name = state.sites.iter()
	    .find(|(_, site)| site.id.as_deref() == Some(id))
	    .map(|(name, _)| name.clone())
	    .ok_or(SacError::NotFound)?;
	state.sites.remove(&name);
	Ok(())
    }

    async fn bind_application_to_site(&self, application_id: &str, site_id: &str) -> Result<(), SacError> {
	let mut state = self.state();
	state.record("bind_application_to_site")?;
	state.site_bindings.push((application_id.to_string(), site_id.to_string()));
	Ok(())
    }

    async fn create_connector(&self, site_id: &str, name: &str) -> Result<ConnectorDto, SacError> {
	let mut state = self.state();
	state.record("create_connector")?;

	let dto = ConnectorDto{ id: state.new_id("connector"), name: name.to_string(), version: None };
	state.connectors.insert(dto.id.clone(), (site_id.to_string(), dto.clone()));
	Ok(dto)
    }

    async fn list_connectors_by_site(&self, site_id: &str) -> Result<Vec<ConnectorDto>, SacError> {
	let mut state = self.state();
	state.record("list_connectors_by_site")?;
	Ok(state.connectors.values()
	   .filter(|(site, _)| site == site_id)
	   .map(|(_, dto)| dto.clone())
	   .collect())
    }

    async fn delete_connector(&self, id: &str) -> Result<(), SacError> {
	let mut state = self.state();
	state.record("delete_connector")?;
	state.connectors.remove(id).map(|_| ()).ok_or(SacError::NotFound)
    }

    async fn connector_deployment_parameters(&self, id: &str) -> Result<DeploymentParametersDto, SacError> {
	let mut state = self.state();
	state.record("connector_deployment_parameters")?;

	if !state.connectors.contains_key(id) {
	    return Err(SacError::NotFound);
	}
	Ok(DeploymentParametersDto{ otp: format!("otp-{}", id), version: None })
    }
}

#[derive(Default)]
struct DeployerState {
    connectors: Vec<Connector>,
    created: Vec<CreateConnectorParams>,
    calls: Vec<String>,
    failing: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeDeployer {
    state: Mutex<DeployerState>,
}

impl FakeDeployer {

    pub fn new(connectors: Vec<Connector>) -> Self {
	FakeDeployer{
	    state: Mutex::new(DeployerState{ connectors, ..Default::default() }),
	}
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DeployerState> {
	match self.state.lock() {
	    Ok(guard) => guard,
	    Err(poisoned) => poisoned.into_inner(),
	}
    }

    pub fn failing(self, op: &str) -> Self {
	self.state().failing.insert(op.to_string());
	self
    }

    pub fn count(&self, op: &str) -> usize {
	self.state().calls.iter().filter(|call| call.as_str() == op).count()
    }

    pub fn deployment_names(&self) -> Vec<String> {
	self.state().connectors.iter().map(|c| c.deployment_name.clone()).collect()
    }

    pub fn created(&self) -> Vec<CreateConnectorParams> {
	self.state().created.clone()
    }

    fn record(state: &mut DeployerState, op: &str) -> Result<(), DeployError> {
	state.calls.push(op.to_string());
	if state.failing.contains(op) {
	    return Err(DeployError::Other(format!("{} failed", op)));
	}
	Ok(())
    }
}

#[async_trait]
impl ConnectorDeployer for FakeDeployer {

    async fn create_connector(&self, _site: &Site, params: &CreateConnectorParams) -> Result<String, DeployError> {
	let mut state = self.state();
	Self::record(&mut state, "create_connector")?;

	state.created.push(params.clone());
	state.connectors.push(Connector{
	    sac_id: params.connector_id.clone(),
	    deployment_name: params.name.clone(),
	    created: Utc::now(),
	    status: ConnectorStatus::Healthy,
	});
	Ok(params.name.clone())
    }

    async fn delete_connector(&self, _site: &Site, deployment_name: &str) -> Result<(), DeployError> {
	let mut state = self.state();
	Self::record(&mut state, "delete_connector")?;
	state.connectors.retain(|c| c.deployment_name != deployment_name);
	Ok(())
    }

    async fn get_connectors_for_site(&self, _site: &Site) -> Result<Vec<Connector>, DeployError> {
	let mut state = self.state();
	Self::record(&mut state, "get_connectors_for_site")?;
	Ok(state.connectors.clone())
    }
}

struct StoreState<K> {
    records: BTreeMap<ObjectKey, K>,
    statuses: Vec<serde_json::Value>,
    finalizer_changes: Vec<bool>,
}

/*
 * Keeps the records in a map, status writes are kept as json in order.
 */
pub struct MemoryStore<K> {
    state: Mutex<StoreState<K>>,
}

impl<K: KubeResource + AccessResource + Clone> MemoryStore<K> {

    pub fn new(records: Vec<K>) -> Self {
	let records = records.into_iter()
	    .map(|record| (ObjectKey::of(&record), record))
	    .collect();

	MemoryStore{
	    state: Mutex::new(StoreState{ records, statuses: vec![], finalizer_changes: vec![] }),
	}
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StoreState<K>> {
	match self.state.lock() {
	    Ok(guard) => guard,
	    Err(poisoned) => poisoned.into_inner(),
	}
    }

    pub fn statuses(&self) -> Vec<serde_json::Value> {
	self.state().statuses.clone()
    }

    /* true for every add, false for every removal */
    pub fn finalizer_changes(&self) -> Vec<bool> {
	self.state().finalizer_changes.clone()
    }

    pub fn record(&self, key: &ObjectKey) -> Option<K> {
	self.state().records.get(key).cloned()
    }

    fn set_finalizer(&self, key: &ObjectKey, record: &K, present: bool) {
	let mut state = self.state();
	state.finalizer_changes.push(present);
	if let Some(stored) = state.records.get_mut(key) {
	    stored.meta_mut().finalizers = Some(finalizers_with(record, present));
	}
    }
}

#[async_trait]
impl<K> DesiredStateStore<K> for MemoryStore<K>
where
    K: KubeResource + AccessResource + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
	Ok(self.record(key))
    }

    async fn update_status(&self, _key: &ObjectKey, status: &K::Status) -> Result<(), Error> {
	let value = serde_json::to_value(status).map_err(Error::transient)?;
	self.state().statuses.push(value);
	Ok(())
    }

    async fn add_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error> {
	self.set_finalizer(key, record, true);
	Ok(())
    }

    async fn remove_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error> {
	self.set_finalizer(key, record, false);
	Ok(())
    }
}
