use crate::errors::Error;
use accessop_api::AccessResource;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Resource as KubeResource;
use kube::ResourceExt;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use std::marker::PhantomData;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn of<K: KubeResource>(obj: &K) -> Self {
	ObjectKey{
	    namespace: obj.namespace().unwrap_or_default(),
	    name: obj.name_any(),
	}
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
	write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub fn has_finalizer<K: KubeResource + AccessResource>(record: &K) -> bool {
    record.finalizers().iter().any(|f| f == K::FINALIZER)
}

/*
 * The finalizers the record should carry, with or without ours.
 */
pub fn finalizers_with<K: KubeResource + AccessResource>(record: &K, present: bool) -> Vec<String> {
    let mut finalizers: Vec<String> = record.finalizers().iter()
	.filter(|f| f.as_str() != K::FINALIZER)
	.cloned()
	.collect();

    if present {
	finalizers.push(K::FINALIZER.to_string());
    }
    finalizers
}

/*
 * The RFC 7386 merge patch turning `current` into `desired`. A merge patch
 * only ever adds keys to a map, the keys `desired` dropped are sent as null.
 */
pub fn merge_patch(current: &Value, desired: &Value) -> Value {
    match (current, desired) {
	(Value::Object(current), Value::Object(desired)) => {
	    let mut patch = Map::new();
	    for gone in current.keys().filter(|k| !desired.contains_key(k.as_str())) {
		patch.insert(gone.clone(), Value::Null);
	    }
	    for (k, value) in desired {
		let value = match current.get(k) {
		    Some(old) => merge_patch(old, value),
		    None => value.clone(),
		};
		patch.insert(k.clone(), value);
	    }
	    Value::Object(patch)
	},
	_ => desired.clone(),
    }
}

/*
 * DesiredStateStore is where the records are read from and where their
 * status and finalizer are written back to.
 */
#[async_trait]
pub trait DesiredStateStore<K: AccessResource + Send + Sync>: Send + Sync {

    /* None once the record is gone */
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error>;

    async fn update_status(&self, key: &ObjectKey, status: &K::Status) -> Result<(), Error>;

    async fn add_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error>;

    async fn remove_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error>;
}

/*
 * KubeStore reads and patches namespaced custom resources straight from the
 * API server.
 */
#[derive(Clone)]
pub struct KubeStore<K> {
    kube_client: KubeClient,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K>
where
    K: KubeResource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    pub fn new(kube_client: KubeClient) -> Self {
	KubeStore{ kube_client, _kind: PhantomData }
    }

    fn api(&self, key: &ObjectKey) -> KubeApi<K> {
	KubeApi::namespaced(self.kube_client.clone(), &key.namespace)
    }

    async fn set_finalizers(&self, key: &ObjectKey, finalizers: Vec<String>) -> Result<(), Error> {
	let patch = json!({ "metadata": { "finalizers": finalizers } });
	self.api(key).patch(&key.name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await?;
	Ok(())
    }
}

#[async_trait]
impl<K> DesiredStateStore<K> for KubeStore<K>
where
    K: KubeResource<Scope = NamespaceResourceScope, DynamicType = ()> + AccessResource
	+ Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
	Ok(self.api(key).get_opt(&key.name).await?)
    }

    /* diffed against what is stored, so connectors gone from the fleet leave the status too */
    async fn update_status(&self, key: &ObjectKey, status: &K::Status) -> Result<(), Error> {
	let current = serde_json::to_value(self.api(key).get_status(&key.name).await?).map_err(Error::transient)?;
	let desired = serde_json::to_value(status).map_err(Error::transient)?;

	let patch = json!({ "status": merge_patch(&current["status"], &desired) });
	self.api(key).patch_status(&key.name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await?;
	Ok(())
    }

    async fn add_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error> {
	log::debug!("adding finalizer {} to {}", K::FINALIZER, key);
	self.set_finalizers(key, finalizers_with(record, true)).await
    }

    async fn remove_finalizer(&self, key: &ObjectKey, record: &K) -> Result<(), Error> {
	log::debug!("removing finalizer {} from {}", K::FINALIZER, key);
	self.set_finalizers(key, finalizers_with(record, false)).await
    }
}
