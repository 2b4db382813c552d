use crate::AccessResource;

use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "access.secure-access-cloud.symantec.com", version = "v1", kind = "Site", namespaced)]
#[kube(status = "SiteStatus")]
#[serde(rename_all = "camelCase")]
pub struct SiteSpec {

    // the tenant the connectors of this site authenticate against
    pub tenant_identifier: String,

    // the Secure Access Cloud endpoint the connectors tunnel to
    pub endpoint_url: String,

    // how many healthy connectors this site should run (default is 1)
    pub number_of_connectors: Option<u32>,

    // where the connector pods are created (default is the site's namespace)
    pub connectors_namespace: Option<String>,

    // overrides the operator's connector image
    pub connector_image: Option<String>,

    pub image_pull_secret: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteStatus {

    // the site-id in Secure Access Cloud
    pub id: Option<String>,

    // connector pod name -> connector id in Secure Access Cloud
    pub healthy_connectors: BTreeMap<String, String>,

    pub unhealthy_connectors: BTreeMap<String, String>,

    pub number_of_healthy_connectors: usize,

    // when the last reconciliation failed, puts the reason here
    pub failed_reason: Option<String>,

    // When the object was last updated (RFC 3339)
    pub last_updated: Option<String>,
}

impl AccessResource for Site {
    type Status = SiteStatus;

    const FINALIZER: &'static str = "sites.access.secure-access-cloud.symantec.com/finalizer";

    fn remote_id(&self) -> Option<String> {
	self.status.as_ref()
	    .and_then(|status| status.id.clone())
	    .filter(|id| !id.is_empty())
    }
}
