/*
 * accessop/api - defines the Secure Access Cloud CRDs (Site and Application)
 * and the tags shared between the operator and the connector workloads.
 */

pub mod application;
pub use application::Application;
pub use application::ApplicationSpec;
pub use application::ApplicationStatus;
pub use application::ApplicationSubType;
pub use application::ApplicationType;
pub use application::Service;

pub mod site;
pub use site::Site;
pub use site::SiteSpec;
pub use site::SiteStatus;

use serde::Serialize;

/* every connector workload is tagged with the site it belongs to ... */
pub const SITE_LABEL: &str = "access.secure-access-cloud.symantec.com/site";

/* ... and with its registration id in the Secure Access Cloud */
pub const CONNECTOR_ANNOTATION: &str = "access.secure-access-cloud.symantec.com/connector";

pub const MANAGED_BY_LABEL: &str = "access.secure-access-cloud.symantec.com/managed-by";
pub const MANAGED_BY: &str = "accessop";

/*
 * AccessResource is implemented by every desired-state record the operator
 * converges, it ties the record to its status subresource and to the
 * finalizer that latches its deletion.
 */
pub trait AccessResource {
    type Status: Serialize + Send + Sync;

    const FINALIZER: &'static str;

    fn remote_id(&self) -> Option<String>;
}
