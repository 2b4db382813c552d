use crate::errors::{self, Error};
use crate::model::Application;
use crate::sac::dto::{merge_application, ApplicationDto};
use crate::sac::{SacClient, SacError};

use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationOutput {
    pub deleted: bool,

    // set whenever the application is known to exist remotely
    pub remote_id: String,
}

/* resolved on every pass, never written back into the desired state */
struct Dependencies {
    site_id: String,
    policy_ids: Vec<String>,
}

/*
 * ApplicationReconciler converges one Application against Secure Access
 * Cloud. It holds no state between passes, every call starts from the
 * desired state it's given.
 */
#[derive(Clone)]
pub struct ApplicationReconciler {
    sac_client: Arc<dyn SacClient>,
}

impl ApplicationReconciler {

    pub fn new(sac_client: Arc<dyn SacClient>) -> Self {
	ApplicationReconciler{ sac_client }
    }

    pub async fn reconcile(&self, desired: Option<&Application>) -> (ApplicationOutput, Result<(), Error>) {
	let mut output = ApplicationOutput::default();

	let application = match desired {
	    Some(application) => application,
	    None => return (output, Err(Error::unrecoverable("no application to reconcile"))),
	};
	output.remote_id = application.id.clone();

	let result = if application.to_delete {
	    self.delete(application, &mut output).await
	} else {
	    self.converge(application, &mut output).await
	};

	(output, result)
    }

    async fn delete(&self, application: &Application, output: &mut ApplicationOutput) -> Result<(), Error> {
	if application.id.is_empty() {
	    let errmsg = format!("application '{}' is being deleted but was never created", application.name);
	    return Err(Error::unrecoverable(errmsg));
	}

	log::info!("deleting application '{}' ({})", application.name, application.id);
	self.sac_client.delete_application(&application.id).await
	    .map_err(|err| errors::lookup(err, format!("application '{}'", application.id)))?;

	output.deleted = true;
	Ok(())
    }

    async fn resolve_dependencies(&self, application: &Application) -> Result<Dependencies, Error> {
	let site = self.sac_client.find_site_by_name(&application.site_name).await
	    .map_err(|err| errors::lookup(err, format!("site '{}'", application.site_name)))?;

	let site_id = site.id
	    .filter(|id| !id.is_empty())
	    .ok_or_else(|| Error::transient(format!("site '{}' has no id", application.site_name)))?;

	let names = application.policy_names();
	let policies = self.sac_client.find_policies_by_names(&names).await
	    .map_err(|err| errors::lookup(err, format!("one of the policies {:?}", names)))?;

	Ok(Dependencies{
	    site_id,
	    policy_ids: policies.into_iter().map(|policy| policy.id).collect(),
	})
    }

    async fn converge(&self, application: &Application, output: &mut ApplicationOutput) -> Result<(), Error> {
	// nothing is touched until everything it refers to is known to exist
	let dependencies = self.resolve_dependencies(application).await?;

	if application.id.is_empty() {
	    output.remote_id = self.create(application).await?;
	} else {
	    self.update(application).await?;
	}

	self.bind(&output.remote_id, application, &dependencies).await
    }

    async fn create(&self, application: &Application) -> Result<String, Error> {
	match self.sac_client.find_application_by_name(&application.name).await {
	    Ok(existing) => {
		let errmsg = format!("application with name '{}' already exists ({})",
				     application.name, existing.id.unwrap_or_default());
		return Err(Error::unrecoverable(errmsg));
	    },
	    Err(SacError::NotFound) => {},
	    Err(err) => return Err(Error::transient(err)),
	}

	log::info!("creating application '{}'", application.name);
	let created = self.sac_client.create_application(&ApplicationDto::from(application)).await?;

	created.id
	    .filter(|id| !id.is_empty())
	    .ok_or_else(|| Error::transient(format!("application '{}' was created without an id", application.name)))
    }

    /*
     * Fetch, merge and update, so the attributes managed outside of the
     * operator survive the round trip.
     */
    async fn update(&self, application: &Application) -> Result<(), Error> {
	let not_found = |err| errors::lookup(err, format!("application '{}'", application.id));

	let existing = self.sac_client.find_application_by_id(&application.id).await
	    .map_err(not_found)?;
	let merged = merge_application(existing, ApplicationDto::from(application));

	log::debug!("updating application '{}' ({})", application.name, application.id);
	self.sac_client.update_application(&application.id, &merged).await
	    .map_err(not_found)?;

	Ok(())
    }

    async fn bind(&self, id: &str, application: &Application, dependencies: &Dependencies) -> Result<(), Error> {
	self.sac_client.bind_application_to_site(id, &dependencies.site_id).await
	    .map_err(Error::partially_successful)?;

	self.sac_client.update_policies(id, application.application_type, &dependencies.policy_ids).await
	    .map_err(Error::partially_successful)?;

	Ok(())
    }
}
