use crate::deployer::DeployError;
use crate::sac::SacError;

use thiserror::Error;

pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/*
 * Every reconciliation failure falls in exactly one of these kinds, the kind
 * alone decides whether the resource is requeued.
 */
#[derive(Error, Debug)]
pub enum Error {

    /* retrying won't help, wait until the desired state changes */
    #[error("unrecoverable error: {0}")]
    Unrecoverable(Cause),

    /* the primary object exists remotely but a dependent step failed */
    #[error("partially successful: {0}")]
    PartiallySuccessful(Cause),

    /* network, timeouts, 5xx and anything else we can't classify */
    #[error("transient error: {0}")]
    Transient(Cause),
}

impl Error {

    pub fn unrecoverable(cause: impl Into<Cause>) -> Self {
	Error::Unrecoverable(cause.into())
    }

    pub fn partially_successful(cause: impl Into<Cause>) -> Self {
	Error::PartiallySuccessful(cause.into())
    }

    pub fn transient(cause: impl Into<Cause>) -> Self {
	Error::Transient(cause.into())
    }

    pub fn is_unrecoverable(&self) -> bool {
	matches!(self, Error::Unrecoverable(_))
    }

    pub fn is_retryable(&self) -> bool {
	!self.is_unrecoverable()
    }

    /*
     * Turns a retryable error into a partially successful one, used once the
     * primary object is known to exist remotely. Unrecoverable stays as is.
     */
    pub fn after_success(self) -> Self {
	match self {
	    Error::Transient(cause) => Error::PartiallySuccessful(cause),
	    other => other,
	}
    }
}

/*
 * A lookup that found nothing won't find it on retry either, the record
 * has to change first. Everything else is worth another try.
 */
pub fn lookup(err: SacError, what: impl std::fmt::Display) -> Error {
    match err {
	SacError::NotFound => Error::unrecoverable(format!("{} not found", what)),
	other => Error::transient(other),
    }
}

impl From<SacError> for Error {
    fn from(err: SacError) -> Self {
	Error::Transient(Box::new(err))
    }
}

impl From<DeployError> for Error {
    fn from(err: DeployError) -> Self {
	Error::Transient(Box::new(err))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
	Error::Transient(Box::new(err))
    }
}
