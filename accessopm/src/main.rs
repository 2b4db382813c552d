mod application;
mod converter;
mod deployer;
mod errors;
mod manager;
mod model;
mod sac;
mod site;
mod store;
#[cfg(test)]
mod testing;

use manager::{AccessManager, ManagerSettings};
use sac::{HttpSacClient, SacSettings};
use accessop_api as api;

use clap::Parser;
use kube::Client as KubeClient;
use kube::CustomResourceExt;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "accessopm")]
#[command(version, about = "Keeps Secure Access Cloud sites and applications in line with the cluster", long_about = None)]
struct Args {
    /// Secure Access Cloud API base url
    #[arg(long, env = "SAC_API_URL", required_unless_present = "print_crds")]
    sac_api_url: Option<String>,

    /// OAuth token endpoint, {api}/v1/oauth/token when unset
    #[arg(long, env = "SAC_TOKEN_URL")]
    sac_token_url: Option<String>,

    #[arg(long, env = "SAC_CLIENT_ID", required_unless_present = "print_crds")]
    sac_client_id: Option<String>,

    #[arg(long, env = "SAC_CLIENT_SECRET", hide_env_values = true, required_unless_present = "print_crds")]
    sac_client_secret: Option<String>,

    /// Seconds between passes over a converged record
    #[arg(long, env = "RECONCILE_INTERVAL", default_value_t = 60)]
    reconcile_interval: u64,

    /// Seconds before a failed pass is retried
    #[arg(long, env = "RETRY_DELAY", default_value_t = 5)]
    retry_delay: u64,

    /// Image for sites that don't set one
    #[arg(long, env = "CONNECTOR_IMAGE", default_value = "luminate/connector:2.10.1")]
    connector_image: String,

    /// Remove connector registrations no pod carries anymore
    #[arg(long, env = "SWEEP_DANGLING_CONNECTORS")]
    sweep_dangling_connectors: bool,

    /// Print the custom resource definitions and exit
    #[arg(long)]
    print_crds: bool,
}

fn print_crds() -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&api::Site::crd())?);
    println!("{}", serde_json::to_string_pretty(&api::Application::crd())?);
    Ok(())
}

/*
 * Runs the Site and Application controllers until either stops or the
 * process is interrupted.
 */
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    if args.print_crds {
	print_crds()?;
	return Ok(());
    }

    let api_url = args.sac_api_url.ok_or("--sac-api-url is required")?;
    let client_id = args.sac_client_id.ok_or("--sac-client-id is required")?;
    let client_secret = args.sac_client_secret.ok_or("--sac-client-secret is required")?;

    let sac_settings = SacSettings::new(&api_url, args.sac_token_url.as_deref(), &client_id, SecretString::from(client_secret))?;
    let sac_client = Arc::new(HttpSacClient::new(sac_settings)?);

    let settings = ManagerSettings{
	reconcile_interval: Duration::from_secs(args.reconcile_interval),
	retry_delay: Duration::from_secs(args.retry_delay),
	connector_image: args.connector_image,
	sweep_dangling_connectors: args.sweep_dangling_connectors,
    };

    let kube_client = KubeClient::try_default().await?;

    log::info!("starting accessopm against {}", api_url);
    let mgr = AccessManager::new(kube_client, sac_client, settings);
    tokio::select! {
	_ = mgr.site_controller() => {},
	_ = mgr.application_controller() => {},

	// handle CTRL^C as gracefully as we can.
	_ = tokio::signal::ctrl_c() => {},
    }
    Ok(())
}
