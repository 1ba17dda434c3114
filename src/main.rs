use std::path::PathBuf;

use clap::Parser;
use tracing::info;

pub mod config;
pub mod imports;
pub mod plan;
pub mod template;
pub mod writer;

use template::ServiceSpec;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error("Invalid address plan for {app_name}: {source}")]
    Plan {
        app_name: String,
        source: plan::Error,
    },

    #[error(transparent)]
    Imports(#[from] imports::Error),

    #[error(transparent)]
    Writer(#[from] writer::Error),
}

#[derive(Parser, Debug)]
#[command(version, about = "Synthesize CloudFormation stacks for Fargate services")]
struct Cli {
    /// Path to the deployment config
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::parse(&cli.config)?;

    // All fields below are guaranteed present by config validation.
    let domain = config.domain.as_ref().unwrap();
    let registry_namespace = config.registry_namespace.as_ref().unwrap();

    // Compute every address plan up front so an invalid entry rejects the
    // whole deployment before any AWS call is made.
    let mut planned = Vec::new();
    for entry in &config.services {
        let app_name = entry.app_name.as_ref().unwrap().clone();
        let dns_record = entry.dns_record.as_ref().unwrap();

        let plan = plan::AddressPlan::compute(entry.app_id.unwrap(), entry.max_azs.unwrap())
            .map_err(|source| Error::Plan {
                app_name: app_name.clone(),
                source,
            })?;

        let service = ServiceSpec {
            dns_name: format!("{}.{}", dns_record, domain),
            image: format!("{}/{}", registry_namespace, app_name),
            service_tag: dns_record.clone(),
            app_name,
        };

        planned.push((service, plan, &entry.template));
    }

    let shared = imports::SharedInfra::fetch(config.region.as_ref()).await?;
    info!(cluster = %shared.cluster_name, "resolved shared infrastructure exports");

    for (service, plan, template_path) in planned {
        let template = template::synthesize(&service, &plan, &shared);
        writer::write_template(template_path, &template)?;

        info!(
            app = %service.app_name,
            template = %template_path.display(),
            dns_name = %service.dns_name,
            "synthesized service stack"
        );
    }

    Ok(())
}
