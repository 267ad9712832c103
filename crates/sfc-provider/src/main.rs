//! `sfcctl` - apply an SFC fixture and print the resulting paths

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::try_join_all;
use serde::Deserialize;
use sfc_datastore::MemoryDataStore;
use sfc_provider::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sfcctl", version, about = "Service function path lifecycle tool")]
struct Cli {
    /// JSON fixture with functions, chains and paths
    fixture: PathBuf,

    /// Provider configuration (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Delete a service function after the fixture is applied (repeatable)
    #[arg(long = "delete-function", value_name = "NAME")]
    delete_functions: Vec<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short)]
    verbose: bool,
}

/// Records applied on startup
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Fixture {
    service_functions: Vec<ServiceFunction>,
    service_function_chains: Vec<ServiceFunctionChain>,
    service_function_paths: Vec<ServiceFunctionPath>,
}

impl Fixture {
    fn parse(source: &str) -> Result<Self> {
        serde_json::from_str(source).context("invalid fixture")
    }
}

fn load_config(path: Option<&Path>) -> Result<ProviderConfig> {
    let Some(path) = path else {
        return Ok(ProviderConfig::default());
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ProviderConfig::from_toml_str(&source)
        .with_context(|| format!("loading config {}", path.display()))
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn apply(provider: &SfcProvider, fixture: Fixture, deletes: &[String]) -> Result<()> {
    // Functions and chains are independent entities and may run concurrently
    let functions = fixture
        .service_functions
        .into_iter()
        .map(|function| provider.submit(Command::PutFunction(function)));
    try_join_all(functions)
        .await
        .context("writing service functions")?;

    let chains = fixture
        .service_function_chains
        .into_iter()
        .map(|chain| provider.submit(Command::PutChain(chain)));
    try_join_all(chains)
        .await
        .context("writing service function chains")?;

    for path in fixture.service_function_paths {
        let name = path.name.clone();
        provider
            .create_path(path)
            .await
            .with_context(|| format!("creating path {name}"))?;
    }

    for name in deletes {
        let existed = provider
            .delete_function(name)
            .await
            .with_context(|| format!("deleting service function {name}"))?;
        if !existed {
            tracing::warn!(function = %name, "service function not present");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;
    let source = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("reading fixture {}", cli.fixture.display()))?;
    let fixture = Fixture::parse(&source)?;

    let provider = SfcProvider::new(Arc::new(MemoryDataStore::new()), config)?;
    apply(&provider, fixture, &cli.delete_functions).await?;

    let paths = ServiceFunctionPaths::new(provider.read_all_paths().await?);
    println!("{}", serde_json::to_string_pretty(&paths)?);

    let stats = provider.stats();
    tracing::info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "done"
    );
    provider.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "service-functions": [
            { "name": "SF1", "type": "firewall" },
            { "name": "SF2", "type": "dpi" }
        ],
        "service-function-chains": [
            {
                "name": "C1",
                "sfc-service-function": [
                    { "name": "SF1", "type": "firewall" },
                    { "name": "SF2", "type": "dpi" }
                ],
                "symmetric": true
            }
        ],
        "service-function-paths": [
            { "name": "P1", "service-chain-name": "C1" }
        ]
    }"#;

    #[test]
    fn fixture_sections_are_optional() {
        let fixture = Fixture::parse("{}").unwrap();
        assert!(fixture.service_functions.is_empty());
        assert!(fixture.service_function_paths.is_empty());
        assert!(Fixture::parse("[").is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker-limit = 2\nreverse-path-suffix = \"-Rev\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.worker_limit, 2);
        assert_eq!(config.reverse_path_suffix, "-Rev");
        assert_eq!(load_config(None).unwrap(), ProviderConfig::default());
    }

    #[tokio::test]
    async fn apply_creates_and_cascades() {
        let provider =
            SfcProvider::new(Arc::new(MemoryDataStore::new()), ProviderConfig::default()).unwrap();
        let fixture = Fixture::parse(FIXTURE).unwrap();

        apply(&provider, fixture, &[]).await.unwrap();
        let names: Vec<_> = provider
            .read_all_paths()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["P1", "P1-Reverse"]);

        apply(&provider, Fixture::default(), &["SF2".to_string()])
            .await
            .unwrap();
        assert!(provider.read_all_paths().await.unwrap().is_empty());
    }
}
