use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use treecache::{
    application::{
        artifacts::DescendantPaths, error::AppError, repos::NodeStore, runtime::CacheRuntime,
    },
    cache::{CacheConfig, ClusterBroadcaster},
    config::{self, Command, InvalidatePathsArgs, PathsArgs, ResolveArgs},
    infra::{
        cluster::LocalCluster, error::InfraError, fixture::StoreFixture, memory::MemoryNodeStore,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    telemetry::init(&settings.logging)?;

    let cache_config = CacheConfig::from(&settings.cache);
    let store: Arc<dyn NodeStore> = match settings.store.fixture.as_deref() {
        Some(path) => Arc::new(
            StoreFixture::read(path)
                .await?
                .seed(&cache_config.root_path)
                .await?,
        ),
        None => Arc::new(MemoryNodeStore::with_root(&cache_config.root_path)?),
    };

    let cluster = LocalCluster::new(settings.cluster.channel_capacity);
    let member: Arc<dyn ClusterBroadcaster> = Arc::new(cluster.join());
    let runtime = CacheRuntime::new(store, cache_config, Some(member))?;

    match cli_args.command {
        Command::Resolve(args) => run_resolve(&runtime, args).await,
        Command::Paths(args) => run_paths(&runtime, args).await,
        Command::InvalidatePaths(args) => run_invalidate_paths(&runtime, args).await,
    }
}

async fn run_resolve(runtime: &CacheRuntime, args: ResolveArgs) -> Result<(), AppError> {
    let settings = runtime.settings();
    let resolved = if runtime.config().is_root(&args.path) {
        settings.resolve_root(&args.name).await?
    } else {
        settings.resolve(&args.name, &args.path).await?
    };

    match resolved {
        Some(found) => {
            let rendered = serde_json::to_string_pretty(found.as_ref())
                .map_err(|err| AppError::unexpected(err.to_string()))?;
            println!("{rendered}");
        }
        None => {
            info!(name = %args.name, path = %args.path, "No settings found");
            println!("default");
        }
    }
    Ok(())
}

async fn run_paths(runtime: &CacheRuntime, args: PathsArgs) -> Result<(), AppError> {
    let cache = runtime.path_cache(DescendantPaths::new(args.node_type));
    for path in cache.get_paths(&args.key).await? {
        println!("{path}");
    }
    Ok(())
}

async fn run_invalidate_paths(
    runtime: &CacheRuntime,
    args: InvalidatePathsArgs,
) -> Result<(), AppError> {
    let artifacts = runtime.artifacts();
    if artifacts.invalidate(&args.key).await? {
        println!("deleted {}", artifacts.artifact_path(&args.key));
    } else {
        println!("no artifact for `{}`", args.key);
    }
    Ok(())
}
