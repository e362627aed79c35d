use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use propdex_core::config::UpdaterConfig;
use propdex_core::models::{
    Acl, BatchReport, ConsistencyReport, LoggerId, PropertySet, RepairReport,
};
use propdex_core::{
    AppConfig, CachingQueryAuthorizationFilterFactory, CancellationFlag, ConsistencyCheck,
    InMemoryPropertySetIndex, IncrementalUpdater, PropertySetIndex,
    QueryAuthorizationFilterFactory, ResourceUri, SqliteResourceStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{CheckArgs, Commands, SearchArgs, UpdateArgs};

mod daemon;
mod support;

use self::daemon::run_daemon;
use self::support::{SecurityFile, build_property_set, build_query, filter_factory, print_json};

pub(crate) const STORE_FILE: &str = "store.sqlite3";
pub(crate) const INDEX_FILE: &str = "index.json";

/// Store and index opened under one root directory.
pub(crate) struct Runtime {
    root: PathBuf,
    store: Arc<SqliteResourceStore>,
    index: Arc<InMemoryPropertySetIndex>,
    config: AppConfig,
}

impl Runtime {
    pub(crate) fn open(root: &Path, config: AppConfig) -> Result<Self> {
        let store = SqliteResourceStore::open(root.join(STORE_FILE))
            .with_context(|| format!("failed to open store under {}", root.display()))?;
        if store.register_change_logger(config.updater.logger)? {
            info!(logger = %config.updater.logger, "registered change logger");
        }
        let index = InMemoryPropertySetIndex::open(root.join(INDEX_FILE))
            .with_context(|| format!("failed to open index under {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            store: Arc::new(store),
            index: Arc::new(index),
            config,
        })
    }

    fn updater(&self, config: UpdaterConfig) -> IncrementalUpdater {
        let index: Arc<dyn PropertySetIndex> = self.index.clone();
        IncrementalUpdater::with_store(index, Arc::clone(&self.store), config)
    }
}

pub(crate) fn run_from_root(root: &Path, command: Commands) -> Result<()> {
    let runtime = Runtime::open(root, AppConfig::from_env())?;
    run_validated(&runtime, command)
}

#[derive(Debug, Serialize)]
struct InitOutput {
    root: String,
    store: String,
    index: String,
    logger: LoggerId,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    resources: usize,
    indexed_documents: usize,
    logger: LoggerId,
    pending_changes: usize,
    registered_loggers: Vec<LoggerId>,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    uri: String,
    id: i64,
    pending_changes: usize,
}

#[derive(Debug, Serialize)]
struct RemoveOutput {
    uri: String,
    removed: usize,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    property_set: PropertySet,
    acl: Acl,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    report: ConsistencyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    repair: Option<RepairReport>,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    principal: Option<String>,
    restricted: bool,
    hits: Vec<PropertySet>,
}

fn run_validated(runtime: &Runtime, command: Commands) -> Result<()> {
    let logger = runtime.config.updater.logger;
    match command {
        Commands::Init => {
            print_json(&InitOutput {
                root: runtime.root.display().to_string(),
                store: runtime.root.join(STORE_FILE).display().to_string(),
                index: runtime.root.join(INDEX_FILE).display().to_string(),
                logger,
            })?;
        }
        Commands::Status => {
            print_json(&StatusOutput {
                resources: runtime.store.resource_count()?,
                indexed_documents: runtime.index.document_count()?,
                logger,
                pending_changes: runtime.store.pending_change_count(logger)?,
                registered_loggers: runtime.store.change_loggers()?,
            })?;
        }
        Commands::Put(args) => {
            let (set, acl) = build_property_set(&args)?;
            runtime.store.put_property_set(&set, &acl, args.collection)?;
            print_json(&PutOutput {
                uri: set.uri.to_string(),
                id: set.id,
                pending_changes: runtime.store.pending_change_count(logger)?,
            })?;
        }
        Commands::Rm(args) => {
            let uri = parse_uri(&args.uri)?;
            let removed = runtime.store.delete_resource(&uri)?;
            print_json(&RemoveOutput {
                uri: uri.to_string(),
                removed,
            })?;
        }
        Commands::Show(args) => {
            let uri = parse_uri(&args.uri)?;
            let Some((property_set, acl)) = runtime.store.property_set(&uri)? else {
                bail!("resource not found: {uri}");
            };
            print_json(&ShowOutput { property_set, acl })?;
        }
        Commands::Update(args) => {
            let report = run_update(runtime, &args)?;
            print_json(&report)?;
        }
        Commands::Daemon(args) => {
            let report = run_daemon(runtime, &args)?;
            print_json(&report)?;
        }
        Commands::Check(args) => {
            let output = run_check(runtime, &args)?;
            print_json(&output)?;
        }
        Commands::Search(args) => {
            let output = run_search(runtime, &args)?;
            print_json(&output)?;
        }
    }
    Ok(())
}

fn parse_uri(raw: &str) -> Result<ResourceUri> {
    ResourceUri::parse(raw).with_context(|| format!("invalid resource uri: {raw}"))
}

fn run_update(runtime: &Runtime, args: &UpdateArgs) -> Result<BatchReport> {
    let mut config = runtime.config.updater;
    if let Some(max_changes) = args.max_changes {
        config.max_changes_per_update = max_changes;
    }
    let updater = runtime.updater(config);
    let report = updater
        .execute_update_batch()
        .context("update batch failed")?;
    if let Some(reason) = report.skipped {
        warn!(?reason, pending = report.fetched, "update batch skipped");
    }
    Ok(report)
}

fn run_check(runtime: &Runtime, args: &CheckArgs) -> Result<CheckOutput> {
    let mut config = runtime.config.check;
    if let Some(error_limit) = args.error_limit {
        config.error_limit = error_limit;
    }
    let mut check = ConsistencyCheck::new(&*runtime.index, &*runtime.store, config);
    if let Err(err) = check.execute(&CancellationFlag::new()) {
        print_json(&CheckOutput {
            report: check.report(),
            repair: None,
        })?;
        return Err(err).context("consistency check did not complete");
    }

    let repair = if args.repair {
        Some(
            check
                .repair_errors(args.abort_on_failure)
                .context("consistency repair failed")?,
        )
    } else {
        None
    };
    Ok(CheckOutput {
        report: check.report(),
        repair,
    })
}

fn run_search(runtime: &Runtime, args: &SearchArgs) -> Result<SearchOutput> {
    let context = SecurityFile::load(&runtime.root)?.into_context()?;
    let inner = filter_factory(context);
    let principal = inner
        .principal_for_token(args.token.as_deref())
        .map(|principal| principal.qualified_name());
    let factory = CachingQueryAuthorizationFilterFactory::new(inner, runtime.config.filter_cache);
    let filter = factory.authorization_query_filter(args.token.as_deref())?;

    let hits = runtime
        .index
        .search(&build_query(args), filter.as_deref(), args.limit)?;
    // The factory lives for one command, so its counters only describe this run.
    let stats = factory.stats()?;
    debug!(hits = stats.hits, misses = stats.misses, "filter cache for this search");
    Ok(SearchOutput {
        principal,
        restricted: filter.is_some(),
        hits,
    })
}
