use crate::core::{
    api::{CollectionsApi, HttpCollectionsClient},
    batch::{BatchController, BatchOutcome, create_batch_channel},
    config::{AppConfig, CONFIG_KEYS, ConfigService},
    error_log::ErrorLog,
    models::{BatchKind, Company, DataPath, parse_company_ids},
    view::CollectionView,
};
use crate::tui::{CollectionBrowser, CollectionPicker};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "collectr")]
#[command(about = "Browse company collections and manage the Liked list.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets a custom data path
    #[arg(long, value_name = "DIR", global = true)]
    pub data_path: Option<PathBuf>,

    /// Overrides the configured service address
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all collections
    Collections,
    /// Print one page of a collection
    Show {
        /// The collection id
        collection: String,
        /// Number of companies to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Page size (defaults to ui.page_size)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print one page of all companies
    Companies {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Add companies to the Liked collection
    Like {
        /// Company ids, separated by spaces or commas
        #[arg(required = true)]
        ids: Vec<String>,
        /// Override the per-company time estimate used for progress
        #[arg(long, value_name = "MS")]
        ms_per_item: Option<u64>,
    },
    /// Remove companies from the Liked collection
    Unlike {
        /// Company ids, separated by spaces or commas
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Add companies to My List
    MyList {
        /// Company ids, separated by spaces or commas
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Open the interactive collection browser
    Browse {
        /// Collection to open (if not provided, opens a collection picker)
        #[arg(long)]
        collection: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect recorded request failures
    Errors {
        #[command(subcommand)]
        command: Option<ErrorCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// The key to get
        key: String,
    },
    /// Set a configuration value
    Set {
        /// The key to set
        key: String,
        /// The value to set
        value: String,
    },
}

#[derive(Subcommand)]
pub enum ErrorCommands {
    /// Show recent errors
    List {
        /// Maximum number of errors to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only show errors from this operation
        #[arg(long)]
        operation: Option<String>,
    },
    /// Show error counts per operation
    Stats,
    /// Delete the error log
    Clear,
}

/// Route `log` output to stderr, or to a file while the full-screen UI owns
/// the terminal.
pub fn init_logging(data_path: &DataPath, to_file: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));

    if to_file {
        let file = fs::create_dir_all(&data_path.root).and_then(|_| {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(data_path.app_log_path())
        });
        if let Ok(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    // A second init (e.g. in tests) is harmless
    let _ = builder.try_init();
}

pub async fn run(cli: Cli) -> io::Result<()> {
    let data_path = DataPath::new(cli.data_path.clone())?;
    init_logging(&data_path, matches!(cli.command, Commands::Browse { .. }));

    match &cli.command {
        Commands::Config { command } => return handle_config_command(&data_path, command),
        Commands::Errors { command } => return handle_errors_command(&data_path, command),
        _ => {}
    }

    let mut config = ConfigService::load_config(&data_path)?;
    if let Some(base_url) = &cli.base_url {
        ConfigService::set_value(&mut config, "server.base_url", base_url)?;
    }
    let api = create_client(&data_path, &config)?;

    match cli.command {
        Commands::Collections => handle_collections_command(api.as_ref()).await,
        Commands::Show {
            collection,
            offset,
            limit,
        } => {
            let limit = limit.unwrap_or(config.ui.page_size);
            handle_show_command(api.as_ref(), &collection, offset, limit).await
        }
        Commands::Companies { offset, limit } => {
            let limit = limit.unwrap_or(config.ui.page_size);
            handle_companies_command(api.as_ref(), offset, limit).await
        }
        Commands::Like { ids, ms_per_item } => {
            let per_item = ms_per_item.map(Duration::from_millis);
            handle_batch_command(api, &config, BatchKind::Add, &ids, per_item).await
        }
        Commands::Unlike { ids } => {
            handle_batch_command(api, &config, BatchKind::Remove, &ids, None).await
        }
        Commands::MyList { ids } => handle_my_list_command(api.as_ref(), &ids).await,
        Commands::Browse { collection } => {
            handle_browse_command(api, &config, collection.as_deref()).await
        }
        Commands::Config { .. } | Commands::Errors { .. } => Ok(()),
    }
}

fn create_client(data_path: &DataPath, config: &AppConfig) -> io::Result<Arc<dyn CollectionsApi>> {
    let client = HttpCollectionsClient::new(&config.server)?
        .with_error_log(ErrorLog::new(data_path.error_log_path()));
    Ok(Arc::new(client))
}

fn print_companies(companies: &[Company]) {
    for company in companies {
        let liked = if company.liked { "♥" } else { " " };
        println!("{liked} {:>8}  {}", company.id, company.company_name);
    }
}

pub async fn handle_collections_command(api: &dyn CollectionsApi) -> io::Result<()> {
    let collections = api.list_collections().await?;

    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    let liked_id = match api.get_liked_collection_id().await {
        Ok(id) => Some(id),
        Err(e) => {
            eprintln!("⚠️  Could not determine the Liked collection: {e}");
            None
        }
    };

    println!("Collections ({}):", collections.len());
    println!("{}", "=".repeat(20));
    for collection in &collections {
        let marker = if liked_id.as_deref() == Some(collection.id.as_str()) {
            " ♥ (liked)"
        } else {
            ""
        };
        println!("• {} [{}]{marker}", collection.collection_name, collection.id);
    }

    Ok(())
}

pub async fn handle_show_command(
    api: &dyn CollectionsApi,
    collection: &str,
    offset: u64,
    limit: u32,
) -> io::Result<()> {
    let page = api.get_collection_page(collection, offset, limit).await?;

    let shown_to = offset + page.companies.len() as u64;
    println!(
        "{} ({} companies, showing {}-{})",
        page.collection_name,
        page.total,
        if page.companies.is_empty() { offset } else { offset + 1 },
        shown_to
    );
    println!("{}", "=".repeat(20));
    print_companies(&page.companies);
    Ok(())
}

pub async fn handle_companies_command(
    api: &dyn CollectionsApi,
    offset: u64,
    limit: u32,
) -> io::Result<()> {
    let batch = api.get_companies(offset, limit).await?;

    match batch.total {
        Some(total) => println!("Companies ({total} total):"),
        None => println!("Companies:"),
    }
    println!("{}", "=".repeat(20));
    print_companies(&batch.companies);
    Ok(())
}

/// Run one Liked batch operation to completion, printing progress for adds.
/// Ctrl-C cancels: the request is left to finish but its result is ignored.
pub async fn handle_batch_command(
    api: Arc<dyn CollectionsApi>,
    config: &AppConfig,
    kind: BatchKind,
    raw_ids: &[String],
    per_item: Option<Duration>,
) -> io::Result<()> {
    let ids = parse_company_ids(raw_ids)?;

    let (tx, mut rx) = create_batch_channel();
    let mut controller = BatchController::new(api, config.batch.clone(), tx);
    let mut view = CollectionView::new(config.ui.page_size);
    for id in &ids {
        view.select(*id);
    }

    let per_item = per_item.unwrap_or_else(|| config.batch.estimated_per_item());
    controller
        .start_with_estimate(kind, &view.selected_ids(), per_item)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    println!("{} for {} companies...", kind.display_name(), ids.len());

    let mut last_percent = None;
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                controller
                    .cancel()
                    .map_err(|e| io::Error::other(e.to_string()))?;
                println!("Cancelled. The request may still complete on the server.");
                return Ok(());
            }
        };
        let Some(event) = event else {
            return Err(io::Error::other("batch operation channel closed"));
        };

        match controller.handle_event(event, &mut view) {
            BatchOutcome::Progressed(progress) => {
                if last_percent != Some(progress.percent) {
                    last_percent = Some(progress.percent);
                    println!(
                        "  {:>3}%  ETA {:.1}s",
                        progress.percent,
                        progress.eta.as_secs_f64()
                    );
                }
            }
            BatchOutcome::Completed { kind, count } => {
                info!("{kind} batch of {count} companies completed");
                println!("✅ {} done for {count} companies", kind.display_name());
                return Ok(());
            }
            BatchOutcome::Failed(e) => {
                error!("Batch operation failed: {e}");
                println!("❌ {}", controller.last_error().unwrap_or("batch operation failed"));
                return Err(e.into());
            }
            BatchOutcome::StaleDiscarded | BatchOutcome::ReturnedToIdle | BatchOutcome::Ignored => {}
        }
    }
}

pub async fn handle_my_list_command(api: &dyn CollectionsApi, raw_ids: &[String]) -> io::Result<()> {
    let ids = parse_company_ids(raw_ids)?;
    if ids.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no company ids given",
        ));
    }

    api.add_to_my_list(&ids).await?;
    println!("✅ Added {} companies to My List", ids.len());
    Ok(())
}

pub async fn handle_browse_command(
    api: Arc<dyn CollectionsApi>,
    config: &AppConfig,
    collection: Option<&str>,
) -> io::Result<()> {
    let collection_id = match collection {
        Some(id) => id.to_string(),
        None => {
            let collections = api.list_collections().await?;
            if collections.is_empty() {
                println!("No collections found.");
                return Ok(());
            }
            let liked_id = api.get_liked_collection_id().await.ok();
            let mut picker = CollectionPicker::new(collections, liked_id);
            match picker.run()? {
                Some(id) => id,
                None => {
                    println!("No collection selected.");
                    return Ok(());
                }
            }
        }
    };

    let mut browser = CollectionBrowser::new(api, config);
    browser.load(Some(&collection_id)).await;
    browser.run().await
}

pub fn handle_config_command(
    data_path: &DataPath,
    command: &Option<ConfigCommands>,
) -> io::Result<()> {
    match command {
        Some(ConfigCommands::Get { key }) => {
            let config = ConfigService::load_config(data_path)?;
            let value = ConfigService::get_value(&config, key)?;
            println!("{key}: {value}");
        }
        Some(ConfigCommands::Set { key, value }) => {
            let mut config = ConfigService::load_config(data_path)?;
            ConfigService::set_value(&mut config, key, value)?;
            ConfigService::save_config(&config, data_path)?;
            info!("Updated {key} configuration");
            println!("{key} set to: {}", ConfigService::get_value(&config, key)?);
            println!("Config file: {}", data_path.config_path().display());
        }
        None => {
            let config = ConfigService::load_config(data_path)?;
            println!("Current Configuration:");
            println!("======================");
            for key in CONFIG_KEYS {
                println!("{key}: {}", ConfigService::get_value(&config, key)?);
            }
            println!();
            println!("Config file: {}", data_path.config_path().display());
        }
    }
    Ok(())
}

pub fn handle_errors_command(
    data_path: &DataPath,
    command: &Option<ErrorCommands>,
) -> io::Result<()> {
    let error_log = ErrorLog::new(data_path.error_log_path());

    match command {
        Some(ErrorCommands::List { limit, operation }) => {
            let errors = error_log.read_recent(*limit, operation.as_deref())?;
            if errors.is_empty() {
                println!("No errors found.");
                return Ok(());
            }
            for error in errors {
                println!(
                    "[{}] {} {}: {}",
                    error.timestamp, error.operation, error.error_type, error.error_message
                );
                if let Some(url) = &error.request_url {
                    println!("    {url}");
                }
            }
        }
        Some(ErrorCommands::Stats) => {
            let stats = error_log.stats()?;
            if stats.is_empty() {
                println!("No error statistics available.");
                return Ok(());
            }
            let mut operations: Vec<_> = stats.into_iter().collect();
            operations.sort_by(|a, b| a.0.cmp(&b.0));
            for (operation, stats) in operations {
                println!(
                    "{operation}: {} errors (last at {})",
                    stats.total_errors,
                    stats.last_error_time.as_deref().unwrap_or("unknown")
                );
                let mut types: Vec<_> = stats.error_types.into_iter().collect();
                types.sort();
                for (error_type, count) in types {
                    println!("    {error_type}: {count}");
                }
            }
        }
        Some(ErrorCommands::Clear) => {
            if error_log.clear()? {
                println!("Error log cleared.");
            } else {
                println!("No error log file found.");
            }
        }
        None => {
            println!("Available error commands:");
            println!("  list   Show recent errors");
            println!("  stats  Show error counts per operation");
            println!("  clear  Delete the error log");
        }
    }
    Ok(())
}
