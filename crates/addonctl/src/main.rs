// # addonctl - Add-on Manager CLI
//
// Thin command line front end over `addon-core`. All install, update and
// sync logic lives in the core crate; this binary only wires the HTTP client,
// the file-backed store and the host's file manager into an `AddonManager`
// and runs one command.
//
// ## Configuration
//
// Paths and credentials come from environment variables:
//
// - `ADDON_GAME_PATH`: Game documents directory (must contain `Addon/`)
// - `ADDON_DATA_DIR`: Where `managed_addons.json` lives
//   (default: `<config dir>/ClassicAddonManager`)
// - `ADDON_CACHE_DIR`: Download and extraction workspace
//   (default: `<cache dir>/ClassicAddonManager`)
// - `ADDON_API_URL`: Add-on service base URL (default: production)
// - `ADDON_CATALOG_URL`: Catalog URL (default: `<api url>/addons`)
// - `ADDON_AUTH_TOKEN`: Session token for subscriptions (optional)
// - `ADDON_PERSISTENT_DIR`: Per-add-on data directory kept across updates
//   (default: `.data`)
// - `ADDON_NOTIFY_UPDATES`: `false` disables the in-game update notice
// - `ADDON_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// `--game-path` on the command line overrides `ADDON_GAME_PATH`.
//
// ## Example
//
// ```bash
// export ADDON_GAME_PATH="$HOME/Documents/My Games/Classic"
//
// addonctl catalog
// addonctl install Raid_Frames
// addonctl check --bulk
// addonctl update --all
// ```

use addon_api_http::{ApiClientConfig, HttpManifestClient};
use addon_core::traits::DirectoryOpener;
use addon_core::{AddonManager, FileManagedStore, ManagerConfig, ManagerEvent};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Directory name used under the platform config and cache directories
const APP_DIR_NAME: &str = "ClassicAddonManager";

/// Exit codes for different termination scenarios
///
/// - 0: Command succeeded
/// - 1: Configuration or startup error
/// - 2: Command failed
/// - 3: Batch command finished with some add-ons failing
#[derive(Debug, Clone, Copy)]
enum AddonExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
    PartialFailure = 3,
}

impl From<AddonExitCode> for ExitCode {
    fn from(code: AddonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "addonctl", version, about = "Install, update and sync game add-ons")]
struct Cli {
    /// Game documents directory; overrides ADDON_GAME_PATH
    #[arg(long, global = true)]
    game_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List add-ons available from the service
    Catalog,

    /// List add-ons the signed-in user subscribed to
    Subscribed,

    /// List installed add-ons
    List,

    /// Install an add-on from the catalog
    Install {
        name: String,

        /// Install this release tag instead of the latest
        #[arg(long)]
        version: Option<String>,
    },

    /// Install a local zip archive; the file name is the add-on name
    InstallZip { archive: PathBuf },

    /// Update one add-on, or every add-on with a pending update
    Update {
        name: Option<String>,

        #[arg(long, conflicts_with = "name")]
        all: bool,
    },

    /// Remove an add-on's files, record and registry line
    Uninstall { name: String },

    /// Stop tracking an add-on without touching its files
    Unmanage { name: String },

    /// Check managed add-ons for newer releases
    Check {
        /// One request for every add-on instead of one per add-on
        #[arg(long)]
        bulk: bool,
    },

    /// Report managed add-ons missing their directory or registry line
    Verify,

    /// Truncate the game's add-on settings file
    ResetSettings,

    /// Open a directory in the file manager
    Open {
        #[command(subcommand)]
        target: OpenTarget,
    },
}

#[derive(Debug, Subcommand)]
enum OpenTarget {
    /// An installed add-on's directory
    Addon { name: String },
    /// The download and extraction cache
    Cache,
    /// The directory holding managed_addons.json
    Data,
}

/// Application configuration
struct Config {
    game_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    api_url: Option<String>,
    catalog_url: Option<String>,
    token: Option<String>,
    persistent_dir: Option<String>,
    notify_updates: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            game_path: env::var("ADDON_GAME_PATH").ok().map(PathBuf::from),
            data_dir: env::var("ADDON_DATA_DIR")
                .ok()
                .map(PathBuf::from)
                .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))),
            cache_dir: env::var("ADDON_CACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .or_else(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR_NAME))),
            api_url: env::var("ADDON_API_URL").ok().filter(|url| !url.is_empty()),
            catalog_url: env::var("ADDON_CATALOG_URL").ok().filter(|url| !url.is_empty()),
            token: env::var("ADDON_AUTH_TOKEN").ok().filter(|token| !token.is_empty()),
            persistent_dir: env::var("ADDON_PERSISTENT_DIR").ok(),
            notify_updates: match env::var("ADDON_NOTIFY_UPDATES") {
                Ok(value) => parse_bool(&value)?,
                Err(_) => true,
            },
            log_level: env::var("ADDON_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let Some(ref game_path) = self.game_path else {
            anyhow::bail!(
                "ADDON_GAME_PATH is required. \
                Set it via: export ADDON_GAME_PATH=/path/to/game/documents"
            );
        };

        if !game_path.join(addon_core::config::ADDON_DIR_NAME).is_dir() {
            anyhow::bail!(
                "ADDON_GAME_PATH does not contain an {} directory: {}",
                addon_core::config::ADDON_DIR_NAME,
                game_path.display()
            );
        }

        if self.data_dir.is_none() {
            anyhow::bail!("No platform config directory found; set ADDON_DATA_DIR");
        }

        if self.cache_dir.is_none() {
            anyhow::bail!("No platform cache directory found; set ADDON_CACHE_DIR");
        }

        for (key, url) in [
            ("ADDON_API_URL", &self.api_url),
            ("ADDON_CATALOG_URL", &self.catalog_url),
        ] {
            let Some(url) = url else { continue };
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("{} must use HTTP or HTTPS scheme. Got: {}", key, url);
            }

            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: {} uses HTTP (not HTTPS). \
                    The session token is sent in clear text.",
                    key
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ADDON_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn manager_config(&self) -> Result<ManagerConfig> {
        let game_path = self.game_path.as_ref().context("ADDON_GAME_PATH is not set")?;
        let data_dir = self.data_dir.clone().context("data directory is not set")?;
        let cache_dir = self.cache_dir.clone().context("cache directory is not set")?;

        let mut config = ManagerConfig::new(
            game_path.join(addon_core::config::ADDON_DIR_NAME),
            data_dir,
            cache_dir,
        )
        .with_notify_updates(self.notify_updates);

        if let Some(ref name) = self.persistent_dir {
            config = config.with_persistent_dir_name(name.clone());
        }

        Ok(config)
    }

    fn api_config(&self) -> ApiClientConfig {
        let mut api = match self.api_url {
            Some(ref url) => ApiClientConfig::with_base_url(url.clone()),
            None => ApiClientConfig::default(),
        };
        if let Some(ref url) = self.catalog_url {
            api.catalog_url = url.clone();
        }
        if let Some(ref token) = self.token {
            api = api.with_auth_token(token.clone());
        }
        api
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Expected a boolean, got '{}'", value),
    }
}

/// Opens directories with the platform's file manager
struct SystemDirectoryOpener;

impl DirectoryOpener for SystemDirectoryOpener {
    fn open(&self, path: &Path) -> addon_core::Result<()> {
        let program = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };

        std::process::Command::new(program)
            .arg(path)
            .spawn()
            .map(|_| ())
            .map_err(|e| {
                addon_core::Error::filesystem(format!(
                    "Failed to open {} with {}: {}",
                    path.display(),
                    program,
                    e
                ))
            })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return AddonExitCode::ConfigError.into();
        }
    };

    if let Some(ref path) = cli.game_path {
        config.game_path = Some(path.clone());
    }

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return AddonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AddonExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AddonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(config, cli.command).await {
            Ok(code) => code,
            Err(e) => {
                error!("Command failed: {:#}", e);
                AddonExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Build the manager and run one command
async fn run(config: Config, command: Command) -> Result<AddonExitCode> {
    let client = Arc::new(HttpManifestClient::new(config.api_config())?);
    let fetcher = client.archive_fetcher()?;
    let manager_config = config.manager_config()?;
    let store = FileManagedStore::in_dir(&manager_config.data_dir);

    let (manager, mut events) =
        AddonManager::new(manager_config, client, Box::new(fetcher), Box::new(store))?;
    let manager = manager.with_directory_opener(Box::new(SystemDirectoryOpener));

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    manager.initialize().await?;
    let code = execute(&manager, command).await;

    // Closing the channel lets the reporter drain and exit
    drop(manager);
    if let Err(e) = reporter.await {
        warn!("Event reporter stopped: {}", e);
    }

    code
}

async fn execute(manager: &AddonManager, command: Command) -> Result<AddonExitCode> {
    match command {
        Command::Catalog => {
            for manifest in manager.catalog().await? {
                println!("{}\t{}\t{}", manifest.name, manifest.author, manifest.description);
            }
        }
        Command::Subscribed => {
            for manifest in manager.subscribed_addons().await? {
                println!("{}\t{}", manifest.name, manifest.author);
            }
        }
        Command::List => {
            for addon in manager.list_addons().await? {
                let version = if addon.is_managed { addon.version.as_str() } else { "-" };
                println!("{}\t{}\t{}", addon.name, addon.display_name(), version);
            }
        }
        Command::Install { name, version } => {
            let manifest = manager
                .catalog()
                .await?
                .into_iter()
                .find(|manifest| manifest.name == name)
                .with_context(|| format!("{} is not in the catalog", name))?;

            let record = match version {
                Some(ref version) => manager.install_version(&manifest, version).await?,
                None => manager.install(&manifest).await?,
            };
            println!("Installed {} {}", record.name, record.version);
        }
        Command::InstallZip { archive } => {
            let name = manager.install_zip(&archive).await?;
            println!("Installed {} from {}", name, archive.display());
        }
        Command::Update { name: Some(name), .. } => {
            let record = manager.update_by_name(&name).await?;
            println!("Updated {} to {}", record.name, record.version);
        }
        Command::Update { name: None, all } => {
            if !all {
                anyhow::bail!("Name an add-on to update, or pass --all");
            }

            let report = manager.update_all().await?;
            for record in &report.updated {
                println!("Updated {} to {}", record.name, record.version);
            }
            for (name, e) in &report.failed {
                eprintln!("Failed to update {}: {}", name, e);
            }
            if !report.is_success() {
                return Ok(AddonExitCode::PartialFailure);
            }
        }
        Command::Uninstall { name } => {
            manager.uninstall(&name).await?;
            println!("Uninstalled {}", name);
        }
        Command::Unmanage { name } => {
            manager.unmanage(&name).await?;
            println!("{} is no longer managed", name);
        }
        Command::Check { bulk } => {
            let updates = if bulk {
                manager.check_for_updates_bulk().await?
            } else {
                manager.check_for_updates().await?
            };

            let mut names: Vec<&String> = updates.keys().collect();
            names.sort();
            for name in names {
                println!("{}\t{}", name, updates[name].version);
            }
        }
        Command::Verify => {
            let report = manager.verify_consistency().await?;
            for orphan in &report.orphaned {
                println!(
                    "{}\tdirectory missing: {}\tregistry line missing: {}",
                    orphan.name, orphan.missing_directory, orphan.missing_registry_entry
                );
            }
            if !report.is_consistent() {
                return Ok(AddonExitCode::PartialFailure);
            }
        }
        Command::ResetSettings => {
            manager.reset_addon_settings().await?;
            println!("Add-on settings reset");
        }
        Command::Open { target } => match target {
            OpenTarget::Addon { name } => manager.open_addon_dir(&name)?,
            OpenTarget::Cache => manager.open_cache_dir().await?,
            OpenTarget::Data => manager.open_data_dir().await?,
        },
    }

    Ok(AddonExitCode::Success)
}

fn log_event(event: &ManagerEvent) {
    match event {
        ManagerEvent::StageEntered { name, stage } => info!("{}: {}", name, stage),
        ManagerEvent::Installed { name, version } => match version {
            Some(version) => info!("Installed {} {}", name, version),
            None => info!("Installed {} from a local archive", name),
        },
        ManagerEvent::Updated {
            name,
            previous_version,
            version,
        } => info!(
            "Updated {} from {} to {}",
            name,
            previous_version.as_deref().unwrap_or("unknown"),
            version
        ),
        ManagerEvent::Uninstalled { name } => info!("Uninstalled {}", name),
        ManagerEvent::OperationFailed { name, error } => warn!("{} failed: {}", name, error),
        ManagerEvent::UpdatesFound { names } => {
            info!("{} update(s) available: {}", names.len(), names.join(", "))
        }
        ManagerEvent::Inconsistency {
            name,
            missing_directory,
            missing_registry_entry,
        } => warn!(
            "{} is inconsistent (directory missing: {}, registry line missing: {})",
            name, missing_directory, missing_registry_entry
        ),
    }
}
