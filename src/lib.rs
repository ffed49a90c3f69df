pub mod account;
pub mod attention;
pub mod audio;
pub mod browser;
pub mod commands;
pub mod db;
pub mod domains;
pub mod events;
pub mod flattrs;
pub mod history;
pub mod page_url;
pub mod settings;
pub mod tabs;
pub mod timer;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use account::Account;
use attention::PageLedger;
use audio::AudioTracker;
use browser::BrowserRouter;
use db::Database;
use domains::{DomainResolver, PresetTree};
use events::EventBus;
use flattrs::{FlattrApi, FlattrCoordinator, SubmissionQueue};
use history::{HistoryEngine, HistoryLog, HistorySource};
use settings::{SettingsStore, UserSettings};
use tabs::TabRegistry;
use timer::TimerController;

/// Where the engine keeps its state and what it talks to.
pub struct AppOptions {
    /// `None` keeps the database and settings in memory.
    pub data_dir: Option<PathBuf>,
    /// Used when there is no data directory.
    pub settings: UserSettings,
    /// Defaults to the bundled preset tree.
    pub presets: Option<PresetTree>,
    /// Without an API the outbound queue is never drained.
    pub api: Option<Arc<dyn FlattrApi>>,
    /// Defaults to an in-memory log fed by `Visited` events.
    pub history: Option<Arc<dyn HistorySource>>,
    pub run_scheduler: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            settings: UserSettings::default(),
            presets: None,
            api: None,
            history: None,
            run_scheduler: false,
        }
    }
}

/// Default data directory: `$AUTOFLATTR_DATA_DIR`, else the platform data
/// dir.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("AUTOFLATTR_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("autoflattr"))
        .context("no platform data directory; set AUTOFLATTR_DATA_DIR")
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub account: Account,
    pub events: EventBus,
    pub resolver: DomainResolver,
    pub registry: TabRegistry,
    pub coordinator: FlattrCoordinator,
    pub ledger: PageLedger,
    pub timers: TimerController,
    pub audio: AudioTracker,
    pub history: HistoryEngine,
    pub router: BrowserRouter,
    shutdown: CancellationToken,
    workers: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    pub async fn start(options: AppOptions) -> Result<Self> {
        let (db, settings) = match &options.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                (
                    Database::new(dir.join("autoflattr.sqlite3"))?,
                    SettingsStore::new(dir.join("settings.json"))?,
                )
            }
            None => (
                Database::in_memory()?,
                SettingsStore::in_memory(options.settings.clone()),
            ),
        };
        let settings = Arc::new(settings);
        let account = Account::new(settings.clone());
        let events = EventBus::default();
        let shutdown = CancellationToken::new();
        let mut workers = Vec::new();

        let presets = match options.presets {
            Some(presets) => presets,
            None => PresetTree::bundled()?,
        };
        let resolver = DomainResolver::new(presets, db.clone(), events.clone());
        resolver.load().await?;

        let queue = match options.api {
            Some(api) => {
                let (queue, handle) = SubmissionQueue::spawn(
                    db.clone(),
                    api,
                    account.clone(),
                    settings.submission(),
                    shutdown.clone(),
                );
                workers.push(handle);
                queue
            }
            None => SubmissionQueue::detached(),
        };

        let registry = TabRegistry::new();
        let coordinator = FlattrCoordinator::new(db.clone(), events.clone(), queue);
        let ledger = PageLedger::new(
            db.clone(),
            resolver.clone(),
            registry.clone(),
            coordinator.clone(),
            events.clone(),
            account.clone(),
        );

        let tracking = settings.tracking();
        let timers = TimerController::new(
            registry.clone(),
            ledger.clone(),
            tracking.attention_duration(),
        );
        let audio = AudioTracker::new(
            registry.clone(),
            ledger.clone(),
            timers.clone(),
            tracking.audio_timeout(),
        );

        let (source, history_log) = match options.history {
            Some(source) => (source, None),
            None => {
                let log = Arc::new(HistoryLog::new());
                let source: Arc<dyn HistorySource> = log.clone();
                (source, Some(log))
            }
        };
        let history = HistoryEngine::new(
            db.clone(),
            source,
            resolver.clone(),
            coordinator.clone(),
            registry.clone(),
            account.clone(),
            settings.clone(),
        );
        if options.run_scheduler {
            workers.push(history::spawn_scheduler(
                history.clone(),
                std::time::Duration::from_secs(settings.history().startup_delay_secs),
                shutdown.clone(),
            ));
        }

        let router = BrowserRouter::new(
            registry.clone(),
            timers.clone(),
            audio.clone(),
            ledger.clone(),
            history.clone(),
            history_log,
        );

        info!(
            "autoflattr engine ready (slice {:?}, database {})",
            tracking.attention_duration(),
            db.path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "in memory".into())
        );

        Ok(Self {
            db,
            settings,
            account,
            events,
            resolver,
            registry,
            coordinator,
            ledger,
            timers,
            audio,
            history,
            router,
            shutdown,
            workers: Arc::new(std::sync::Mutex::new(workers)),
        })
    }

    /// Waits until every stop and expiry so far has reached the ledger.
    pub async fn settle(&self) {
        self.timers.settle().await;
        self.audio.settle().await;
    }

    /// Commits running timers and stops background workers.
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = utils::lock(&self.workers).drain(..).collect();
        for worker in workers {
            if let Err(err) = worker.await {
                log::error!("Background worker failed to join: {err}");
            }
        }
        info!("autoflattr engine stopped");
    }
}
