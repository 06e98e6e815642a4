//! Ignition command line client
//!
//! Talks to the Ignition backend with the same client core the companion
//! apps use. Logs go to stderr; command output goes to stdout.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ignition_client::adapters::{LocalStore, ReqwestTransport, WebSocketSettingsFeed};
use ignition_client::app::experiments::{self, ExperimentVariant};
use ignition_client::app::{
    ApiClient, AuthService, CacheConfig, CacheHandle, CacheVersionGuard, CacheWorker,
    CachingTransport, FocusApi, FocusService, FocusView, MutationOutcome, OfflineQueue,
    RetryPolicy, SettingsApi, SettingsSync, VaultApi, VersionCheck,
};
use ignition_client::config::Config;
use ignition_client::crypto::{self, EncryptedPayload};
use ignition_client::domain::entities::{
    AuthProvider, CreateFocusRequest, FocusMode, LockReason, StatsPeriod,
};
use ignition_client::domain::ports::SettingsFeed;

type Transport = CachingTransport<ReqwestTransport>;

#[derive(Parser, Debug)]
#[command(name = "ignition")]
#[command(about = "Command line client for the Ignition API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user
    Session,
    /// Print the URL that starts sign-in with a provider
    SignInUrl {
        /// google or azure
        provider: AuthProvider,
        #[arg(long)]
        callback_url: Option<String>,
    },
    SignOut,
    #[command(subcommand)]
    Focus(FocusCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
    #[command(subcommand)]
    Vault(VaultCommand),
    #[command(subcommand)]
    Cache(CacheCommand),
    #[command(subcommand)]
    Queue(QueueCommand),
    #[command(subcommand)]
    Experiment(ExperimentCommand),
}

#[derive(Subcommand, Debug)]
enum FocusCommand {
    Status,
    Start {
        #[arg(long, default_value = "focus")]
        mode: FocusMode,
        /// Planned length in seconds
        #[arg(long)]
        duration: Option<i64>,
        #[arg(long)]
        task: Option<String>,
    },
    Pause,
    Resume,
    Complete { id: String },
    Abandon { id: String },
    Stats {
        #[arg(long, default_value = "week")]
        period: StatsPeriod,
    },
    /// Follow the countdown until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    List,
    Get { key: String },
    /// Set a value; parsed as JSON when possible, else stored as a string
    Set { key: String, value: String },
    Delete { key: String },
    /// Follow settings changes until interrupted
    Watch,
}

#[derive(Args, Debug)]
struct Passphrase {
    #[arg(long, env = "IGNITION_VAULT_PASSPHRASE", hide_env_values = true)]
    passphrase: String,
}

#[derive(Subcommand, Debug)]
enum VaultCommand {
    Encrypt {
        plaintext: String,
        #[command(flatten)]
        passphrase: Passphrase,
    },
    /// Decrypt a JSON payload as printed by `encrypt`
    Decrypt {
        payload: String,
        #[command(flatten)]
        passphrase: Passphrase,
    },
    State,
    Lock {
        #[arg(long, default_value = "force")]
        reason: LockReason,
    },
    Unlock {
        #[command(flatten)]
        passphrase: Passphrase,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Compare the server's cache version and clear on change
    Check,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    List,
    Flush,
}

#[derive(Subcommand, Debug)]
enum ExperimentCommand {
    Assign {
        #[arg(long)]
        user: String,
        /// Comma separated `id:weight` pairs
        #[arg(long, default_value = "control:50,treatment:50")]
        variants: String,
    },
}

/// Everything a command may need, built once from the config.
struct App {
    config: Config,
    store: Arc<LocalStore>,
    raw: ReqwestTransport,
    cache: CacheHandle,
    client: Arc<ApiClient<Transport>>,
    auth: Arc<AuthService<ReqwestTransport>>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let store = Arc::new(
            LocalStore::open(config.store_path()).context("Failed to open local store")?,
        );
        let raw = ReqwestTransport::new(&config.api_url, config.session.as_deref(), config.timeout)
            .and_then(|transport| transport.with_origin(&config.app_origin))
            .context("Failed to build HTTP transport")?;
        let (cache, _worker) =
            CacheWorker::spawn_persistent(CacheConfig::default(), store.clone());

        let auth = Arc::new(AuthService::new(
            raw.clone(),
            store.clone(),
            &config.api_url,
        ));
        let caching =
            CachingTransport::new(raw.clone(), cache.clone()).with_origin(&config.api_url);
        let client = ApiClient::new(caching)
            .with_retry(RetryPolicy::default())
            .with_session_expiry(auth.clone())
            .with_offline_queue(OfflineQueue::new(store.clone()));

        Ok(Self {
            config,
            store,
            raw,
            cache,
            client: Arc::new(client),
            auth,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = App::build(Config::from_env())?;

    match cli.command {
        Command::Session => match ctx.auth.get_session().await {
            Some(user) => print_json(&user)?,
            None => println!("Not signed in"),
        },
        Command::SignInUrl {
            provider,
            callback_url,
        } => println!("{}", ctx.auth.sign_in_url(provider, callback_url.as_deref())),
        Command::SignOut => {
            ctx.auth.sign_out().await?;
            println!("Signed out");
        }
        Command::Focus(cmd) => run_focus(&ctx, cmd).await?,
        Command::Settings(cmd) => run_settings(&ctx, cmd).await?,
        Command::Vault(cmd) => run_vault(&ctx, cmd).await?,
        Command::Cache(CacheCommand::Check) => {
            let guard =
                CacheVersionGuard::new(ctx.raw.clone(), ctx.cache.clone(), ctx.store.clone());
            match guard.check_and_invalidate().await? {
                VersionCheck::Unchanged => println!("Cache version unchanged"),
                VersionCheck::Invalidated {
                    previous, current, ..
                } => println!(
                    "Cache cleared: {} -> {}",
                    previous.as_deref().unwrap_or("none"),
                    current
                ),
                VersionCheck::Unavailable => println!("Cache version unavailable"),
            }
        }
        Command::Queue(QueueCommand::List) => {
            let queue = OfflineQueue::new(ctx.store.clone());
            print_json(&queue.pending()?)?;
        }
        Command::Queue(QueueCommand::Flush) => {
            let report = ctx.client.flush_offline_queue().await?;
            println!(
                "Replayed {}, dropped {}, remaining {}",
                report.replayed, report.dropped, report.remaining
            );
        }
        Command::Experiment(ExperimentCommand::Assign { user, variants }) => {
            let variants = parse_variants(&variants)?;
            match experiments::assign(&user, &variants) {
                Some(variant) => println!("{}", variant.id),
                None => bail!("No variants given"),
            }
        }
    }

    // Cache stores are fire-and-forget; a round trip lets them land on disk
    if let Err(e) = ctx.cache.stats().await {
        tracing::debug!(error = %e, "Cache worker already stopped");
    }

    Ok(())
}

async fn run_focus(ctx: &App, cmd: FocusCommand) -> Result<()> {
    let api = FocusApi::new(ctx.client.clone());
    let service = || FocusService::new(api.clone(), ctx.store.clone());

    match cmd {
        FocusCommand::Status => {
            let mut service = service();
            service.refresh().await;
            print_view(&service.view());
        }
        FocusCommand::Start {
            mode,
            duration,
            task,
        } => {
            let session = api
                .start(&CreateFocusRequest {
                    mode: Some(mode),
                    duration_seconds: duration,
                    task_title: task,
                })
                .await?;
            print_json(&session)?;
        }
        FocusCommand::Pause => {
            let mut service = service();
            service.refresh().await;
            match service.pause().await? {
                Some(snapshot) => println!(
                    "Paused {} with {} left",
                    snapshot.mode,
                    format_secs(snapshot.time_remaining)
                ),
                None => println!("No running session"),
            }
        }
        FocusCommand::Resume => {
            let mut service = service();
            service.refresh().await;
            match service.resume().await? {
                Some(session) => print_json(&session)?,
                None => println!("Nothing paused"),
            }
        }
        FocusCommand::Complete { id } => print_json(&api.complete(&id).await?.session)?,
        FocusCommand::Abandon { id } => print_json(&api.abandon(&id).await?)?,
        FocusCommand::Stats { period } => print_json(&api.stats(period).await?)?,
        FocusCommand::Watch => {
            let service = service();
            let mut views = service.subscribe();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(service.run(shutdown_rx));

            loop {
                tokio::select! {
                    changed = views.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let view = views.borrow_and_update().clone();
                        print_view(&view);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            let _ = shutdown_tx.send(true);
            task.await.context("Focus service task failed")?;
        }
    }
    Ok(())
}

async fn run_settings(ctx: &App, cmd: SettingsCommand) -> Result<()> {
    let api = SettingsApi::new(ctx.client.clone());

    match cmd {
        SettingsCommand::List => print_json(&api.list().await?)?,
        SettingsCommand::Get { key } => match api.get(&key).await? {
            Some(value) => print_json(&value)?,
            None => println!("{} is not set", key),
        },
        SettingsCommand::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            match api.update_or_queue(&key, value).await? {
                MutationOutcome::Applied(_) => println!("Updated {}", key),
                MutationOutcome::Queued(entry) => {
                    println!("Offline; queued update of {} ({})", key, entry.id)
                }
            }
        }
        SettingsCommand::Delete { key } => {
            api.delete(&key).await?;
            println!("Deleted {}", key);
        }
        SettingsCommand::Watch => {
            let feed: Option<Arc<dyn SettingsFeed>> = if ctx.config.prefer_websocket {
                Some(Arc::new(WebSocketSettingsFeed::from_api_url(
                    &ctx.config.api_url,
                    ctx.config.session.clone(),
                )))
            } else {
                None
            };
            let sync = Arc::new(SettingsSync::new(api, feed));
            let mut snapshots = sync.subscribe();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn({
                let sync = sync.clone();
                async move { sync.run(shutdown_rx).await }
            });

            loop {
                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        if !snapshot.is_loading {
                            eprintln!("[{}]", snapshot.mode);
                            print_json(&snapshot.settings)?;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            let _ = shutdown_tx.send(true);
            task.await.context("Settings sync task failed")?;
        }
    }
    Ok(())
}

async fn run_vault(ctx: &App, cmd: VaultCommand) -> Result<()> {
    let api = VaultApi::new(ctx.client.clone());

    match cmd {
        VaultCommand::Encrypt {
            plaintext,
            passphrase,
        } => {
            let payload = crypto::encrypt_string(&plaintext, &passphrase.passphrase)?;
            print_json(&payload)?;
        }
        VaultCommand::Decrypt {
            payload,
            passphrase,
        } => {
            let raw: Value = serde_json::from_str(&payload).context("Payload is not JSON")?;
            if !crypto::is_encrypted_payload(&raw) {
                bail!("Payload needs string iv, salt and cipher fields");
            }
            let payload: EncryptedPayload = serde_json::from_value(raw)?;
            println!("{}", crypto::decrypt_string(&payload, &passphrase.passphrase)?);
        }
        VaultCommand::State => print_json(&api.state().await?)?,
        VaultCommand::Lock { reason } => {
            api.lock(reason).await?;
            println!("Vault locked");
        }
        VaultCommand::Unlock { passphrase } => {
            let state = api.unlock(&passphrase.passphrase).await?;
            print_json(&state)?;
        }
    }
    Ok(())
}

fn parse_variants(raw: &str) -> Result<Vec<ExperimentVariant>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<ExperimentVariant> {
            let (id, weight) = part
                .split_once(':')
                .with_context(|| format!("Expected id:weight, got {}", part))?;
            Ok(ExperimentVariant {
                id: id.to_string(),
                name: id.to_string(),
                weight: weight
                    .parse()
                    .with_context(|| format!("Invalid weight in {}", part))?,
            })
        })
        .collect()
}

fn print_view(view: &FocusView) {
    match (view.mode(), view.is_active(), view.is_paused()) {
        (Some(mode), true, _) => {
            println!("{} running, {} left", mode, format_secs(view.time_remaining))
        }
        (Some(mode), _, true) => {
            println!("{} paused, {} left", mode, format_secs(view.time_remaining))
        }
        _ => println!("No focus session"),
    }
}

fn format_secs(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
