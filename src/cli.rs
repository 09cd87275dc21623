//! Command-line front end for the API client.

mod tracking;

use crate::api::{
    ApiClient, AuthResponse, ClassifiedError, Credentials, DEFAULT_SEARCH_LIMIT, Fetched,
    NewSavedItem, Registration, SavedItem, SavedItemUpdate, SearchResult,
};
use crate::cache::{KeyValueStorage, MemoryStorage, SqliteStorage};
use crate::config::Config;
use crate::presentation::{ErrorPresentationState, MAX_MANUAL_RETRIES};
use crate::session::{StoredSession, TokenStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::future::Future;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
pub use tracking::{
    AlertAction, AlertKind, NotifyArg, PortfolioAction, ProfileAction, SettingsAction, StatusArg,
    TrendsArgs,
};

/// Resale research from the terminal
#[derive(Parser, Debug)]
#[command(name = "fliplens", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    pub json: bool,

    /// Never offer to retry a failed request
    #[arg(long = "no-prompt", global = true)]
    pub no_prompt: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search marketplace listings
    Search(SearchArgs),
    /// Manage saved items
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },
    /// Price history for an item
    Trends(TrendsArgs),
    /// Track bought, listed and sold items
    Portfolio {
        #[command(subcommand)]
        action: PortfolioAction,
    },
    /// Manage price alerts
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// Show your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Show or change app settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Create an account and log in
    Register(RegisterArgs),
    /// Log in and remember the session
    Login(LoginArgs),
    /// Show the logged-in user
    Whoami,
    /// Log out and forget the session
    Logout,
    /// Check the backend is up
    Health,
    /// Inspect or clear the offline cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Maximum results (1-100)
    #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub limit: u32,

    /// Save the result at this position (1-based)
    #[arg(long, value_name = "N")]
    pub save: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum SavedAction {
    /// List saved items
    List,
    /// Show one saved item
    Get { id: String },
    /// Save an item
    Add {
        id: String,
        title: String,
        price: String,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Update fields of a saved item
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a saved item
    Remove { id: String },
}

#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Email or username
    pub identifier: String,

    /// Password (else `FLIPLENS_PASSWORD`, else read from stdin)
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    pub email: String,
    pub username: String,

    /// Password (else `FLIPLENS_PASSWORD`, else read from stdin)
    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Entry counts per cache
    Stats,
    /// Drop every cached response
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

/// Run one command. Request failures are reported and turn into a failure
/// exit code; setup failures are returned as errors.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose);

    if let Commands::Config { action } = &cli.command {
        return show_config(action);
    }

    let config = Config::load().context("Failed to load config")?;
    let client = ApiClient::http(&config, open_storage(&config));
    let tokens = TokenStore::new().context("Failed to open session storage")?;
    match tokens.load() {
        Ok(Some(session)) => client.set_token(Some(session.bearer())).await,
        Ok(None) => {}
        Err(e) => warn!("Ignoring stored session: {e}"),
    }

    let interactive = !cli.no_prompt && io::stdin().is_terminal();
    let out = Output { json: cli.json };

    let outcome = match cli.command {
        Commands::Search(args) => search(&client, &args, &out, interactive).await,
        Commands::Saved { action } => saved(&client, action, &out, interactive).await,
        Commands::Trends(args) => tracking::trends(&client, &args, &out, interactive).await,
        Commands::Portfolio { action } => {
            tracking::portfolio(&client, action, &out, interactive).await
        }
        Commands::Alerts { action } => tracking::alerts(&client, action, &out, interactive).await,
        Commands::Profile { action } => tracking::profile(&client, action, &out, interactive).await,
        Commands::Settings { action } => {
            tracking::settings(&client, action, &out, interactive).await
        }
        Commands::Register(args) => {
            let password = read_password(args.password)?;
            let registration = Registration {
                email: args.email,
                username: args.username,
                password,
                first_name: args.first_name,
                last_name: args.last_name,
            };
            let result = with_manual_retry(interactive, || client.register(&registration)).await;
            remember_session(&tokens, result, &out)
        }
        Commands::Login(args) => {
            let password = read_password(args.password)?;
            let credentials = Credentials::new(&args.identifier, password);
            let result = with_manual_retry(interactive, || client.login(&credentials)).await;
            remember_session(&tokens, result, &out)
        }
        Commands::Whoami => with_manual_retry(interactive, || client.current_user())
            .await
            .map(|r| out.message(&r, &format!("{} <{}>", r.user.username, r.user.email))),
        Commands::Logout => {
            let result = client.logout().await;
            tokens.clear().context("Failed to clear session")?;
            result.map(|r| out.message(&r, "Logged out"))
        }
        Commands::Health => with_manual_retry(interactive, || client.health())
            .await
            .map(|r| out.message(&r, &format!("{} {} ({})", r.service, r.version, r.status))),
        Commands::Cache { action } => {
            match action {
                CacheAction::Stats => {
                    let stats = client.cache_stats().await;
                    let mut text = stats
                        .entries
                        .iter()
                        .map(|(slot, count)| format!("{slot}: {count}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !stats.enabled {
                        text.push_str("\n(cache disabled)");
                    }
                    out.message(&stats, &text);
                }
                CacheAction::Clear => {
                    client.clear_caches().await;
                    out.message(&serde_json::json!({"cleared": true}), "Cache cleared");
                }
            }
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, &out);
            ExitCode::FAILURE
        }
    })
}

async fn search(
    client: &ApiClient,
    args: &SearchArgs,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    let fetched =
        with_manual_retry(interactive, || client.search_items(&args.query, args.limit)).await?;
    out.fetched(&fetched, |response| {
        let mut text = format!("{} results for {:?}\n", response.total, response.query);
        for (i, result) in response.results.iter().enumerate() {
            text.push_str(&format_result(i + 1, result));
        }
        text
    });

    if let Some(position) = args.save {
        let Some(result) = position
            .checked_sub(1)
            .and_then(|i| fetched.data.results.get(i))
        else {
            eprintln!("No result at position {position}");
            return Ok(());
        };
        let item = NewSavedItem::from(result);
        let response = client.save_item(&item).await?;
        out.message(&response, &response.message);
    }
    Ok(())
}

async fn saved(
    client: &ApiClient,
    action: SavedAction,
    out: &Output,
    interactive: bool,
) -> Result<(), ClassifiedError> {
    match action {
        SavedAction::List => {
            let fetched = with_manual_retry(interactive, || client.get_saved_items()).await?;
            out.fetched(&fetched, |response| {
                let mut text = format!("{} saved items\n", response.total);
                for item in &response.items {
                    text.push_str(&format_saved(item));
                }
                text
            });
        }
        SavedAction::Get { id } => {
            let item = with_manual_retry(interactive, || client.get_saved_item(&id)).await?;
            out.message(&item, format_saved(&item).trim_end());
        }
        SavedAction::Add {
            id,
            title,
            price,
            currency,
            url,
            condition,
            notes,
        } => {
            let item = NewSavedItem {
                item_id: id,
                title,
                price,
                currency,
                image_url: None,
                item_url: url,
                condition,
                location: None,
                notes,
            };
            let response = with_manual_retry(interactive, || client.save_item(&item)).await?;
            out.message(&response, &response.message);
        }
        SavedAction::Update {
            id,
            title,
            price,
            condition,
            location,
            notes,
        } => {
            let update = SavedItemUpdate {
                title,
                price,
                condition,
                location,
                notes,
            };
            if update.is_empty() {
                eprintln!("Nothing to update");
                return Ok(());
            }
            let response =
                with_manual_retry(interactive, || client.update_saved_item(&id, &update)).await?;
            out.message(&response, &response.message);
        }
        SavedAction::Remove { id } => {
            let response =
                with_manual_retry(interactive, || client.delete_saved_item(&id)).await?;
            out.message(&response, &response.message);
        }
    }
    Ok(())
}

/// Run `operation`; on a retryable failure offer the user up to three manual retries.
async fn with_manual_retry<T, F, Fut>(interactive: bool, mut operation: F) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    let mut last = match operation().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let mut state = ErrorPresentationState::new();
    state.set_error(last.clone());

    loop {
        if !interactive || !state.can_retry() {
            if state.max_retries_reached() {
                eprintln!("Maximum retries reached.");
            }
            return Err(last);
        }

        eprintln!("{last}");
        if !confirm(&format!(
            "Retry? ({}/{MAX_MANUAL_RETRIES}) [y/N] ",
            state.retry_count() + 1
        )) {
            return Err(last);
        }

        match state.retry(|| operation()).await {
            Some(Ok(value)) => return Ok(value),
            Some(Err(err)) => last = err,
            None => return Err(last),
        }
    }
}

fn remember_session(
    tokens: &TokenStore,
    result: Result<AuthResponse, ClassifiedError>,
    out: &Output,
) -> Result<(), ClassifiedError> {
    let response = result?;
    if let Err(e) = tokens.save(&StoredSession::from_auth(&response)) {
        warn!("Failed to persist session: {e}");
    }
    out.message(
        &serde_json::json!({ "user": response.user, "status": response.status }),
        &format!("Logged in as {}", response.user.username),
    );
    Ok(())
}

fn open_storage(config: &Config) -> Arc<dyn KeyValueStorage> {
    match SqliteStorage::open(&config.cache_db_path()) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            warn!("Cache database unavailable, caching in memory only: {e}");
            Arc::new(MemoryStorage::new())
        }
    }
}

fn show_config(action: &ConfigAction) -> Result<ExitCode> {
    match action {
        ConfigAction::Path => println!("{}", Config::config_dir().join("config.toml").display()),
        ConfigAction::Show => {
            let config = Config::load().context("Failed to load config")?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) {
    if std::env::var("FLIPLENS_LOG").is_ok() {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create("fliplens.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = tracing_subscriber::EnvFilter::new("fliplens=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file: {err}");
            }
        }
    } else if verbose {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .try_init();
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .try_init();
    }
}

fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given.or_else(|| std::env::var("FLIPLENS_PASSWORD").ok()) {
        return Ok(password);
    }
    if io::stdin().is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(prompt: &str) -> bool {
    eprint!("{prompt}");
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn report_error(err: &ClassifiedError, out: &Output) {
    if out.json {
        if let Ok(json) = serde_json::to_string_pretty(err) {
            eprintln!("{json}");
        }
        return;
    }
    eprintln!("Error: {err}");
    if let Some(details) = &err.raw_details {
        eprintln!("  {details}");
    }
}

fn format_result(position: usize, result: &SearchResult) -> String {
    let confidence = result
        .confidence
        .map(|c| format!("  [{:.0}%]", c * 100.0))
        .unwrap_or_default();
    format!(
        "{position:>3}. {} {:<4} {}  ({}, {}){confidence}\n",
        result.price, result.currency, result.title, result.condition, result.item_id
    )
}

fn format_saved(item: &SavedItem) -> String {
    let notes = if item.notes.is_empty() {
        String::new()
    } else {
        format!("  - {}", item.notes)
    };
    format!(
        "{}  {} {}  {}{notes}\n",
        item.id, item.price, item.currency, item.title
    )
}

struct Output {
    json: bool,
}

impl Output {
    fn message<T: Serialize>(&self, value: &T, text: &str) {
        if self.json {
            print_json(value);
        } else {
            println!("{text}");
        }
    }

    fn fetched<T: Serialize>(&self, fetched: &Fetched<T>, render: impl FnOnce(&T) -> String) {
        if fetched.cached {
            eprintln!("(cached) Backend unreachable, showing saved results.");
        }
        if self.json {
            print_json(fetched);
        } else {
            print!("{}", render(&fetched.data));
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to render JSON: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use std::cell::Cell;

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from(["fliplens", "search", "iPhone 12", "-l", "5"]).unwrap();
        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query, "iPhone 12");
        assert_eq!(args.limit, 5);
        assert_eq!(args.save, None);
    }

    #[test]
    fn test_parse_saved_update() {
        let cli = Cli::try_parse_from([
            "fliplens", "--json", "saved", "update", "v1", "--notes", "relist",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Saved {
            action: SavedAction::Update { id, notes, price, .. },
        } = cli.command
        else {
            panic!("expected saved update");
        };
        assert_eq!(id, "v1");
        assert_eq!(notes.as_deref(), Some("relist"));
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn test_non_interactive_failure_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_manual_retry(false, || {
            calls.set(calls.get() + 1);
            async { Err(ClassifiedError::new(ErrorKind::Server)) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Server);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let result = with_manual_retry(true, || async { Ok::<_, ClassifiedError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn test_format_result_line() {
        let result = SearchResult {
            item_id: "v1".into(),
            title: "iPhone 12".into(),
            price: "199.99".into(),
            currency: "USD".into(),
            gallery_url: String::new(),
            view_item_url: String::new(),
            condition: "Used".into(),
            location: String::new(),
            confidence: Some(0.83),
        };
        assert_eq!(
            format_result(1, &result),
            "  1. 199.99 USD  iPhone 12  (Used, v1)  [83%]\n"
        );
    }
}
