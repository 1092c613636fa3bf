#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use widgetboard::binder::options::{AccountOption, build_options};
use widgetboard::binder::unbind::UnbindPrompt;
use widgetboard::binder::{AccountBinder, FetchOutcome};
use widgetboard::compat::WidgetKind;
use widgetboard::config::{ClientConfig, ConfigError};
use widgetboard::error::{BoardError, ErrorCode};
use widgetboard::layout::{ParseRowTypeError, RowType};
use widgetboard::model::{Board, RowId, WidgetId};
use widgetboard::remote::http::HttpRemoteStore;
use widgetboard::remote::memory::MemoryRemote;
use widgetboard::remote::{AccountSource, RemoteError, RemoteStore, SessionGate};
use widgetboard::store::BoardStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("[{}] {}", .0.error_code(), .0)]
    Board(#[from] BoardError),
    #[error("no {kind} account with id {account_id}")]
    UnknownAccount { kind: WidgetKind, account_id: i64 },
    #[error("could not load accounts: {0}")]
    Listing(String),
    #[error("failed to read confirmation: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "widgetboard", about = "Widget board dashboard client")]
struct Cli {
    #[arg(long, env = "WIDGETBOARD_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "WIDGETBOARD_SESSION_COOKIE")]
    session_cookie: Option<String>,

    /// Run against a seeded in-memory board instead of the server.
    #[arg(long, default_value_t = false)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board.
    Show {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Append a row of type 1, 2a, 2b or 3.
    AddRow {
        #[arg(value_parser = parse_row_type)]
        row_type: RowType,
    },
    /// Delete a row with no bound widgets.
    DeleteRow { row_id: i64 },
    /// List linked accounts a widget kind can show.
    Accounts { kind: WidgetKind },
    /// Bind a placeholder widget to a kind and account.
    Bind {
        widget_id: i64,
        kind: WidgetKind,
        account_id: i64,
    },
    /// Return a bound widget to a placeholder.
    Unbind {
        widget_id: i64,
        /// Skip the confirmation prompt.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Report whether the session is signed in.
    Whoami,
    Logout,
}

fn parse_row_type(raw: &str) -> Result<RowType, ParseRowTypeError> {
    raw.parse()
}

/// The three ports, backed by one remote.
struct Backend {
    store: Arc<dyn RemoteStore>,
    accounts: Arc<dyn AccountSource>,
    session: Arc<dyn SessionGate>,
}

impl Backend {
    fn new<T: RemoteStore + AccountSource + SessionGate + 'static>(remote: T) -> Self {
        let remote = Arc::new(remote);
        Self { store: remote.clone(), accounts: remote.clone(), session: remote }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    silence_cancelled(run(Cli::parse()).await)
}

/// Cancelled operations end the command without an error report.
fn silence_cancelled(result: Result<(), CliError>) -> Result<(), CliError> {
    match result {
        Err(CliError::Board(e)) if !e.is_user_visible() => {
            debug!(error = %e, "command cancelled");
            Ok(())
        }
        other => other,
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::from_lookup(|key| match key {
        "WIDGETBOARD_BASE_URL" => cli.base_url.clone(),
        "WIDGETBOARD_SESSION_COOKIE" => cli.session_cookie.clone(),
        _ => std::env::var(key).ok(),
    })?;

    let backend = if cli.demo {
        Backend::new(MemoryRemote::demo())
    } else {
        Backend::new(HttpRemoteStore::new(&config)?)
    };

    match cli.command {
        Command::Whoami => run_whoami(&backend).await,
        Command::Logout => {
            backend.session.logout().await?;
            println!("signed out");
            Ok(())
        }
        command => {
            let store = BoardStore::new(Arc::clone(&backend.store));
            store.load().await?;
            run_board(&store, &backend, &config, command).await
        }
    }
}

async fn run_whoami(backend: &Backend) -> Result<(), CliError> {
    if backend.session.is_authenticated().await {
        println!("signed in");
    } else {
        println!("not signed in");
    }
    Ok(())
}

async fn run_board(store: &BoardStore, backend: &Backend, config: &ClientConfig, command: Command) -> Result<(), CliError> {
    match command {
        Command::Show { json } => {
            let board = store.board().unwrap_or_default();
            if json {
                println!("{}", serde_json::to_string_pretty(&board)?);
            } else {
                print_board(&board);
            }
        }
        Command::AddRow { row_type } => {
            let row = store.add_row(row_type).await?;
            println!("added {} ({row_type}, {} widgets)", row.id, row.widgets.len());
        }
        Command::DeleteRow { row_id } => {
            let row_id = RowId::new(row_id);
            store.delete_row(row_id).await?;
            println!("deleted {row_id}");
        }
        Command::Accounts { kind } => {
            let listing = backend.accounts.list_accounts().await?;
            for option in build_options(kind, &listing) {
                println!("{}", describe_option(&option));
            }
        }
        Command::Bind { widget_id, kind, account_id } => {
            let binder =
                AccountBinder::new(store.clone(), Arc::clone(&backend.accounts), WidgetId::new(widget_id), config.binder())?;
            let option = fetch_options(&binder, kind)
                .await?
                .into_iter()
                .find(|o| o.account.account_id == account_id)
                .ok_or(CliError::UnknownAccount { kind, account_id })?;
            binder.select_account(option.account)?;
            let widget = binder.submit().await?;
            println!("bound {} to {kind} ({})", widget.id, option.label());
            binder.finish().await;
        }
        Command::Unbind { widget_id, yes } => {
            let mut prompt = UnbindPrompt::new(store.clone(), WidgetId::new(widget_id))?;
            if yes || confirm(&format!("Unbind {}?", prompt.widget().id))? {
                let widget = prompt.confirm().await?;
                println!("unbound {}", widget.id);
            } else {
                prompt.cancel();
                println!("cancelled");
            }
        }
        Command::Whoami | Command::Logout => {}
    }
    Ok(())
}

async fn fetch_options(binder: &AccountBinder, kind: WidgetKind) -> Result<Vec<AccountOption>, CliError> {
    match binder.choose_kind(kind).await? {
        FetchOutcome::Applied => Ok(binder.options().unwrap_or_default()),
        FetchOutcome::Failed(message) => Err(CliError::Listing(message)),
        FetchOutcome::Superseded | FetchOutcome::Cancelled => Err(BoardError::Cancelled.into()),
    }
}

fn describe_option(option: &AccountOption) -> String {
    let mut line = format!("{:>6}  {}", option.account.account_id, option.label());
    if let Some(masked) = option.masked() {
        line.push_str("  ");
        line.push_str(&masked);
    }
    if let Some(added) = option.added() {
        line.push_str("  ");
        line.push_str(&added);
    }
    line
}

fn print_board(board: &Board) {
    if board.rows.is_empty() {
        println!("(empty board)");
        return;
    }
    for row in &board.rows {
        println!("{} type {} order {}", row.id, row.row_type, row.sort_order);
        for widget in &row.widgets {
            match widget.kind {
                Some(kind) => {
                    let accounts: Vec<String> = widget.linked_accounts.iter().map(ToString::to_string).collect();
                    println!("  {} col {}  {kind}  [{}]", widget.id, widget.column_type, accounts.join(", "));
                }
                None => println!("  {} col {}  (placeholder)", widget.id, widget.column_type),
            }
        }
    }
}

fn confirm(question: &str) -> Result<bool, CliError> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
