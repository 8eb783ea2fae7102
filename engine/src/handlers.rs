//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: interactive conversation with the assistant
//! - sessions: list saved chat sessions
//! - todo: manage the todo list
//! - config show: print the active configuration

use anyhow::{Context, Result};
use sdk::errors::{ConvoError, ConvoErrorExt};
use sdk::store::RecordStore;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::TodoAction;
use crate::config::Config;
use crate::controller::{list_sessions, ConvoCtrl, ConvoCtrlOptions};
use crate::conversation::DEFAULT_TEMPLATE;
use crate::db::Database;
use crate::presenter;
use crate::todos::{CreateTodo, Todo, TodoService, UpdateTodo};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// A line typed into the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Reset,
    Save,
    ToggleSource,
    Export(Option<PathBuf>),
    Copy,
    Quit,
    Help,
    Unknown(String),
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (command, None),
        };
        match name {
            "reset" => Self::Reset,
            "save" => Self::Save,
            "source" => Self::ToggleSource,
            "export" => Self::Export(arg.map(PathBuf::from)),
            "copy" => Self::Copy,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            other => Self::Unknown(other.to_string()),
        }
    }
}

const CHAT_HELP: &str = "Commands: /reset /save /source /export [PATH] /copy /quit";

async fn open_store(config: &Config) -> Result<(Database, Arc<dyn RecordStore>)> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn RecordStore> = Arc::new(database.kv());
    Ok((database, store))
}

fn resolve_template(template: Option<&Path>, config: &Config) -> Result<String> {
    if let Some(path) = template {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()));
    }
    Ok(config
        .load_template()?
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()))
}

fn default_export_path(session_id: Option<&str>) -> PathBuf {
    match session_id {
        Some(id) => PathBuf::from(format!("convo-{}.convo", id)),
        None => PathBuf::from(format!(
            "convo-{}.convo",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        )),
    }
}

fn print_error(err: &ConvoError, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            eprintln!("error: {}", err);
            eprintln!("hint: {}", err.user_hint());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({"error": err.to_string(), "hint": err.user_hint()})
            );
        }
    }
}

/// Print messages added since the last call
fn print_new_messages(ctrl: &ConvoCtrl, printed: &mut usize, format: OutputFormat) {
    let conversation = ctrl.conversation().get();
    let fresh = conversation.messages.iter().skip(*printed);
    for message in fresh.filter(|m| presenter::is_displayed(m)) {
        match format {
            OutputFormat::Text => println!("{}", presenter::render_message(message)),
            OutputFormat::Json => println!("{}", json!(message)),
        }
    }
    *printed = conversation.messages.len();
}

/// Interactive chat session
pub async fn handle_chat(
    template: Option<PathBuf>,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (database, store) = open_store(config).await?;
    let result = run_chat(template, session, config, format, store).await;

    // Close on every path, but report the chat error first
    let closed = database.close().await;
    result?;
    closed?;
    Ok(())
}

async fn run_chat(
    template: Option<PathBuf>,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
    store: Arc<dyn RecordStore>,
) -> Result<()> {
    let completion = crate::llm::from_config(&config.completion)?;
    tracing::info!("Using {} completion provider", completion.name());

    let options = ConvoCtrlOptions {
        template: Some(resolve_template(template.as_deref(), config)?),
        session_id: session,
        store: Some(store),
        retriever: None,
    };
    let ctrl = ConvoCtrl::local(options, completion);
    ctrl.init().await?;

    // Status area goes to stderr so stdout stays a clean transcript
    let _status = ctrl.visible_tasks().subscribe(|tasks| {
        for task in tasks {
            eprintln!("{}", presenter::render_task(task));
        }
    });

    let mut printed = 0;
    if matches!(format, OutputFormat::Text) {
        println!("{}", CHAT_HELP);
    }
    print_new_messages(&ctrl, &mut printed, format);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ChatInput::parse(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::Help => println!("{}", CHAT_HELP),
            ChatInput::Unknown(name) => println!("Unknown command /{}. {}", name, CHAT_HELP),

            ChatInput::Message(text) => {
                if let Err(e) = ctrl.append_user_message(&text).await {
                    print_error(&e, format);
                }
                print_new_messages(&ctrl, &mut printed, format);
            }

            ChatInput::Reset => match ctrl.reset_session().await {
                Ok(()) => {
                    println!("Session reset.");
                    printed = 0;
                    print_new_messages(&ctrl, &mut printed, format);
                }
                Err(e) => print_error(&e, format),
            },

            ChatInput::Save => match ctrl.save_session().await {
                Ok(id) => println!("Saved session {}", id),
                Err(e) => print_error(&e, format),
            },

            ChatInput::ToggleSource => {
                let show = !ctrl.show_source().get();
                ctrl.set_show_source(show);
                if show {
                    println!("{}", ctrl.transcript());
                } else {
                    println!("Source view off.");
                }
            }

            ChatInput::Export(path) => {
                let path =
                    path.unwrap_or_else(|| default_export_path(ctrl.session_id().get().as_deref()));
                match tokio::fs::write(&path, ctrl.transcript()).await {
                    Ok(()) => println!("Exported to {}", path.display()),
                    Err(e) => println!("Export failed: {}", e),
                }
            }

            ChatInput::Copy => match presenter::copy_to_clipboard(&ctrl.transcript()) {
                Ok(()) => println!("Conversation copied to clipboard."),
                Err(e) => println!("Copy failed: {:#}", e),
            },
        }
    }

    ctrl.dispose();
    Ok(())
}

/// List saved chat sessions
pub async fn handle_sessions(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, store) = open_store(config).await?;
    let sessions = list_sessions(store.as_ref())
        .await
        .context("Failed to read saved sessions")?;
    let shown: Vec<_> = sessions.into_iter().take(limit).collect();

    match format {
        OutputFormat::Text => {
            if shown.is_empty() {
                println!("No saved sessions");
            } else {
                let now = chrono::Utc::now();
                println!("Saved sessions (last {}):", limit);
                println!();
                for session in &shown {
                    println!("Session ID: {}", session.id);
                    println!("  Updated: {}", presenter::time_since(&session.updated_at, now));
                    println!("  Preview: {}", session.preview);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": shown,
                "count": shown.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

fn print_todo(todo: &Todo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let mark = if todo.completed { "x" } else { " " };
            println!("[{}] {}  {}", mark, todo.title, todo.id);
            if !todo.description.is_empty() {
                println!("    {}", todo.description);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(todo)?),
    }
    Ok(())
}

/// Manage the todo list
pub async fn handle_todo(action: TodoAction, config: &Config, format: OutputFormat) -> Result<()> {
    let (database, store) = open_store(config).await?;
    let todos = TodoService::new(store);

    match action {
        TodoAction::List => {
            let list = todos.list().await?;
            match format {
                OutputFormat::Text if list.is_empty() => println!("No todos"),
                OutputFormat::Text => {
                    for todo in &list {
                        print_todo(todo, format)?;
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&list)?),
            }
        }
        TodoAction::Add { title, description } => {
            let todo = todos.create(CreateTodo { title, description }).await?;
            print_todo(&todo, format)?;
        }
        TodoAction::Show { id } => print_todo(&todos.get(&id).await?, format)?,
        TodoAction::Done { id } => {
            let todo = todos
                .update(UpdateTodo {
                    id,
                    completed: Some(true),
                    ..Default::default()
                })
                .await?;
            print_todo(&todo, format)?;
        }
        TodoAction::Edit {
            id,
            title,
            description,
            completed,
        } => {
            let todo = todos
                .update(UpdateTodo {
                    id,
                    title,
                    description,
                    completed,
                })
                .await?;
            print_todo(&todo, format)?;
        }
        TodoAction::Remove { id } => {
            todos.delete(&id).await?;
            match format {
                OutputFormat::Text => println!("Removed {}", id),
                OutputFormat::Json => println!("{}", json!({"success": true, "id": id})),
            }
        }
    }

    database.close().await?;
    Ok(())
}

/// Print the active configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
