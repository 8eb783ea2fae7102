//! Todo list service
//!
//! The whole list lives in a single record named `todos`. Every mutation
//! reads the list, edits it, and writes it back.

use chrono::Utc;
use sdk::errors::{ConvoError, Result};
use sdk::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Record key holding the todo list
pub const TODOS_KEY: &str = "todos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTodo {
    pub title: String,
    pub description: Option<String>,
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateTodo {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

pub struct TodoService {
    store: Arc<dyn RecordStore>,
}

impl TodoService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Todo>> {
        match self.store.get(TODOS_KEY).await? {
            Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Todo> {
        self.list()
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, input: CreateTodo) -> Result<Todo> {
        let title = required_title(&input.title)?;
        let now = timestamp();
        let todo = Todo {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description: input.description.unwrap_or_default(),
            completed: false,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut todos = self.list().await?;
        todos.push(todo.clone());
        self.save(&todos).await?;

        info!("Created todo {}", todo.id);
        Ok(todo)
    }

    pub async fn update(&self, input: UpdateTodo) -> Result<Todo> {
        if input.id.trim().is_empty() {
            return Err(ConvoError::Validation("ID is required".to_string()));
        }
        let title = input.title.as_deref().map(required_title).transpose()?;

        let mut todos = self.list().await?;
        let todo = todos
            .iter_mut()
            .find(|t| t.id == input.id)
            .ok_or_else(|| not_found(&input.id))?;

        if let Some(title) = title {
            todo.title = title;
        }
        if let Some(description) = input.description {
            todo.description = description;
        }
        if let Some(completed) = input.completed {
            todo.completed = completed;
        }
        todo.updated_at = timestamp();
        let updated = todo.clone();

        self.save(&todos).await?;
        debug!("Updated todo {}", updated.id);
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut todos = self.list().await?;
        let before = todos.len();
        todos.retain(|t| t.id != id);
        if todos.len() == before {
            return Err(not_found(id));
        }

        self.save(&todos).await?;
        info!("Deleted todo {}", id);
        Ok(())
    }

    async fn save(&self, todos: &[Todo]) -> Result<()> {
        self.store.put(TODOS_KEY, serde_json::to_value(todos)?).await
    }
}

fn required_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ConvoError::Validation("Title is required".to_string()));
    }
    Ok(title.to_string())
}

fn not_found(id: &str) -> ConvoError {
    ConvoError::NotFound(format!("todo {}", id))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}
