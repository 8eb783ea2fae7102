//! Conversation engine adapter contract
//!
//! The controller never talks to a model directly. It configures and observes
//! an implementation of [`ConversationEngine`], which owns the conversation
//! text, the open task records, and the "current task" signal, and exposes
//! each of them as a read-only observable stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::observable::ReadOnlyObservable;
use crate::task::TaskProgress;

/// Options pushed into an engine by its owner
#[derive(Clone, Default)]
pub struct EngineOptions {
    /// Model identifier used for completions
    pub default_model: String,

    /// Optional document retrieval hook run before each completion
    pub retriever: Option<Arc<dyn Retriever>>,
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("default_model", &self.default_model)
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

/// A document returned by a [`Retriever`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Retrieval callback an engine may consult before answering
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>>;
}

/// The engine adapter a conversation controller owns.
///
/// Implementations must make `dispose` idempotent and must not publish
/// further changes once disposed.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    /// Apply options; they take effect on the next operation
    fn configure(&self, options: EngineOptions);

    /// Replace the seed template. Fails with a configuration error if invalid.
    fn set_template(&self, template: &str) -> Result<()>;

    /// Discard messages and open tasks, returning to the seed template
    async fn clear(&self) -> Result<()>;

    /// Submit user input; resolves once the reply (or failure) is known
    async fn append_user_message(&self, text: &str) -> Result<()>;

    fn conversation(&self) -> ReadOnlyObservable<Conversation>;

    fn open_tasks(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>>;

    /// Name of the lower-level operation in progress, if any
    fn current_task(&self) -> ReadOnlyObservable<Option<String>>;

    /// Whether the UI should show the raw conversation source
    fn show_source(&self) -> ReadOnlyObservable<bool>;

    fn set_show_source(&self, show: bool);

    fn dispose(&self);
}

/// Sender of a conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    fn from_header(name: &str) -> Self {
        match name {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Conversation text in `> role` block format plus its parsed messages.
///
/// ```text
/// > system
/// You are a helpful assistant
///
/// > user
/// Hello
/// ```
///
/// `> nop` blocks and `//` comment lines are kept in the source but are not
/// turned into messages. Content lines that would read as a header or a
/// comment are written with a leading `\`, which parsing removes again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub source: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn parse(source: &str) -> Self {
        let mut messages = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in source.lines() {
            if let Some(name) = header_name(line) {
                if let Some((role, lines)) = current.take() {
                    push_block(&mut messages, &role, &lines);
                }
                current = Some((name.to_string(), Vec::new()));
            } else if line.trim_start().starts_with("//") {
                continue;
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            }
        }
        if let Some((role, lines)) = current {
            push_block(&mut messages, &role, &lines);
        }

        Self {
            source: source.to_string(),
            messages,
        }
    }

    /// Return a new conversation with a block appended to the source
    pub fn append(&self, role: Role, content: &str) -> Self {
        let mut source = self.source.trim_end().to_string();
        if !source.is_empty() {
            source.push_str("\n\n");
        }
        source.push_str("> ");
        source.push_str(role.as_str());
        source.push('\n');
        for line in content.trim().lines() {
            source.push_str(&escape_line(line));
            source.push('\n');
        }
        Self::parse(&source)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Short one-line preview of where the user's part of the conversation
    /// starts, used in session listings. Returns `-` when there is none.
    pub fn user_preview(&self) -> String {
        const PREVIEW_CHARS: usize = 80;

        let source = self.source.as_str();
        let search_from = source.find("\n> nop").unwrap_or(0);
        let Some(offset) = source[search_from..].find("\n> user") else {
            return "-".to_string();
        };
        let start = search_from + offset;
        let window: String = source[start..].chars().take(PREVIEW_CHARS).collect();

        window
            .lines()
            .filter(|line| {
                let line = line.trim();
                !line.starts_with('>') && !line.starts_with('@')
            })
            .map(unescape_line)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

fn header_name(line: &str) -> Option<&str> {
    let name = line.strip_prefix('>')?.trim();
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Some(name)
    } else {
        None
    }
}

/// Whether a line, ignoring leading backslashes, would parse as a header
/// or a comment
fn needs_escape(line: &str) -> bool {
    let rest = line.trim_start_matches('\\');
    rest.starts_with('>') || rest.trim_start().starts_with("//")
}

fn escape_line(line: &str) -> Cow<'_, str> {
    if needs_escape(line) {
        Cow::Owned(format!("\\{}", line))
    } else {
        Cow::Borrowed(line)
    }
}

fn unescape_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if needs_escape(rest) => rest,
        _ => line,
    }
}

fn push_block(messages: &mut Vec<Message>, role: &str, lines: &[&str]) {
    if role == "nop" {
        return;
    }
    let content = lines
        .iter()
        .map(|line| unescape_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if content.is_empty() {
        return;
    }
    messages.push(Message::new(Role::from_header(role), content));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_template() {
        let convo = Conversation::parse("> system\nHello");
        assert_eq!(convo.messages, vec![Message::new(Role::System, "Hello")]);
        assert_eq!(convo.source, "> system\nHello");
    }

    #[test]
    fn test_parse_multiple_blocks_and_comments() {
        let source = "> system\nBe brief\n// internal note\n\n> nop\n// ==== END ====\n\n> user\nHi there\n\n> assistant\nHello!\nHow can I help?";
        let convo = Conversation::parse(source);
        assert_eq!(
            convo.messages,
            vec![
                Message::new(Role::System, "Be brief"),
                Message::new(Role::User, "Hi there"),
                Message::new(Role::Assistant, "Hello!\nHow can I help?"),
            ]
        );
    }

    #[test]
    fn test_text_before_first_header_is_ignored() {
        let convo = Conversation::parse("stray text\n> user\nquestion");
        assert_eq!(convo.messages.len(), 1);
        assert_eq!(convo.messages[0].role, Role::User);
    }

    #[test]
    fn test_quoted_lines_are_not_headers() {
        let convo = Conversation::parse("> user\nwhat does\n> this: mean?\n> quoted reply here\nthanks");
        assert_eq!(convo.messages.len(), 1);
        assert!(convo.messages[0].content.contains("> this: mean?"));
        assert!(convo.messages[0].content.contains("> quoted reply here"));
    }

    #[test]
    fn test_append_adds_block() {
        let convo = Conversation::parse("> system\nHello");
        let next = convo.append(Role::User, "  Add milk to my list  ");
        assert_eq!(next.source, "> system\nHello\n\n> user\nAdd milk to my list\n");
        assert_eq!(next.last_message(), Some(&Message::new(Role::User, "Add milk to my list")));
    }

    #[test]
    fn test_quote_and_comment_lines_survive_append() {
        let convo = Conversation::parse("> system\nHi");
        let reply = "Do these:\n> Note\nbuy milk first\n// not a comment\n\\> literal";
        let next = convo
            .append(Role::User, "> done")
            .append(Role::Assistant, reply);

        assert_eq!(
            next.messages,
            vec![
                Message::new(Role::System, "Hi"),
                Message::new(Role::User, "> done"),
                Message::new(Role::Assistant, reply),
            ]
        );
        assert!(next.source.contains("\n\\> Note\n"));
        assert_eq!(Conversation::parse(&next.source), next);
    }

    #[test]
    fn test_escaping_is_reversible() {
        for line in ["> a", "\\> a", "\\\\> a", "  // b", "\\ // b", "\\plain", "plain", ""] {
            assert_eq!(unescape_line(&escape_line(line)), line);
        }
    }

    #[test]
    fn test_unknown_roles_are_kept() {
        let convo = Conversation::parse("> define\nname = \"todo\"");
        assert_eq!(convo.messages[0].role, Role::Other("define".to_string()));
    }

    #[test]
    fn test_user_preview() {
        let convo = Conversation::parse("> system\nsecret\n> nop\n\n> user\nPlan my week please");
        assert_eq!(convo.user_preview(), "Plan my week please");

        let empty = Conversation::parse("> system\nonly system");
        assert_eq!(empty.user_preview(), "-");
    }
}
