//! Scripted support-chat widget: a two-state topic dispatcher.
//!
//! No branching dialogue and no external calls. Selecting a topic moves the
//! widget into `Conversation` and appends a user turn plus the canned bot
//! reply keyed by topic id; "more topics" returns to the topic list.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "worknest-chat";

/// How long the UI waits before surfacing the bot turn, so the canned reply
/// reads as typed rather than instantaneous. The widget state itself is
/// updated synchronously; the delay is purely presentational.
pub const BOT_REPLY_DELAY: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    TopicList,
    Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// One scripted topic: the label the user picks and the canned reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTopic {
    pub id: String,
    pub label: String,
    pub reply: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TopicsFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    topics: Vec<ChatTopic>,
}

/// Registry of scripted topics, loaded once from `topics.yaml`.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    order: Vec<String>,
    by_id: BTreeMap<String, ChatTopic>,
}

impl TopicRegistry {
    pub fn new(topics: Vec<ChatTopic>) -> Self {
        let order = topics.iter().map(|t| t.id.clone()).collect();
        let by_id = topics.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { order, by_id }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: TopicsFile =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(file.topics))
    }

    pub fn get(&self, id: &str) -> Option<&ChatTopic> {
        self.by_id.get(id)
    }

    /// Topics in the order the registry file lists them.
    pub fn topics(&self) -> impl Iterator<Item = &ChatTopic> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Local widget state machine. Owned by whoever renders the widget; it has
/// no persistence and no side effects.
#[derive(Debug, Clone)]
pub struct ChatWidget {
    state: ChatState,
    transcript: Vec<ChatTurn>,
}

impl Default for ChatWidget {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatWidget {
    pub fn new() -> Self {
        Self {
            state: ChatState::TopicList,
            transcript: Vec::new(),
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// Transitions to `Conversation`, appending the user's topic pick and
    /// the canned bot reply. Unknown topic ids leave the widget untouched.
    pub fn select_topic<'r>(
        &mut self,
        registry: &'r TopicRegistry,
        topic_id: &str,
    ) -> Option<&'r ChatTopic> {
        let topic = registry.get(topic_id)?;
        let now = Utc::now();
        self.transcript.push(ChatTurn {
            speaker: Speaker::User,
            text: topic.label.clone(),
            at: now,
        });
        self.transcript.push(ChatTurn {
            speaker: Speaker::Bot,
            text: topic.reply.clone(),
            at: now,
        });
        self.state = ChatState::Conversation;
        Some(topic)
    }

    /// Returns to the topic list. The transcript survives so reopening the
    /// conversation shows prior turns.
    pub fn more_topics(&mut self) {
        self.state = ChatState::TopicList;
    }
}
