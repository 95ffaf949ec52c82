use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing message about a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub level: Level,
    pub category: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: Level, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Receiver of run notices. Implementations must not block and may drop
/// anything they like.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Which notices reach the wrapped notifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoticeFilterConfig {
    pub min_level: Level,
    pub suppressed_categories: HashSet<String>,
}

impl Default for NoticeFilterConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            suppressed_categories: HashSet::new(),
        }
    }
}

pub struct NoticeFilter {
    config: NoticeFilterConfig,
    inner: Arc<dyn Notifier>,
}

impl NoticeFilter {
    pub fn new(config: NoticeFilterConfig, inner: Arc<dyn Notifier>) -> Self {
        Self { config, inner }
    }

    pub fn allows(&self, notice: &Notice) -> bool {
        notice.level >= self.config.min_level
            && !self.config.suppressed_categories.contains(&notice.category)
    }
}

impl Notifier for NoticeFilter {
    fn notify(&self, notice: &Notice) {
        if self.allows(notice) {
            self.inner.notify(notice);
        }
    }
}

/// Writes notices to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            Level::Info | Level::Success => {
                tracing::info!(category = %notice.category, "{}", notice.message)
            }
            Level::Warning => tracing::warn!(category = %notice.category, "{}", notice.message),
            Level::Error => tracing::error!(category = %notice.category, "{}", notice.message),
        }
    }
}
