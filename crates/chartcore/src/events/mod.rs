mod base;
mod notify;

pub use base::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, NodeEvent};
pub use notify::{Level, Notice, NoticeFilter, NoticeFilterConfig, Notifier, TracingNotifier};
