use crate::error::{LibError, Result};
use crate::types::LogLevel;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static INIT: Once = Once::new();

const LOG_BUFFER_SIZE: usize = 2000;

/// Recent formatted log lines, readable by the host app through `get_recent_logs`
static LOG_BUFFER: once_cell::sync::Lazy<Arc<Mutex<LogBuffer>>> =
    once_cell::sync::Lazy::new(|| Arc::new(Mutex::new(LogBuffer::new(LOG_BUFFER_SIZE))));

/// Bounded FIFO of log lines
pub struct LogBuffer {
    logs: VecDeque<String>,
    max_size: usize,
}

impl LogBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            logs: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, log: String) {
        if self.logs.len() >= self.max_size {
            self.logs.pop_front();
        }
        self.logs.push_back(log);
    }

    /// Last `count` lines, oldest first. Zero means all.
    pub fn get_logs(&self, count: usize) -> Vec<String> {
        if count == 0 || count >= self.logs.len() {
            return self.logs.iter().cloned().collect();
        }
        let start = self.logs.len() - count;
        self.logs.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }
}

pub fn get_recent_logs(count: usize) -> Vec<String> {
    if let Ok(buffer) = LOG_BUFFER.lock() {
        buffer.get_logs(count)
    } else {
        vec![]
    }
}

pub fn clear_logs() {
    if let Ok(mut buffer) = LOG_BUFFER.lock() {
        buffer.clear();
    }
}

pub fn add_log(message: String) {
    if let Ok(mut buffer) = LOG_BUFFER.lock() {
        buffer.push(message);
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let mut result = Ok(());

    INIT.call_once(|| {
        result = init_logging_inner(level);
    });

    result
}

fn to_tracing_level(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Silent => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warning => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
    }
}

fn directive(value: &str) -> Result<tracing_subscriber::filter::Directive> {
    value.parse()
        .map_err(|e| LibError::Logging(format!("Invalid log directive {}: {}", value, e)))
}

/// Directives shared by the console and buffer layers
fn build_filter(base: EnvFilter, level: Level) -> Result<EnvFilter> {
    Ok(base
        .add_directive(directive(&format!("gatetun_core={}", level))?)
        .add_directive(directive(&format!("gatetun_lib={}", level))?)
        .add_directive(directive("tokio=warn")?))
}

fn init_logging_inner(level: LogLevel) -> Result<()> {
    let tracing_level = match to_tracing_level(level) {
        Some(l) => l,
        None => return Ok(()),
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_filter(build_filter(EnvFilter::from_default_env(), tracing_level)?);

    // The buffer feeds the host UI, so it honours the selected level too
    let buffer_layer = BufferLayer::new(Arc::clone(&LOG_BUFFER))
        .with_filter(build_filter(EnvFilter::from_default_env(), tracing_level)?);

    let result = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(buffer_layer)
        .try_init();

    if result.is_err() {
        add_log("[INFO] Tracing already initialized, using existing subscriber".to_string());
    } else {
        tracing::info!("Logging initialized at level: {:?}", level);
    }
    Ok(())
}

/// Formats events into a shared log buffer
struct BufferLayer {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl BufferLayer {
    fn new(buffer: Arc<Mutex<LogBuffer>>) -> Self {
        Self { buffer }
    }
}

impl<S> tracing_subscriber::Layer<S> for BufferLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with("tokio") {
            return;
        }

        let mut visitor = LogVisitor::default();
        event.record(&mut visitor);

        let line = format_line(metadata.level(), &visitor.message);
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(line);
        }
    }
}

fn format_line(level: &Level, message: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level, message)
}

#[derive(Default)]
struct LogVisitor {
    message: String,
}

impl tracing::field::Visit for LogVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" || self.message.is_empty() {
            self.message = value.to_string();
        } else {
            self.message.push_str(&format!(" {}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" || self.message.is_empty() {
            self.message = format!("{:?}", value);
        } else {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
