use std::backtrace::{Backtrace, BacktraceStatus};

/// Sentinel used when a cause's concrete type has been erased.
pub const UNKNOWN_TYPE: &str = "<UNKNOWN>";

/// Nesting cap for cause chains and suppressed lists. Anything deeper
/// is dropped, so a cyclic chain built by hand cannot recurse forever.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// An error chain captured at log time: type, message, backtrace lines,
/// suppressed errors and a single cause, each of which is itself a
/// captured error.
#[derive(Debug, Clone)]
pub struct CapturedError {
    pub type_name: String,
    pub message: String,
    pub backtrace: Vec<String>,
    pub suppressed: Vec<CapturedError>,
    pub cause: Option<Box<CapturedError>>,
}

impl CapturedError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        CapturedError {
            type_name: type_name.into(),
            message: message.into(),
            backtrace: Vec::new(),
            suppressed: Vec::new(),
            cause: None,
        }
    }

    /// Capture a concrete error and its `source()` chain.
    ///
    /// The top node keeps the concrete type name and a backtrace when
    /// one is available. Sources are only visible as `dyn Error`, so
    /// cause nodes degrade to the `<UNKNOWN>` type sentinel; build the
    /// chain explicitly with [`with_cause`](Self::with_cause) to keep
    /// real type names.
    pub fn of<E: std::error::Error + 'static>(err: &E) -> Self {
        let mut root = CapturedError::of_dyn(err);
        root.type_name = std::any::type_name::<E>().to_string();
        root
    }

    /// Capture a type-erased error and its `source()` chain. Every
    /// node carries the `<UNKNOWN>` type sentinel.
    pub fn of_dyn(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut root = CapturedError::new(UNKNOWN_TYPE, err.to_string());
        root.backtrace = capture_backtrace();
        let mut node = &mut root;
        let mut source = err.source();
        let mut depth = 0;
        while let Some(src) = source {
            if depth >= MAX_CHAIN_DEPTH {
                break;
            }
            node.cause = Some(Box::new(CapturedError::new(UNKNOWN_TYPE, src.to_string())));
            node = node.cause.as_mut().expect("cause just set");
            source = src.source();
            depth += 1;
        }
        root
    }

    pub fn with_cause(mut self, cause: CapturedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_suppressed(mut self, suppressed: CapturedError) -> Self {
        self.suppressed.push(suppressed);
        self
    }

    pub fn with_backtrace(mut self, lines: Vec<String>) -> Self {
        self.backtrace = lines;
        self
    }

    /// Wire shape: `{type, message, backtrace, data}` where `data`
    /// holds `suppressed` and `cause` only when present.
    pub fn to_json(&self) -> serde_json::Value {
        self.node_at(0)
    }

    fn node_at(&self, depth: usize) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        if depth < MAX_CHAIN_DEPTH {
            if !self.suppressed.is_empty() {
                let nodes: Vec<serde_json::Value> = self
                    .suppressed
                    .iter()
                    .map(|s| s.node_at(depth + 1))
                    .collect();
                data.insert("suppressed".to_string(), serde_json::Value::Array(nodes));
            }
            if let Some(cause) = &self.cause {
                data.insert("cause".to_string(), cause.node_at(depth + 1));
            }
        }
        let mut node = serde_json::Map::new();
        node.insert(
            "type".to_string(),
            serde_json::Value::String(self.type_name.clone()),
        );
        node.insert(
            "message".to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        node.insert(
            "backtrace".to_string(),
            serde_json::Value::Array(
                self.backtrace
                    .iter()
                    .map(|l| serde_json::Value::String(l.clone()))
                    .collect(),
            ),
        );
        node.insert("data".to_string(), serde_json::Value::Object(data));
        serde_json::Value::Object(node)
    }
}

fn capture_backtrace() -> Vec<String> {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => format!("{bt}")
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
