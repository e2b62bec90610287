use {
    std::sync::Arc,
    tracing::{debug, info, warn, error},
    thiserror::Error,
    hyper::{Method, StatusCode},
    bns_core::{Style, format_build_number},
    crate::{
        error::StoreError,
        metrics::Metrics,
        routes::{Route, RouteError},
        store::CounterStore,
    },
};

const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_YAML: &str = "application/yaml";

/// Response produced for a single request, independent of the http library.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: CONTENT_TYPE_TEXT,
            body: String::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build_number(value: i64, style: Style, var_name: &str) -> Self {
        let content_type = match style {
            Style::Bash => CONTENT_TYPE_TEXT,
            Style::Json => CONTENT_TYPE_JSON,
            Style::Yaml => CONTENT_TYPE_YAML,
        };

        Self::new()
            .with_content_type(content_type)
            .with_body(format!("{}\n", format_build_number(value, style, var_name)))
    }

    pub fn internal_error() -> Self {
        Self::new()
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            .with_body("bns: internal error.\n")
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("bad request: {0}")]
    BadRequest(#[from] RouteError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NegativeBuildNumber { .. }) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::CounterOverflow { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::StorageUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn reply(&self) -> Reply {
        let message = match self {
            Self::BadRequest(err) => err.to_string(),
            Self::Store(StoreError::StorageUnavailable { .. }) => "storage unavailable".to_owned(),
            Self::Store(err) => err.to_string(),
        };

        Reply::new()
            .with_status(self.status())
            .with_body(format!("bns: {message}.\n"))
    }
}

/// Turns a request into a store operation and formats its result.
///
/// Calls into the store block, so `dispatch` should run off the async executor.
pub struct Dispatcher {
    store: Arc<CounterStore>,
    var_name: String,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(store: Arc<CounterStore>, var_name: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            store,
            var_name: var_name.into(),
            metrics,
        }
    }

    pub fn dispatch(&self, method: &Method, path: &str) -> Reply {
        match self.try_dispatch(method, path) {
            Ok(v) => v,
            Err(err) => {
                match &err {
                    DispatchError::Store(StoreError::StorageUnavailable { .. }) => {
                        self.metrics.storage_errors_total.inc();
                        error!("failed to serve {method} {path:?}: {err}");
                    },
                    DispatchError::Store(_) => warn!("rejected {method} {path:?}: {err}"),
                    DispatchError::BadRequest(_) => debug!("bad request {method} {path:?}: {err}"),
                }
                err.reply()
            }
        }
    }

    fn try_dispatch(&self, method: &Method, path: &str) -> Result<Reply, DispatchError> {
        let route = Route::resolve(method, path)?;

        let (value, style) = match route {
            Route::Get { project, style } => (self.store.get_or_create(&project)?, style),
            Route::Increment { project, style } => {
                let value = self.store.increment(&project)?;
                self.metrics.counter_increments_total.inc();
                debug!("incremented {project:?} to {value}");
                (value, style)
            },
            Route::Set { project, build_number } => {
                self.store.set(&project, build_number)?;
                self.metrics.counter_sets_total.inc();
                info!("set {project:?} to {build_number}");
                (build_number, Style::Bash)
            },
        };

        Ok(Reply::build_number(value, style, &self.var_name))
    }
}
