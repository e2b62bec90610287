pub use crate::{
    config::ServerConfig,
    server::{BuildNumberServer, ServerError, shutdown_signal},
    store::CounterStore,
};

pub mod config;
pub mod dispatcher;
pub mod error;
mod http;
pub mod metrics;
pub mod pidfile;
pub mod routes;
pub mod server;
pub mod store;
