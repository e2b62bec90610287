use {
    std::{io, net::SocketAddr, sync::Arc, time::Duration},
    tokio::{net::TcpListener, time::timeout},
    hyper::server::conn::http1,
    hyper_util::{rt::{TokioIo, TokioTimer}, server::graceful::GracefulShutdown},
    rayon::ThreadPoolBuilder,
    tracing::{info, warn, error},
    thiserror::Error,
    crate::{
        config::ServerConfig,
        dispatcher::Dispatcher,
        error::{StoreError, StoreOpenError},
        http::{Engine, HttpHandler},
        metrics::{Metrics, run_metrics_server},
        store::CounterStore,
    },
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to open counter store: {0}")]
    StoreOpen(#[from] StoreOpenError),

    #[error("failed to close counter store: {0}")]
    StoreClose(#[from] StoreError),

    #[error("failed to bind tcp listener on {addr:?}: {source:?}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to read listener address: {0:?}")]
    LocalAddr(io::Error),

    #[error("failed to init metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Counter service bound to its listeners, ready to serve.
pub struct BuildNumberServer {
    listener: TcpListener,
    metrics_listener: Option<TcpListener>,
    engine: Arc<Engine>,
    store: Arc<CounterStore>,
}

impl BuildNumberServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let store = Arc::new(CounterStore::open(&config.store_location(), config.pool_size())?);
        let metrics = Metrics::new()?;

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(config.pool_size())
            .thread_name(|index| format!("bns-worker-{index}"))
            .build()?;

        let listener = bind_listener((config.host, config.port).into()).await?;
        let metrics_listener = match config.metrics_port {
            Some(port) => Some(bind_listener((config.host, port).into()).await?),
            None => None,
        };

        let engine = Arc::new(Engine {
            thread_pool,
            dispatcher: Dispatcher::new(store.clone(), config.var_name.clone(), metrics.clone()),
            metrics,
        });

        Ok(Self {
            listener,
            metrics_listener,
            engine,
            store,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn metrics_addr(&self) -> Option<Result<SocketAddr, ServerError>> {
        self.metrics_listener.as_ref().map(|v| v.local_addr().map_err(ServerError::LocalAddr))
    }

    /// Serves requests until `shutdown` resolves. After that no new connections are accepted,
    /// in-flight requests are allowed to finish and the store is closed.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Self { listener, metrics_listener, engine, store } = self;

        let metrics_task = metrics_listener.map(|listener| tokio::spawn(run_metrics_server(engine.metrics.clone(), listener)));

        let http_handler = HttpHandler::new(engine);
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        match listener.local_addr() {
            Ok(addr) => info!("started http server on {addr:?}"),
            Err(err) => warn!("started http server on unknown address: {err:?}"),
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down, no longer accepting connections");
                    break;
                },
                connection = listener.accept() => {
                    let (tcp, _) = match connection {
                        Ok(v) => v,
                        Err(err) => {
                            error!("failed to accept http connection: {err:?}");
                            continue;
                        }
                    };
                    let io = TokioIo::new(tcp);

                    let conn = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(io, http_handler.clone());
                    let fut = graceful.watch(conn);
                    tokio::task::spawn(async move {
                        if let Err(err) = fut.await {
                            if err.is_timeout() || err.is_incomplete_message() {
                                // caused by client
                            } else {
                                error!("error while handling http request: {err:?}");
                            }
                        }
                    });
                }
            }
        }
        drop(listener);

        if timeout(SHUTDOWN_TIMEOUT, graceful.shutdown()).await.is_err() {
            warn!("timed out waiting for in-flight connections to finish");
        }

        if let Some(metrics_task) = metrics_task {
            metrics_task.abort();
        }

        store.close()?;
        info!("stopped http server.");
        Ok(())
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for SIGINT: {err:?}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                error!("failed to listen for SIGTERM: {err:?}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
