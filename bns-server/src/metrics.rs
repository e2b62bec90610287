use {
    std::{convert::Infallible, pin::Pin},
    tracing::{info, error},
    tokio::net::TcpListener,
    hyper::{Request, Response, StatusCode, body::{Incoming, Bytes}, server::conn::http1},
    hyper_util::rt::{TokioIo, TokioTimer},
    http_body_util::Full,
    prometheus::{
        TextEncoder,
        Registry,
        IntGauge,
        IntCounter,
        register_int_gauge_with_registry,
        register_int_counter_with_registry,
    },
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub(crate) http_requests_total: IntCounter,
    pub(crate) http_requests_in_flight: IntGauge,
    pub(crate) counter_increments_total: IntCounter,
    pub(crate) counter_sets_total: IntCounter,
    pub(crate) storage_errors_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = register_int_counter_with_registry!("http_requests_total", "total http requests processed", registry)?;
        let http_requests_in_flight = register_int_gauge_with_registry!("http_requests_in_flight", "http requests being processed", registry)?;
        let counter_increments_total = register_int_counter_with_registry!("counter_increments_total", "build numbers incremented", registry)?;
        let counter_sets_total = register_int_counter_with_registry!("counter_sets_total", "build numbers set explicitly", registry)?;
        let storage_errors_total = register_int_counter_with_registry!("storage_errors_total", "requests failed because storage was unavailable", registry)?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            counter_increments_total,
            counter_sets_total,
            storage_errors_total,
        })
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let metrics = self.registry.gather();
        TextEncoder::new().encode_to_string(&metrics)
    }
}

pub async fn run_metrics_server(metrics: Metrics, listener: TcpListener) {
    match listener.local_addr() {
        Ok(addr) => info!("running metrics server on {addr:?}"),
        Err(err) => error!("metrics listener has no local address: {err:?}"),
    }

    let metrics_server = MetricsServer::new(metrics);

    loop {
        let (tcp, _) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                error!("failed to accept metrics connection: {err:?}");
                continue;
            }
        };
        let io = TokioIo::new(tcp);
        let metrics_server = metrics_server.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, metrics_server)
                .await {
                    error!("error while handling metrics request: {err:?}");
                }
        });
    }
}

#[derive(Clone)]
struct MetricsServer {
    metrics: Metrics,
}

impl MetricsServer {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
        }
    }
}

impl hyper::service::Service<Request<Incoming>> for MetricsServer {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, _req: Request<Incoming>) -> Self::Future {
        let response = match self.metrics.encode() {
            Ok(v) => Response::new(Full::new(Bytes::from(v))),
            Err(err) => {
                error!("failed to encode metrics: {err:?}");
                let mut response = Response::new(Full::new(Bytes::from_static(b"failed to encode metrics.\n")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        };
        Box::pin(async move { Ok(response) })
    }
}
