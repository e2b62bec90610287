use {
    std::{convert::Infallible, pin::Pin, sync::Arc},
    tracing::{error, warn},
    tokio::sync::oneshot,
    hyper::{Response, body::Bytes, header::{CONTENT_TYPE, HeaderValue}},
    http_body_util::Full,
    rayon::ThreadPool,
    prometheus::IntGauge,
    crate::{dispatcher::{Dispatcher, Reply}, metrics::Metrics},
};

pub(crate) struct Engine {
    pub(crate) thread_pool: ThreadPool,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) metrics: Metrics,
}

#[derive(Clone)]
pub(crate) struct HttpHandler {
    engine: Arc<Engine>,
}

impl HttpHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
        }
    }
}

impl hyper::service::Service<hyper::Request<hyper::body::Incoming>> for HttpHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<hyper::body::Incoming>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let in_flight = MetricGaugeDecreaseGuard::inc(self.engine.metrics.http_requests_in_flight.clone());

        // store calls block on sqlite, so they run on the thread pool instead of the async executor
        let (tx, rx) = oneshot::channel();
        let engine = self.engine.clone();
        self.engine.thread_pool.spawn(move || {
            let reply = engine.dispatcher.dispatch(&method, &path);
            if tx.send(reply).is_err() {
                warn!("connection closed before reply to {method} {path:?} was sent");
            }
        });

        let metrics = self.engine.metrics.clone();
        Box::pin(async move {
            let reply = match rx.await {
                Ok(v) => v,
                Err(err) => {
                    error!("request worker exited without a reply: {err:?}");
                    Reply::internal_error()
                }
            };

            drop(in_flight);
            metrics.http_requests_total.inc();

            Ok(into_response(reply))
        })
    }
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = reply.status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(reply.content_type));
    response
}

// decreases the gauge even if the connection drops the response future early
struct MetricGaugeDecreaseGuard {
    gauge: IntGauge,
}

impl MetricGaugeDecreaseGuard {
    fn inc(gauge: IntGauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for MetricGaugeDecreaseGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
