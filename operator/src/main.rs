mod cleaner;
mod dispatcher;
mod model;
mod pipeline;
mod resolver;
mod script;
mod util;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use cleaner_common::cli::OperatorArgs;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use owo_colors::OwoColorize;
use tokio::net::TcpListener;

use dispatcher::Dispatcher;
use pipeline::notify::WebhookNotifier;
use script::LuaRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cleaner_common::init();
    let args = OperatorArgs::parse();

    println!("{}", "🧹 cleaner-operator starting...".green());
    println!(
        "  worker-number={} concurrent-reconciles={} kube-api-qps={} kube-api-burst={}",
        args.worker_number, args.concurrent_reconciles, args.kube_api_qps, args.kube_api_burst
    );

    let client = kube::Client::try_default().await?;

    #[cfg(feature = "metrics")]
    util::metrics::register();

    let dispatcher = Arc::new(Dispatcher::new(
        client.clone(),
        Arc::new(LuaRuntime),
        Arc::new(WebhookNotifier::default()),
    ));

    let metrics_addr = parse_bind_address(&args.metrics_bind_address, 8080)?;
    let health_addr = parse_bind_address(&args.health_probe_bind_address, 8081)?;
    tokio::spawn(serve_metrics(metrics_addr));
    tokio::spawn(serve_health(health_addr));

    cleaner::reconcile::run(client, dispatcher, args.worker_number).await?;
    Ok(())
}

fn parse_bind_address(raw: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    let raw = if let Some(port) = raw.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        raw.to_string()
    };
    raw.parse()
        .or_else(|_| format!("0.0.0.0:{default_port}").parse())
        .map_err(|e: std::net::AddrParseError| anyhow::anyhow!("invalid bind address {raw:?}: {e}"))
}

async fn serve_metrics(addr: SocketAddr) {
    if let Err(e) = serve(addr, |_req| async move {
        #[cfg(feature = "metrics")]
        let body = util::metrics::gather();
        #[cfg(not(feature = "metrics"))]
        let body = String::new();
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body))))
    })
    .await
    {
        eprintln!("{}", format!("metrics server error: {e}").red());
    }
}

async fn serve_health(addr: SocketAddr) {
    if let Err(e) = serve(addr, |_req| async move {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("ok"))))
    })
    .await
    {
        eprintln!("{}", format!("health server error: {e}").red());
    }
}

async fn serve<F, Fut>(addr: SocketAddr, handler: F) -> anyhow::Result<()>
where
    F: Fn(Request<hyper::body::Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    println!("{}", format!("  listening on {addr}").cyan());
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = ConnBuilder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(io, service_fn(handler))
                .await
            {
                eprintln!("connection error: {e}");
            }
        });
    }
}
