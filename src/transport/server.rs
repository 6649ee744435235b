use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use tracing::info;

use crate::broker::Broker;
use crate::transport::http;

/// Builds and binds the HTTP server for `broker`.
///
/// Signal handling is left to the caller. Returns the running server and
/// the addresses it is listening on, so `addr` may use port 0.
pub fn bind(
    broker: Arc<Broker>,
    addr: &str,
    workers: usize,
) -> io::Result<(Server, Vec<SocketAddr>)> {
    let data = web::Data::from(broker);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(http::configure)
    })
    .disable_signals();
    if workers > 0 {
        server = server.workers(workers);
    }

    let server = server.bind(addr)?;
    let addrs = server.addrs();
    info!(?addrs, "message queue server listening");

    Ok((server.run(), addrs))
}
