//! Shared plumbing for the end-to-end tests: a TCP `Connector` that dials a
//! `MockRedisServer`, and a one-liner to bring up a standalone multiplexer
//! against it.

use std::sync::Arc;

use redis_mux::{Config, ConfigBuilder, Connector, Multiplexer, Socket, Topology};
use redis_test_support::MockRedisServer;
use tokio::net::TcpStream;

pub fn tcp_connector_for(host: String, port: u16) -> Connector {
    Arc::new(move || {
        let host = host.clone();
        Box::pin(async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            Ok(Box::new(stream) as Box<dyn Socket>)
        })
    })
}

pub fn connector_factory() -> Arc<dyn Fn(String, u16) -> Connector + Send + Sync> {
    Arc::new(tcp_connector_for)
}

pub async fn connect_standalone(server: &MockRedisServer) -> Arc<Multiplexer> {
    let config = ConfigBuilder::new()
        .endpoint("127.0.0.1", server.local_addr().port())
        .build()
        .expect("valid config");
    Multiplexer::connect(config, Topology::Standalone, connector_factory())
        .await
        .expect("multiplexer connects to mock server")
}

pub async fn connect_cluster(server: &MockRedisServer) -> Arc<Multiplexer> {
    let config = ConfigBuilder::new()
        .endpoint("127.0.0.1", server.local_addr().port())
        .build()
        .expect("valid config");
    Multiplexer::connect(config, Topology::Cluster, connector_factory())
        .await
        .expect("multiplexer connects to mock server")
}

pub fn custom_config(server: &MockRedisServer, build: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Config {
    let builder = ConfigBuilder::new().endpoint("127.0.0.1", server.local_addr().port());
    build(builder).build().expect("valid config")
}
