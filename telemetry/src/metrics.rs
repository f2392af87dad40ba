use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Installs the global Prometheus recorder and serves `/metrics` on `[::]:{port}`.
///
/// The merger exits after one run, so the exporter lives only as long as the run; it is
/// meant to be scraped by a push-gateway style sidecar or inspected while a long run is
/// in progress.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .add_global_label("service", "order-history-merger")
        .install()
}
