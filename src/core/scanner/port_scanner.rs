// src/core/scanner/port_scanner.rs

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info};

use super::ProbePorts;
use crate::config::ProbeConfig;
use crate::core::models::OpenPort;

/// TCP connect scanner over a fixed port list.
pub struct PortScanner {
    ports: Vec<u16>,
    connect_timeout: Duration,
    concurrency: usize,
}

impl PortScanner {
    pub fn new(ports: Vec<u16>, connect_timeout: Duration, concurrency: usize) -> Self {
        Self { ports, connect_timeout, concurrency: concurrency.max(1) }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.ports.clone(), config.connect_timeout(), config.concurrency)
    }
}

#[async_trait]
impl ProbePorts for PortScanner {
    async fn scan_ports(&self, ip: IpAddr) -> Vec<OpenPort> {
        info!(%ip, ports = self.ports.len(), "Starting port scan.");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for &port in &self.ports {
            let semaphore = semaphore.clone();
            let limit = self.connect_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match timeout(limit, TcpStream::connect(SocketAddr::new(ip, port))).await {
                    Ok(Ok(_stream)) => Some(OpenPort::tcp(port)),
                    Ok(Err(e)) => {
                        debug!(%ip, port, error = %e, "Port closed.");
                        None
                    }
                    Err(_) => {
                        debug!(%ip, port, "Connect timed out.");
                        None
                    }
                }
            });
        }

        let mut open = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(port)) = joined {
                open.push(port);
            }
        }
        open.sort();
        info!(%ip, open = open.len(), "Port scan finished.");
        open
    }
}
