//! Web server for roomcast.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::chat::RoomRegistry;
use crate::config::{Config, ServerConfig};
use crate::rate_limit::RateLimiters;
use crate::{Result, RoomcastError};

use super::router::{create_health_router, create_router};
use super::ws::ChatWsState;

/// How often idle rate limiter entries are dropped.
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Web server hosting the relay.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Server configuration.
    server_config: ServerConfig,
    /// Shared room registry.
    registry: Arc<RoomRegistry>,
    /// Per-connection rate limiters.
    limiters: Arc<RateLimiters>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                RoomcastError::Config(format!(
                    "invalid server address {}:{}: {}",
                    config.server.host, config.server.port, e
                ))
            })?;

        let limiters = RateLimiters::with_config(
            config.rate_limit.messages(),
            config.rate_limit.typing(),
        );

        Ok(Self {
            addr,
            server_config: config.server.clone(),
            registry: Arc::new(RoomRegistry::new()),
            limiters: Arc::new(limiters),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared room registry.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    fn router(&self) -> Router {
        let state = Arc::new(ChatWsState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.limiters),
        ));
        create_router(state, &self.server_config.cors_origins).merge(create_health_router())
    }

    /// Start the rate limiter cleanup background task.
    fn start_limiter_cleanup_task(limiters: Arc<RateLimiters>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_CLEANUP_INTERVAL);

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                limiters.cleanup();
                tracing::debug!(
                    tracked = limiters.message.tracked(),
                    "Rate limiter cleanup finished"
                );
            }
        });
    }

    async fn bind(self) -> Result<(TcpListener, Router, SocketAddr)> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        Self::start_limiter_cleanup_task(Arc::clone(&self.limiters));

        tracing::info!("Relay listening on ws://{}/ws", local_addr);
        Ok((listener, router, local_addr))
    }

    /// Run the web server.
    pub async fn run(self) -> Result<()> {
        let (listener, router, _) = self.bind().await?;
        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let (listener, router, local_addr) = self.bind().await?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0; // Use random port
        config
    }

    #[test]
    fn test_web_server_new() {
        let server = WebServer::new(&create_test_config()).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_web_server_invalid_host() {
        let mut config = create_test_config();
        config.server.host = "not a host".to_string();
        assert!(matches!(
            WebServer::new(&config),
            Err(RoomcastError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let server = WebServer::new(&create_test_config()).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
