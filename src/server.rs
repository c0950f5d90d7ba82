//! Accept loop
//!
//! Owns the listener and the registry actor, and spawns one handler task
//! per accepted connection until the shutdown future resolves. Connections
//! already in flight keep running after that.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::registry::RegistryHandle;
use crate::router::Router;

/// The relay server
pub struct ChatRelay {
    listener: TcpListener,
    router: Router,
    config: Arc<ServerConfig>,
}

impl ChatRelay {
    /// Create a relay on an already bound listener and start its registry
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        let router = Router::new(RegistryHandle::spawn(config.registry_buffer));
        Self {
            listener,
            router,
            config: Arc::new(config),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Router sharing this relay's registry
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let ChatRelay {
            listener,
            router,
            config,
        } = self;
        let limit = config
            .connection_limit()
            .map(|n| Arc::new(Semaphore::new(n)));

        tokio::pin!(shutdown);

        loop {
            // Wait for a free slot before accepting when a cap is configured
            let permit = match &limit {
                Some(semaphore) => tokio::select! {
                    _ = &mut shutdown => break,
                    permit = Arc::clone(semaphore).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let router = router.clone();
                        let config = Arc::clone(&config);

                        // Spawn handler task for each connection
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, router, config).await {
                                error!("Connection handler error: {}", e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        info!("No longer accepting connections");
    }
}
