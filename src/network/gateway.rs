//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds one TCP socket and spawns a task per accepted stream.
//! The upgrade handshake routes and authenticates the request before any
//! hub state exists; a refused handshake leaves nothing behind.

use crate::auth::{Identity, IdentityProvider};
use crate::network::Connection;
use crate::state::Hub;
use crate::telemetry::spans;
use roomcast_proto::{HandshakeConfig, HandshakeRejection, Route, route_request};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Callback, ErrorResponse, Request, Response};
use tracing::{Instrument, debug, error, info, instrument, warn};

/// The Gateway accepts WebSocket upgrades and spawns connection tasks.
pub struct Gateway {
    listener: TcpListener,
    hub: Arc<Hub>,
    identity: Arc<dyn IdentityProvider>,
    handshake: Arc<HandshakeConfig>,
    idle_timeout: Option<Duration>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        hub: Arc<Hub>,
        identity: Arc<dyn IdentityProvider>,
        handshake: HandshakeConfig,
        idle_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "WebSocket listener bound");
        Ok(Self {
            listener,
            hub,
            identity,
            handshake: Arc::new(handshake),
            idle_timeout,
        })
    }

    /// Run the accept loop until the hub signals shutdown.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.hub.lifecycle.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "WebSocket connection attempt");
                        let task = upgrade_and_serve(
                            stream,
                            addr,
                            Arc::clone(&self.hub),
                            Arc::clone(&self.identity),
                            Arc::clone(&self.handshake),
                            self.idle_timeout,
                        );
                        tokio::spawn(task.instrument(spans::handshake(addr)));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept WebSocket connection");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Gateway stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn upgrade_and_serve(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    identity: Arc<dyn IdentityProvider>,
    handshake: Arc<HandshakeConfig>,
    idle_timeout: Option<Duration>,
) {
    let (accepted_tx, accepted_rx) = oneshot::channel();
    let callback = UpgradeCallback {
        addr,
        handshake,
        identity,
        accepted: accepted_tx,
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let Ok((route, user)) = accepted_rx.await else {
        warn!(%addr, "handshake completed without an identity");
        return;
    };

    let connection = match Connection::open(hub, ws, addr, &user, route, idle_timeout) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(%addr, error = %e, "rejecting authenticated identity");
            return;
        }
    };
    if let Err(e) = connection.run().await {
        debug!(%addr, error = %e, "WebSocket connection error");
    }
}

/// Handshake hook: routes the request, authenticates it, and echoes the
/// token subprotocol back. Runs before tungstenite writes the response.
struct UpgradeCallback {
    addr: SocketAddr,
    handshake: Arc<HandshakeConfig>,
    identity: Arc<dyn IdentityProvider>,
    accepted: oneshot::Sender<(Route, Identity)>,
}

impl UpgradeCallback {
    fn reject(&self, rejection: HandshakeRejection) -> ErrorResponse {
        crate::metrics::record_auth_failure(rejection.error_code());
        debug!(addr = %self.addr, reason = rejection.error_code(), "WebSocket upgrade refused");
        rejection.into_response()
    }
}

impl Callback for UpgradeCallback {
    fn on_request(self, request: &Request, response: Response) -> Result<Response, ErrorResponse> {
        let upgrade = route_request(request, &self.handshake).map_err(|r| self.reject(r))?;

        let user = match self.identity.authenticate(&upgrade.token) {
            Ok(user) => user,
            Err(e) => {
                crate::metrics::record_auth_failure(e.error_code());
                debug!(addr = %self.addr, error = %e, "WebSocket upgrade unauthorized");
                return Err(HandshakeRejection::Unauthorized.into_response());
            }
        };

        let response = upgrade.accept(response);
        let _ = self.accepted.send((upgrade.route, user));
        Ok(response)
    }
}
