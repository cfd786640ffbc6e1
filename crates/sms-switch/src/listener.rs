//! TCP listener for peer simulators

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::actor::SwitchHandle;
use crate::config::SwitchConfig;
use crate::connection::attach;
use crate::error::SwitchError;

/// Bind the peer listener
pub async fn bind(config: &SwitchConfig) -> Result<TcpListener, SwitchError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("SMS server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept peers until the switch actor stops
///
/// Connections beyond the switch's limit are closed straight away. Accept
/// errors are logged and the loop carries on.
pub async fn run_listener(
    listener: TcpListener,
    switch: SwitchHandle,
    queue_depth: usize,
) -> Result<(), SwitchError> {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Unable to set TCP_NODELAY for {}: {}", addr, e);
        }

        match attach(&switch, addr.to_string(), stream, queue_depth).await {
            Ok(Some(handle)) => info!("Accepted peer {} (handle {})", addr, handle.0),
            Ok(None) => warn!("Connection from {} refused: too many peers", addr),
            Err(SwitchError::ActorUnavailable) => {
                info!("Switch stopped, closing listener");
                return Ok(());
            }
            Err(e) => warn!("Unable to attach peer {}: {}", addr, e),
        }
    }
}
