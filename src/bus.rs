//! Bus connection bootstrap: pick a bus, open it, and hand the async
//! runtime a handle that drives its I/O forever. `dbus_tokio::connection`'s
//! `new_session_sync`/`new_system_sync` return an `IOResource` future that
//! must be polled to make progress; spawning it is how the bus connection
//! gets attached to the event loop.

use std::sync::Arc;

use dbus::nonblock::SyncConnection;
use dbus_tokio::connection;
use tracing::error;

/// Which bus to connect to, selected by the `-s`/`--session` CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

impl BusKind {
    fn label(self) -> &'static str {
        match self {
            BusKind::Session => "session",
            BusKind::System => "system",
        }
    }
}

/// Opens the selected bus and spawns its I/O resource onto the current
/// `tokio` runtime. If the resource ever resolves, the connection to D-Bus
/// is gone; that is logged at `error!` and the process exits, since there
/// is only one bus connection and nothing to recover it to.
pub fn connect(kind: BusKind) -> Result<Arc<SyncConnection>, dbus::Error> {
    let (resource, conn) = match kind {
        BusKind::Session => connection::new_session_sync()?,
        BusKind::System => connection::new_system_sync()?,
    };
    let label = kind.label();
    tokio::spawn(async move {
        let err = resource.await;
        error!(bus = label, error = %err, "lost connection to D-Bus");
        std::process::exit(1);
    });
    Ok(conn)
}
