//! parlor-client – Client-Seite
//!
//! - `transport` - Verbindung zum Relay (Trait + TCP)
//! - `reconnect` - Wiederverbindung mit Backoff und erneutem Abonnieren
//! - `directory` - Schluessel-Verzeichnis ueber HTTP
//! - `messenger` - Kanal-Nachrichten verschluesseln, senden, entschluesseln

pub mod directory;
pub mod error;
pub mod messenger;
pub mod reconnect;
pub mod transport;

pub use directory::HttpKeyDirectory;
pub use error::{ClientError, ClientResult};
pub use messenger::{identitaet_sicherstellen, ChannelMessenger, EntschluesselteNachricht};
pub use reconnect::{ReconnectPolicy, ReconnectionManager, Verbindungszustand};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
