//! Gemeinsamer Relay-Zustand
//!
//! Haelt Konfiguration, Repositories und das Verbindungs-Register als
//! Arc-Referenzen, die zwischen den Verbindungs-Tasks geteilt werden.

use parlor_db::{MessageRepository, ReactionRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::broadcast::{EventBroadcaster, SEND_QUEUE_GROESSE};

/// Konfiguration fuer das Relay
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Abstand der `ping`-Umschlaege an jeden Client
    pub keepalive_sek: u64,
    /// Trennt Verbindungen, die so lange nichts gesendet haben
    /// (auch keinen `pong`); muss groesser als `keepalive_sek` sein
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_verbindungen: 1024,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: SEND_QUEUE_GROESSE,
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Speicher fuer verschluesselte Nachrichten
    pub nachrichten: Arc<dyn MessageRepository>,
    pub reaktionen: Arc<dyn ReactionRepository>,
    /// Verbindungs-Register und Kanal-Verteilung
    pub broadcaster: EventBroadcaster,
    /// Belegte Verbindungsplaetze, gezaehlt ab dem Accept
    belegt: Arc<AtomicUsize>,
}

impl SignalingState {
    pub fn neu(
        config: SignalingConfig,
        nachrichten: Arc<dyn MessageRepository>,
        reaktionen: Arc<dyn ReactionRepository>,
    ) -> Arc<Self> {
        let broadcaster = EventBroadcaster::mit_queue_groesse(config.send_queue_groesse);
        Arc::new(Self {
            config: Arc::new(config),
            nachrichten,
            reaktionen,
            broadcaster,
            belegt: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Zustand ueber ein einziges Backend, das beide Repositories implementiert
    pub fn mit_db<D>(config: SignalingConfig, db: Arc<D>) -> Arc<Self>
    where
        D: MessageRepository + ReactionRepository + 'static,
    {
        Self::neu(config, Arc::clone(&db) as Arc<dyn MessageRepository>, db)
    }

    /// Reserviert einen Verbindungsplatz; `None`, wenn das Limit erreicht ist
    ///
    /// Der Platz wird frei, sobald der zurueckgegebene Guard gedroppt wird.
    pub fn platz_reservieren(&self) -> Option<VerbindungsPlatz> {
        let max = self.config.max_verbindungen;
        self.belegt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| VerbindungsPlatz {
                belegt: Arc::clone(&self.belegt),
            })
    }

    pub fn belegte_plaetze(&self) -> usize {
        self.belegt.load(Ordering::Acquire)
    }
}

/// Belegter Verbindungsplatz (RAII)
#[derive(Debug)]
pub struct VerbindungsPlatz {
    belegt: Arc<AtomicUsize>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.belegt.fetch_sub(1, Ordering::AcqRel);
    }
}
