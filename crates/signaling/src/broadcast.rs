//! Verbindungs-Register und Kanal-Verteilung
//!
//! Der EventBroadcaster kennt jede offene Verbindung mit ihrer Send-Queue,
//! dem gebundenen Benutzer und den abonnierten Kanaelen, dazu pro Kanal die
//! Menge der abonnierten Verbindungen.
//!
//! ## Lock-Reihenfolge
//! Immer erst `verbindungen`, dann `abonnenten`. Die Verteilung an einen
//! Kanal kopiert die Abonnenten-Menge und gibt den Lock frei, bevor sie die
//! Verbindungs-Eintraege anfasst. Kanaele blockieren sich so nie gegenseitig.
//!
//! ## Zustellung
//! Hoechstens einmal: eine volle oder geschlossene Queue verwirft den
//! Umschlag mit einer Log-Zeile.

use dashmap::DashMap;
use parlor_core::{ChannelId, ConnectionId, UserId};
use parlor_protocol::ServerEnvelope;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard-Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// VerbindungsEintrag
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct VerbindungsEintrag {
    user_id: Option<UserId>,
    kanaele: HashSet<ChannelId>,
    tx: mpsc::Sender<ServerEnvelope>,
}

fn senden(
    connection_id: ConnectionId,
    tx: &mpsc::Sender<ServerEnvelope>,
    umschlag: ServerEnvelope,
) -> bool {
    match tx.try_send(umschlag) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(%connection_id, "Send-Queue voll – Umschlag verworfen");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(%connection_id, "Send-Queue geschlossen (Verbindung getrennt)");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Register aller offenen Verbindungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    verbindungen: DashMap<ConnectionId, VerbindungsEintrag>,
    abonnenten: DashMap<ChannelId, HashSet<ConnectionId>>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self::mit_queue_groesse(SEND_QUEUE_GROESSE)
    }

    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                verbindungen: DashMap::new(),
                abonnenten: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine neue Verbindung und gibt ihre Empfangs-Queue zurueck
    pub fn verbindung_registrieren(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::Receiver<ServerEnvelope> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner.verbindungen.insert(
            connection_id,
            VerbindungsEintrag {
                user_id: None,
                kanaele: HashSet::new(),
                tx,
            },
        );
        tracing::debug!(%connection_id, "Verbindung registriert");
        rx
    }

    /// Entfernt eine Verbindung aus dem Register und allen Abonnenten-Mengen
    pub fn verbindung_entfernen(&self, connection_id: ConnectionId) {
        let Some((_, eintrag)) = self.inner.verbindungen.remove(&connection_id) else {
            return;
        };
        for channel_id in &eintrag.kanaele {
            self.aus_abonnenten_entfernen(*channel_id, connection_id);
        }
        tracing::debug!(
            %connection_id,
            kanaele = eintrag.kanaele.len(),
            "Verbindung entfernt"
        );
    }

    /// Bindet (oder bindet neu) einen Benutzer an die Verbindung
    pub fn user_binden(&self, connection_id: ConnectionId, user_id: UserId) -> bool {
        match self.inner.verbindungen.get_mut(&connection_id) {
            Some(mut eintrag) => {
                eintrag.user_id = Some(user_id);
                true
            }
            None => false,
        }
    }

    pub fn user_von(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.inner
            .verbindungen
            .get(&connection_id)
            .and_then(|e| e.user_id)
    }

    /// Abonniert einen Kanal; idempotent
    ///
    /// Verbindungs-Eintrag und Abonnenten-Menge werden gemeinsam unter dem
    /// Lock des Verbindungs-Eintrags geaendert.
    pub fn kanal_beitreten(&self, connection_id: ConnectionId, channel_id: ChannelId) -> bool {
        let Some(mut eintrag) = self.inner.verbindungen.get_mut(&connection_id) else {
            return false;
        };
        eintrag.kanaele.insert(channel_id);
        self.inner
            .abonnenten
            .entry(channel_id)
            .or_default()
            .insert(connection_id);
        true
    }

    /// Beendet ein Abo; idempotent
    pub fn kanal_verlassen(&self, connection_id: ConnectionId, channel_id: ChannelId) {
        let Some(mut eintrag) = self.inner.verbindungen.get_mut(&connection_id) else {
            return;
        };
        if eintrag.kanaele.remove(&channel_id) {
            self.aus_abonnenten_entfernen(channel_id, connection_id);
        }
    }

    fn aus_abonnenten_entfernen(&self, channel_id: ChannelId, connection_id: ConnectionId) {
        if let Some(mut menge) = self.inner.abonnenten.get_mut(&channel_id) {
            menge.remove(&connection_id);
        }
        self.inner
            .abonnenten
            .remove_if(&channel_id, |_, menge| menge.is_empty());
    }

    /// Sendet einen Umschlag an eine einzelne Verbindung
    pub fn an_verbindung_senden(&self, connection_id: ConnectionId, umschlag: ServerEnvelope) -> bool {
        match self.inner.verbindungen.get(&connection_id) {
            Some(eintrag) => senden(connection_id, &eintrag.tx, umschlag),
            None => {
                tracing::debug!(%connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet einen Umschlag an alle Abonnenten eines Kanals
    ///
    /// Gibt die Anzahl der eingereihten Umschlaege zurueck.
    pub fn an_kanal_senden(&self, channel_id: ChannelId, umschlag: ServerEnvelope) -> usize {
        self.verteilen(channel_id, None, umschlag)
    }

    /// Wie [`an_kanal_senden`](Self::an_kanal_senden), ohne `ausgeschlossen`
    pub fn an_kanal_ausser_senden(
        &self,
        channel_id: ChannelId,
        ausgeschlossen: ConnectionId,
        umschlag: ServerEnvelope,
    ) -> usize {
        self.verteilen(channel_id, Some(ausgeschlossen), umschlag)
    }

    fn verteilen(
        &self,
        channel_id: ChannelId,
        ausgeschlossen: Option<ConnectionId>,
        umschlag: ServerEnvelope,
    ) -> usize {
        let ziele: Vec<ConnectionId> = match self.inner.abonnenten.get(&channel_id) {
            Some(menge) => menge.iter().copied().collect(),
            None => return 0,
        };

        let mut gesendet = 0;
        for connection_id in ziele {
            if Some(connection_id) == ausgeschlossen {
                continue;
            }
            if let Some(eintrag) = self.inner.verbindungen.get(&connection_id) {
                if senden(connection_id, &eintrag.tx, umschlag.clone()) {
                    gesendet += 1;
                }
            }
        }
        gesendet
    }

    pub fn verbindungs_anzahl(&self) -> usize {
        self.inner.verbindungen.len()
    }

    pub fn ist_abonniert(&self, connection_id: ConnectionId, channel_id: ChannelId) -> bool {
        self.inner
            .abonnenten
            .get(&channel_id)
            .is_some_and(|menge| menge.contains(&connection_id))
    }

    pub fn abonnenten_anzahl(&self, channel_id: ChannelId) -> usize {
        self.inner
            .abonnenten
            .get(&channel_id)
            .map(|menge| menge.len())
            .unwrap_or_default()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
