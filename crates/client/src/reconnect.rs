//! Wiederverbindung mit exponentiellem Backoff
//!
//! Der Manager haelt die Menge der abonnierten Kanaele nur im Speicher.
//! Nach jedem erfolgreichen Verbindungsaufbau sendet er zuerst `auth` und
//! danach `channel:join` fuer jeden abonnierten Kanal.
//!
//! ```text
//! Offline --verbinden--> Verbindend{0} --ok--> Verbunden --Verlust--> Verbindend{0}
//!                            |                                            |
//!                            +--Fehler--> Verbindend{n+1} ... --Cap--> Offline
//! ```
//!
//! `Offline` ist endgueltig, bis der Aufrufer erneut `verbinden` oder `run`
//! aufruft.

use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use parlor_core::{ChannelId, UserId};
use parlor_protocol::{ClientEnvelope, ServerEnvelope};
use tokio::sync::{mpsc, watch};

use crate::error::{ClientError, ClientResult};
use crate::transport::{Connector, Transport};

// ---------------------------------------------------------------------------
// Policy und Zustand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub basis: Duration,
    pub max_verzoegerung: Duration,
    pub max_versuche: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            basis: Duration::from_millis(500),
            max_verzoegerung: Duration::from_secs(30),
            max_versuche: 8,
        }
    }
}

impl ReconnectPolicy {
    /// Wartezeit nach dem fehlgeschlagenen Versuch `versuch` (ab 0):
    /// `min(basis * 2^versuch, max_verzoegerung)`
    pub fn verzoegerung(&self, versuch: u32) -> Duration {
        let faktor = 1u32.checked_shl(versuch).unwrap_or(u32::MAX);
        self.basis
            .checked_mul(faktor)
            .map_or(self.max_verzoegerung, |d| d.min(self.max_verzoegerung))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbindungszustand {
    Verbindend { versuch: u32 },
    Verbunden,
    Offline,
}

// ---------------------------------------------------------------------------
// ReconnectionManager
// ---------------------------------------------------------------------------

pub struct ReconnectionManager<C> {
    connector: C,
    policy: ReconnectPolicy,
    user_id: UserId,
    abos: Mutex<BTreeSet<ChannelId>>,
    zustand_tx: watch::Sender<Verbindungszustand>,
}

impl<C: Connector> ReconnectionManager<C> {
    pub fn neu(connector: C, policy: ReconnectPolicy, user_id: UserId) -> Self {
        let (zustand_tx, _) = watch::channel(Verbindungszustand::Offline);
        Self {
            connector,
            policy,
            user_id,
            abos: Mutex::new(BTreeSet::new()),
            zustand_tx,
        }
    }

    /// Beobachter fuer Zustandswechsel
    pub fn zustand(&self) -> watch::Receiver<Verbindungszustand> {
        self.zustand_tx.subscribe()
    }

    pub fn aktueller_zustand(&self) -> Verbindungszustand {
        *self.zustand_tx.borrow()
    }

    pub fn abos(&self) -> Vec<ChannelId> {
        self.abos.lock().iter().copied().collect()
    }

    fn zustand_setzen(&self, zustand: Verbindungszustand) {
        self.zustand_tx.send_replace(zustand);
    }

    fn abo_merken(&self, umschlag: &ClientEnvelope) {
        match umschlag {
            ClientEnvelope::ChannelJoin(r) => {
                self.abos.lock().insert(r.channel_id);
            }
            ClientEnvelope::ChannelLeave(r) => {
                self.abos.lock().remove(&r.channel_id);
            }
            _ => {}
        }
    }

    /// Baut eine Verbindung auf, authentifiziert und abonniert erneut
    ///
    /// Nach `max_versuche` Fehlschlaegen: Zustand `Offline` und
    /// [`ClientError::Offline`].
    pub async fn verbinden(&self) -> ClientResult<Box<dyn Transport>> {
        for versuch in 0..self.policy.max_versuche {
            self.zustand_setzen(Verbindungszustand::Verbindend { versuch });

            match self.aufbauen().await {
                Ok(transport) => {
                    self.zustand_setzen(Verbindungszustand::Verbunden);
                    return Ok(transport);
                }
                Err(e) => {
                    let warten = self.policy.verzoegerung(versuch);
                    tracing::warn!(
                        versuch,
                        warten_ms = warten.as_millis() as u64,
                        fehler = %e,
                        "Verbindungsaufbau fehlgeschlagen"
                    );
                    if versuch + 1 < self.policy.max_versuche {
                        tokio::time::sleep(warten).await;
                    }
                }
            }
        }

        tracing::error!(versuche = self.policy.max_versuche, "Relay nicht erreichbar – offline");
        self.zustand_setzen(Verbindungszustand::Offline);
        Err(ClientError::Offline {
            versuche: self.policy.max_versuche,
        })
    }

    async fn aufbauen(&self) -> ClientResult<Box<dyn Transport>> {
        let mut transport = self.connector.verbinden().await?;
        transport.send(ClientEnvelope::auth(self.user_id)).await?;

        let abos = self.abos();
        for channel_id in &abos {
            transport.send(ClientEnvelope::join(*channel_id)).await?;
        }
        if !abos.is_empty() {
            tracing::info!(kanaele = abos.len(), "Kanaele nach Verbindungsaufbau erneut abonniert");
        }
        Ok(transport)
    }

    /// Pumpt Umschlaege zwischen den Queues und der Verbindung und verbindet
    /// bei Verlust transparent neu
    ///
    /// Endet mit `Ok`, wenn eine der beiden Queues geschlossen wird, und mit
    /// [`ClientError::Offline`], wenn das Relay nicht mehr erreichbar ist.
    /// Ein Umschlag, dessen Senden an der Verbindung scheitert, geht verloren.
    pub async fn run(
        &self,
        mut ausgehend: mpsc::Receiver<ClientEnvelope>,
        eingehend: mpsc::Sender<ServerEnvelope>,
    ) -> ClientResult<()> {
        loop {
            let mut transport = self.verbinden().await?;

            loop {
                tokio::select! {
                    umschlag = ausgehend.recv() => {
                        let Some(umschlag) = umschlag else {
                            self.zustand_setzen(Verbindungszustand::Offline);
                            return Ok(());
                        };
                        self.abo_merken(&umschlag);
                        if let Err(e) = transport.send(umschlag).await {
                            tracing::warn!(fehler = %e, "Senden fehlgeschlagen – verbinde neu");
                            break;
                        }
                    }

                    empfangen = transport.receive() => {
                        let Some(umschlag) = empfangen else {
                            tracing::warn!("Verbindung zum Relay verloren – verbinde neu");
                            break;
                        };
                        if eingehend.send(umschlag).await.is_err() {
                            self.zustand_setzen(Verbindungszustand::Offline);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FakeTransport {
        gesendet: mpsc::UnboundedSender<ClientEnvelope>,
        eingang: mpsc::UnboundedReceiver<ServerEnvelope>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&mut self, umschlag: ClientEnvelope) -> ClientResult<()> {
            self.gesendet.send(umschlag).map_err(|_| ClientError::Getrennt)
        }

        async fn receive(&mut self) -> Option<ServerEnvelope> {
            self.eingang.recv().await
        }
    }

    /// Gegenseite einer FakeTransport-Verbindung
    struct Gegenseite {
        gesendet: mpsc::UnboundedReceiver<ClientEnvelope>,
        eingang: mpsc::UnboundedSender<ServerEnvelope>,
    }

    fn fake_paar() -> (FakeTransport, Gegenseite) {
        let (gesendet_tx, gesendet_rx) = mpsc::unbounded_channel();
        let (eingang_tx, eingang_rx) = mpsc::unbounded_channel();
        (
            FakeTransport {
                gesendet: gesendet_tx,
                eingang: eingang_rx,
            },
            Gegenseite {
                gesendet: gesendet_rx,
                eingang: eingang_tx,
            },
        )
    }

    /// Liefert die vorbereiteten Verbindungen der Reihe nach; ist keine
    /// mehr da, schlaegt der Aufbau fehl
    #[derive(Default)]
    struct FakeConnector {
        verbindungen: Mutex<VecDeque<FakeTransport>>,
        fehlschlaege_zuerst: AtomicU32,
        versuche: AtomicU32,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn verbinden(&self) -> ClientResult<Box<dyn Transport>> {
            self.versuche.fetch_add(1, Ordering::SeqCst);
            if self
                .fehlschlaege_zuerst
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ClientError::Getrennt);
            }
            match self.verbindungen.lock().pop_front() {
                Some(t) => Ok(Box::new(t)),
                None => Err(ClientError::Getrennt),
            }
        }
    }

    #[test]
    fn backoff_verdoppelt_bis_zum_maximum() {
        let policy = ReconnectPolicy::default();
        let ms: Vec<u128> = (0..8).map(|v| policy.verzoegerung(v).as_millis()).collect();
        assert_eq!(ms, [500, 1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(policy.verzoegerung(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_nach_max_versuchen() {
        let connector = FakeConnector::default();
        let manager = ReconnectionManager::neu(connector, ReconnectPolicy::default(), UserId::new());
        let mut zustand = manager.zustand();

        let start = tokio::time::Instant::now();
        let ergebnis = manager.verbinden().await;

        assert!(matches!(ergebnis, Err(ClientError::Offline { versuche: 8 })));
        assert_eq!(manager.connector.versuche.load(Ordering::SeqCst), 8);
        assert_eq!(*zustand.borrow_and_update(), Verbindungszustand::Offline);

        // 500 + 1000 + 2000 + 4000 + 8000 + 16000 + 30000 ms zwischen 8 Versuchen
        assert_eq!(start.elapsed(), Duration::from_millis(61_500));
    }

    #[tokio::test(start_paused = true)]
    async fn verbindet_nach_fehlschlaegen() {
        let (transport, mut gegenseite) = fake_paar();
        let connector = FakeConnector {
            fehlschlaege_zuerst: AtomicU32::new(2),
            ..FakeConnector::default()
        };
        connector.verbindungen.lock().push_back(transport);
        let user_id = UserId::new();
        let manager = ReconnectionManager::neu(connector, ReconnectPolicy::default(), user_id);

        let _transport = manager.verbinden().await.unwrap();

        assert_eq!(manager.aktueller_zustand(), Verbindungszustand::Verbunden);
        assert_eq!(manager.connector.versuche.load(Ordering::SeqCst), 3);
        assert_eq!(
            gegenseite.gesendet.recv().await,
            Some(ClientEnvelope::auth(user_id))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abonniert_nach_verbindungsverlust_erneut() {
        let (t1, mut g1) = fake_paar();
        let (t2, mut g2) = fake_paar();
        let connector = FakeConnector::default();
        connector.verbindungen.lock().extend([t1, t2]);

        let user_id = UserId::new();
        let manager = Arc::new(ReconnectionManager::neu(
            connector,
            ReconnectPolicy::default(),
            user_id,
        ));
        let (ausgehend_tx, ausgehend_rx) = mpsc::channel(8);
        let (eingehend_tx, mut eingehend_rx) = mpsc::channel(8);

        let lauf = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.run(ausgehend_rx, eingehend_tx).await })
        };

        let (k1, k2) = (ChannelId::new(), ChannelId::new());
        assert_eq!(g1.gesendet.recv().await, Some(ClientEnvelope::auth(user_id)));
        for k in [k1, k2] {
            ausgehend_tx.send(ClientEnvelope::join(k)).await.unwrap();
            assert_eq!(g1.gesendet.recv().await, Some(ClientEnvelope::join(k)));
        }
        ausgehend_tx.send(ClientEnvelope::leave(k2)).await.unwrap();
        assert_eq!(g1.gesendet.recv().await, Some(ClientEnvelope::leave(k2)));

        g1.eingang.send(ServerEnvelope::AuthSuccess).unwrap();
        assert_eq!(eingehend_rx.recv().await, Some(ServerEnvelope::AuthSuccess));

        // Verbindung 1 bricht weg
        drop(g1);

        assert_eq!(g2.gesendet.recv().await, Some(ClientEnvelope::auth(user_id)));
        assert_eq!(g2.gesendet.recv().await, Some(ClientEnvelope::join(k1)));
        assert_eq!(manager.abos(), vec![k1]);

        let mut zustand = manager.zustand();
        zustand
            .wait_for(|z| *z == Verbindungszustand::Verbunden)
            .await
            .unwrap();

        drop(ausgehend_tx);
        assert!(lauf.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_endet_offline() {
        let (t1, g1) = fake_paar();
        let connector = FakeConnector::default();
        connector.verbindungen.lock().push_back(t1);
        let manager = ReconnectionManager::neu(
            connector,
            ReconnectPolicy {
                max_versuche: 3,
                ..ReconnectPolicy::default()
            },
            UserId::new(),
        );
        let (_ausgehend_tx, ausgehend_rx) = mpsc::channel(8);
        let (eingehend_tx, _eingehend_rx) = mpsc::channel(8);

        drop(g1);
        let ergebnis = manager.run(ausgehend_rx, eingehend_tx).await;

        assert!(matches!(ergebnis, Err(ClientError::Offline { versuche: 3 })));
        assert_eq!(manager.aktueller_zustand(), Verbindungszustand::Offline);
    }
}
