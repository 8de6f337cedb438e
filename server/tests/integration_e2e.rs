//! Ende-zu-Ende: zwei Clients ueber echtes TCP-Relay und HTTP-Verzeichnis

use std::sync::Arc;
use std::time::Duration;

use parlor_client::{
    identitaet_sicherstellen, ChannelMessenger, HttpKeyDirectory, ReconnectPolicy,
    ReconnectionManager, TcpConnector,
};
use parlor_core::{ChannelId, UserId};
use parlor_crypto::{
    engine, ChannelKeyBroker, ChannelMessageCodec, KeyDirectory, KeyStore, MemoryKeyStore,
    UNDECRYPTABLE_PLACEHOLDER,
};
use parlor_db::SqliteDb;
use parlor_protocol::envelope::MessageNewPayload;
use parlor_protocol::{ClientEnvelope, ServerEnvelope};
use parlor_server::config::ServerConfig;
use parlor_server::Server;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WARTEZEIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

struct LaufenderServer {
    relay: String,
    api: String,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn server_starten() -> LaufenderServer {
    let db = Arc::new(SqliteDb::in_memory().await.unwrap());
    let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay.local_addr().unwrap().to_string();
    let api_addr = api.local_addr().unwrap().to_string();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(
        Server::neu(ServerConfig::default()).bedienen(db, relay, api, shutdown_rx),
    );

    LaufenderServer {
        relay: relay_addr,
        api: format!("http://{api_addr}"),
        shutdown_tx,
        handle,
    }
}

struct Teilnehmer {
    id: UserId,
    messenger: ChannelMessenger,
    ausgehend: mpsc::Sender<ClientEnvelope>,
    eingehend: mpsc::Receiver<ServerEnvelope>,
}

impl Teilnehmer {
    async fn neu(server: &LaufenderServer, name: &str) -> Self {
        let id = UserId::new();
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let directory = Arc::new(HttpKeyDirectory::neu(server.api.clone()).unwrap());

        let neu_erzeugt =
            identitaet_sicherstellen(store.as_ref(), directory.as_ref(), id, Some(name.into()))
                .await
                .unwrap();
        assert!(neu_erzeugt);

        let broker = ChannelKeyBroker::neu(store, directory as Arc<dyn KeyDirectory>);
        let codec = ChannelMessageCodec::neu(Arc::new(broker));

        let (aus_tx, aus_rx) = mpsc::channel(16);
        let (ein_tx, ein_rx) = mpsc::channel(16);
        let manager = ReconnectionManager::neu(
            TcpConnector::neu(server.relay.clone()),
            ReconnectPolicy::default(),
            id,
        );
        tokio::spawn(async move { manager.run(aus_rx, ein_tx).await });

        Self {
            id,
            messenger: ChannelMessenger::neu(codec, id, aus_tx.clone()),
            ausgehend: aus_tx,
            eingehend: ein_rx,
        }
    }

    async fn beitreten(&mut self, kanal: ChannelId) {
        self.ausgehend.send(ClientEnvelope::join(kanal)).await.unwrap();
        self.warte_auf(|u| matches!(u, ServerEnvelope::ChannelJoined(r) if r.channel_id == kanal))
            .await;
    }

    async fn naechste_nachricht(&mut self) -> MessageNewPayload {
        match self
            .warte_auf(|u| matches!(u, ServerEnvelope::MessageNew(_)))
            .await
        {
            ServerEnvelope::MessageNew(p) => p,
            _ => unreachable!(),
        }
    }

    async fn warte_auf(&mut self, pruefen: impl Fn(&ServerEnvelope) -> bool) -> ServerEnvelope {
        timeout(WARTEZEIT, async {
            loop {
                let umschlag = self.eingehend.recv().await.expect("Verbindung beendet");
                if pruefen(&umschlag) {
                    return umschlag;
                }
            }
        })
        .await
        .expect("Zeitueberschreitung beim Warten auf Umschlag")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_sendet_b_liest() {
    let server = server_starten().await;
    let mut a = Teilnehmer::neu(&server, "alice").await;
    let mut b = Teilnehmer::neu(&server, "bob").await;
    let kanal = ChannelId::new();
    let members = [a.id, b.id];

    a.beitreten(kanal).await;
    b.beitreten(kanal).await;

    a.messenger.senden(kanal, "hello", &members, None).await.unwrap();

    let bei_b = b.naechste_nachricht().await;
    assert_eq!(bei_b.sender_id, a.id);
    assert_eq!(bei_b.sender_display_name.as_deref(), Some("alice"));
    assert!(!bei_b.ciphertext.contains("hello"));
    let klar = b.messenger.entschluesseln(bei_b, &members).await;
    assert_eq!(klar.text, "hello");

    // Der Absender bekommt seine eigene Nachricht ebenfalls
    let bei_a = a.naechste_nachricht().await;
    let klar = a.messenger.entschluesseln(bei_a, &members).await;
    assert_eq!(klar.text, "hello");

    server.shutdown_tx.send(true).unwrap();
    timeout(WARTEZEIT, server.handle)
        .await
        .expect("Server nicht beendet")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn manipulierte_nachricht_ergibt_platzhalter() {
    let server = server_starten().await;
    let mut a = Teilnehmer::neu(&server, "alice").await;
    let mut b = Teilnehmer::neu(&server, "bob").await;
    let kanal = ChannelId::new();
    let members = [a.id, b.id];

    a.beitreten(kanal).await;
    b.beitreten(kanal).await;
    a.messenger.senden(kanal, "geheim", &members, None).await.unwrap();

    let mut nachricht = b.naechste_nachricht().await;
    let mut roh = engine::blob_from_base64(&nachricht.ciphertext).unwrap();
    roh[0] ^= 0x80;
    nachricht.ciphertext = engine::blob_to_base64(&roh);

    let klar = b.messenger.entschluesseln(nachricht, &members).await;
    assert_eq!(klar.text, UNDECRYPTABLE_PLACEHOLDER);

    let _ = server.shutdown_tx.send(true);
}

#[tokio::test]
async fn antwort_verweist_auf_vorige_nachricht() {
    let server = server_starten().await;
    let mut a = Teilnehmer::neu(&server, "alice").await;
    let mut b = Teilnehmer::neu(&server, "bob").await;
    let kanal = ChannelId::new();
    let members = [a.id, b.id];

    a.beitreten(kanal).await;
    b.beitreten(kanal).await;

    a.messenger.senden(kanal, "frage", &members, None).await.unwrap();
    let frage = b.naechste_nachricht().await;
    let frage_id = frage.id;

    b.messenger
        .senden(kanal, "antwort", &members, Some(frage_id))
        .await
        .unwrap();

    // A sieht zuerst die eigene Frage, dann Bs Antwort
    let _ = a.naechste_nachricht().await;
    let antwort = a.naechste_nachricht().await;
    assert_eq!(antwort.reply_to_id, Some(frage_id));
    let klar = a.messenger.entschluesseln(antwort, &members).await;
    assert_eq!(klar.text, "antwort");
    assert_eq!(klar.sender_id, b.id);

    let _ = server.shutdown_tx.send(true);
}
