//! # Message router
//!
//! Source tagged publish/subscribe core. Each registered client carries the tag it connected
//! with, and a message is forwarded to every client whose tag equals the message's `to` field.
//!
//! The router knows nothing about the transport, clients are reached through a [`ClientSink`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::mpsc::Sender;

use comms_if::envelope::recipient;
use log::{debug, trace, warn};
use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default number of clients the router accepts.
pub const DEFAULT_CAPACITY: usize = 2;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Somewhere a routed message can be delivered.
pub trait ClientSink {
    fn send_text(&mut self, text: &str) -> Result<(), RouterError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifier handed out on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

#[derive(Debug)]
pub struct RegisteredClient<C> {
    pub id: ClientId,
    pub source: String,
    conn: C,
}

/// Capacity bounded client registry and message forwarder.
#[derive(Debug)]
pub struct Router<C> {
    clients: Vec<RegisteredClient<C>>,
    capacity: usize,
    next_id: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("The router is full ({0} clients)")]
    CapacityExceeded(usize),

    #[error("Message is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Message has no string \"to\" field")]
    MissingRecipient,

    #[error("Could not serialize the message: {0}")]
    SerializationError(serde_json::Error),

    #[error("Client connection is closed")]
    ClientGone,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ClientSink for Sender<String> {
    fn send_text(&mut self, text: &str) -> Result<(), RouterError> {
        self.send(text.to_string())
            .map_err(|_| RouterError::ClientGone)
    }
}

impl<C: ClientSink> Router<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Register a client under `source`. Rejected without an entry if the router is full.
    pub fn connect(&mut self, source: &str, conn: C) -> Result<ClientId, RouterError> {
        if self.is_full() {
            warn!(
                "Rejecting client \"{}\", the router is full ({} clients)",
                source, self.capacity
            );
            return Err(RouterError::CapacityExceeded(self.capacity));
        }

        let id = ClientId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        self.clients.push(RegisteredClient {
            id,
            source: source.to_string(),
            conn,
        });

        debug!(
            "Client {:?} registered as \"{}\" ({}/{})",
            id,
            source,
            self.clients.len(),
            self.capacity
        );

        Ok(id)
    }

    /// Remove a client. The remaining clients keep their relative order.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        match self.clients.iter().position(|c| c.id == id) {
            Some(i) => {
                let client = self.clients.remove(i);
                debug!("Client {:?} (\"{}\") removed", id, client.source);
                true
            }
            None => false,
        }
    }

    /// Forward a text message to every client whose tag equals its `to` field.
    ///
    /// The message is re-serialised from the parsed document. Returns the number of clients it
    /// was delivered to; a client whose sink fails is skipped.
    pub fn route(&mut self, text: &str) -> Result<usize, RouterError> {
        let doc: Value = serde_json::from_str(text).map_err(RouterError::InvalidJson)?;

        let to = recipient(&doc).ok_or(RouterError::MissingRecipient)?;

        let out = serde_json::to_string_pretty(&doc).map_err(RouterError::SerializationError)?;

        let mut delivered = 0;
        for client in self.clients.iter_mut().filter(|c| c.source == to) {
            match client.conn.send_text(&out) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Could not forward to client {:?}: {}", client.id, e),
            }
        }

        trace!("Message for \"{}\" delivered to {} client(s)", to, delivered);

        Ok(delivered)
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tags of the registered clients in registration order.
    pub fn sources(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.source.as_str()).collect()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::sync::{
        mpsc::{channel, Receiver},
        Arc, Mutex,
    };
    use std::thread;

    fn client(router: &mut Router<Sender<String>>, tag: &str) -> (ClientId, Receiver<String>) {
        let (tx, rx) = channel();
        (router.connect(tag, tx).unwrap(), rx)
    }

    #[test]
    fn test_delivers_only_to_matching_tag() {
        let mut router = Router::new(DEFAULT_CAPACITY);
        let (_, rx_a) = client(&mut router, "A");
        let (_, rx_b) = client(&mut router, "B");

        let msg = json!({"to": "B", "data": {"action": "turn-to", "degrees": "10.000000"}});
        assert_eq!(router.route(&msg.to_string()).unwrap(), 1);

        let got: Value = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(got, msg);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_forwarded_text_is_reserialised() {
        let mut router = Router::new(DEFAULT_CAPACITY);
        let (_, rx) = client(&mut router, "B");

        router.route(r#"{"to":"B","data":{}}"#).unwrap();
        let text = rx.try_recv().unwrap();

        assert!(text.contains('\n'));
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"to": "B", "data": {}})
        );
    }

    #[test]
    fn test_no_match_and_empty_router() {
        let mut router: Router<Sender<String>> = Router::new(DEFAULT_CAPACITY);
        assert_eq!(router.route(r#"{"to":"B"}"#).unwrap(), 0);

        let (_, rx_a) = client(&mut router, "A");
        assert_eq!(router.route(r#"{"to":"C"}"#).unwrap(), 0);
        assert_eq!(router.route(r#"{"to":"a"}"#).unwrap(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_bad_messages() {
        let mut router: Router<Sender<String>> = Router::new(DEFAULT_CAPACITY);

        assert!(matches!(
            router.route("{not json"),
            Err(RouterError::InvalidJson(_))
        ));
        assert!(matches!(
            router.route(r#"{"data":{}}"#),
            Err(RouterError::MissingRecipient)
        ));
        assert!(matches!(
            router.route(r#"{"to":5}"#),
            Err(RouterError::MissingRecipient)
        ));
    }

    #[test]
    fn test_capacity() {
        let mut router = Router::new(2);
        let (id_a, _rx_a) = client(&mut router, "A");
        let (_, _rx_b) = client(&mut router, "B");

        let (tx, _rx) = channel();
        assert!(matches!(
            router.connect("C", tx),
            Err(RouterError::CapacityExceeded(2))
        ));
        assert_eq!(router.sources(), vec!["A", "B"]);

        // A slot frees up on disconnect
        assert!(router.disconnect(id_a));
        let (_, _rx_c) = client(&mut router, "C");
        assert_eq!(router.sources(), vec!["B", "C"]);
    }

    #[test]
    fn test_stable_removal() {
        let mut router = Router::new(5);
        let ids: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|t| client(&mut router, t))
            .collect();

        assert!(router.disconnect(ids[1].0));
        assert!(router.disconnect(ids[3].0));
        assert!(!router.disconnect(ids[3].0));

        assert_eq!(router.sources(), vec!["A", "C", "E"]);
    }

    #[test]
    fn test_dead_client_skipped() {
        let mut router = Router::new(3);
        let (_, rx_1) = client(&mut router, "B");
        let (_, rx_2) = client(&mut router, "B");
        drop(rx_1);

        assert_eq!(router.route(r#"{"to":"B"}"#).unwrap(), 1);
        assert!(rx_2.try_recv().is_ok());
    }

    #[test]
    fn test_concurrent_connect_route_disconnect() {
        const THREADS: usize = 8;
        const ITERATIONS: usize = 200;

        let router = Arc::new(Mutex::new(Router::new(THREADS + 1)));
        let (tx_b, rx_b) = channel();
        router.lock().unwrap().connect("B", tx_b).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let router = router.clone();
                thread::spawn(move || {
                    let tag = format!("worker-{}", i);
                    for _ in 0..ITERATIONS {
                        let (tx, rx) = channel();
                        let id = router.lock().unwrap().connect(&tag, tx).unwrap();

                        let msg = format!(r#"{{"to":"{}"}}"#, tag);
                        assert_eq!(router.lock().unwrap().route(&msg).unwrap(), 1);
                        assert_eq!(router.lock().unwrap().route(r#"{"to":"B"}"#).unwrap(), 1);
                        assert!(rx.try_recv().is_ok());

                        assert!(router.lock().unwrap().disconnect(id));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(rx_b.try_iter().count(), THREADS * ITERATIONS);
        assert_eq!(router.lock().unwrap().sources(), vec!["B"]);
    }
}
