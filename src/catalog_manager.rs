//! Catalog runtime component.
//!
//! One manager thread owns the [`CatalogStore`] and drains a request queue,
//! so add, delete and persist never overlap and list always sees a state
//! between two whole operations. Handlers talk to it through a cloneable
//! [`CatalogHandle`].

use std::thread;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};

use crate::catalog_store::{CatalogError, CatalogStore};
use crate::plant::PlantRecord;
use crate::protocol::{CatalogMessage, Reply};

pub struct CatalogManager {
    store: CatalogStore,
    requests: mpsc::UnboundedReceiver<CatalogMessage>,
}

impl CatalogManager {
    pub fn new(store: CatalogStore, requests: mpsc::UnboundedReceiver<CatalogMessage>) -> Self {
        Self { store, requests }
    }

    /// Starts the owner thread and returns the handle used to reach it.
    pub fn spawn(store: CatalogStore) -> Result<CatalogHandle, String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        info!(
            "Catalog: serving {} plants from {}",
            store.len(),
            store.path().display()
        );
        let mut manager = Self::new(store, receiver);
        thread::Builder::new()
            .name("catalog".to_string())
            .spawn(move || manager.run())
            .map_err(|err| format!("failed to spawn catalog thread: {err}"))?;
        Ok(CatalogHandle { sender })
    }

    fn respond<T>(reply: Reply<T>, result: Result<T, CatalogError>) {
        if reply.send(result).is_err() {
            debug!("Catalog: requester went away before the reply was sent");
        }
    }

    fn handle_message(&mut self, message: CatalogMessage) -> bool {
        match message {
            CatalogMessage::Add { record, reply } => {
                Self::respond(reply, self.store.add(record));
            }
            CatalogMessage::Delete { name, reply } => {
                Self::respond(reply, self.store.delete(&name));
            }
            CatalogMessage::List { reply } => {
                Self::respond(reply, Ok(self.store.list()));
            }
            CatalogMessage::Shutdown => return false,
        }
        true
    }

    /// Processes requests until shutdown or until every handle is dropped.
    pub fn run(&mut self) {
        while let Some(message) = self.requests.blocking_recv() {
            if !self.handle_message(message) {
                break;
            }
        }
        info!("Catalog: manager stopped");
    }
}

/// Cloneable async front door to the catalog manager.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    sender: mpsc::UnboundedSender<CatalogMessage>,
}

impl CatalogHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CatalogMessage,
    ) -> Result<T, CatalogError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| CatalogError::Unavailable)?;
        response.await.map_err(|_| CatalogError::Unavailable)?
    }

    pub async fn add(&self, record: PlantRecord) -> Result<PlantRecord, CatalogError> {
        self.request(|reply| CatalogMessage::Add { record, reply })
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<usize, CatalogError> {
        let name = name.to_string();
        self.request(|reply| CatalogMessage::Delete { name, reply })
            .await
    }

    pub async fn list(&self) -> Result<Vec<PlantRecord>, CatalogError> {
        self.request(|reply| CatalogMessage::List { reply }).await
    }

    /// Asks the manager thread to exit after finishing queued requests.
    pub fn shutdown(&self) {
        let _ = self.sender.send(CatalogMessage::Shutdown);
    }
}
