//! Request/reply protocol between HTTP handlers and the catalog owner thread.

use tokio::sync::oneshot;

use crate::catalog_store::CatalogError;
use crate::plant::PlantRecord;

/// Reply channel carried by every catalog request.
pub type Reply<T> = oneshot::Sender<Result<T, CatalogError>>;

/// Operations accepted by the catalog manager. Each one is handled to
/// completion, persistence included, before the next is dequeued.
#[derive(Debug)]
pub enum CatalogMessage {
    Add {
        record: PlantRecord,
        reply: Reply<PlantRecord>,
    },
    Delete {
        name: String,
        reply: Reply<usize>,
    },
    List {
        reply: Reply<Vec<PlantRecord>>,
    },
    Shutdown,
}
