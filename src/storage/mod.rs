pub mod memory;
pub mod persistence;
pub mod table;

pub use memory::{IdSequences, InMemoryStorage, RowKey};
pub use persistence::{
    DurabilityMode, JournalEntry, JournalManager, PersistenceManager, SnapshotManager,
    StoreSnapshot,
};
pub use table::{Table, Versioned};
