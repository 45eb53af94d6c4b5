mod categories;
mod category_server;
mod items;
mod schema;
mod sources;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use category_server::CategoryServer;
pub use schema::Database;
pub use store::{CategoryStore, ContentStore};
pub use types::{
    Category, CategorySnapshot, CategoryStatus, Source, SourceStatus, StoreError, StoredItem, Tag,
};
