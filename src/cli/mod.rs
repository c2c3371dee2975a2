mod export;
mod serve;
mod top;

use crate::{config, error, management::SqliteStore};

pub use export::export;
pub use serve::serve;
pub use top::top;

/// Opens the local database, exits when it cannot be read.
fn open_store() -> SqliteStore {
    let path = config::database_path();
    match SqliteStore::new(&path) {
        Ok(store) => store,
        Err(e) => error!("Failed to open database {}. Err: {}", path.display(), e),
    }
}
