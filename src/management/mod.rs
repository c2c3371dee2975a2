pub mod schema;
mod session;
mod store;

pub use session::MemoryTokenStore;
pub use session::PendingAuthorization;
pub use session::SessionId;
pub use session::SessionRecord;
pub use session::TokenStore;
pub use store::SqliteStore;
