pub mod memory;
pub mod pg_attempts;
pub mod pg_content;
pub mod pool;
pub mod store;

pub use memory::{MemoryAttemptStore, MemoryContentStore};
pub use pg_attempts::PgAttemptStore;
pub use pg_content::PgContentStore;
pub use store::{load_content, AttemptStore, ContentStore};
