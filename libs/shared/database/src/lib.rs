pub mod error;
pub mod retry;
pub mod supabase;

pub use error::DbError;
pub use retry::with_read_retry;
