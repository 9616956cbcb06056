pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod subscribers;

pub use database::Database;
pub use error::StoreError;
pub use subscribers::SubscriberRepo;
