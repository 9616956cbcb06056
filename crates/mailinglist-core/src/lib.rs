pub mod email;
pub mod entry;
pub mod errors;
pub mod paging;

pub use email::EmailAddress;
pub use entry::SubscriberEntry;
pub use errors::InvalidArgument;
pub use paging::{PageRequest, MAX_PAGE_SIZE};
