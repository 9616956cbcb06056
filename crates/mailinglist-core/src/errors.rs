/// Caller-side validation failure. Produced before any storage access, so a
/// request that fails with this error never reaches the store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidArgument {
    #[error("email address is empty")]
    EmptyEmail,
    #[error("malformed email address: {0}")]
    MalformedEmail(String),
    #[error("page must be >= 1, got {0}")]
    Page(i64),
    #[error("page size must be between 1 and {max}, got {actual}")]
    PageSize { actual: i64, max: i64 },
    #[error("page {page} with size {page_size} is out of range")]
    OffsetOverflow { page: i64, page_size: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(InvalidArgument::Page(0).to_string(), "page must be >= 1, got 0");
        assert_eq!(
            InvalidArgument::PageSize { actual: -3, max: 1000 }.to_string(),
            "page size must be between 1 and 1000, got -3"
        );
        assert!(InvalidArgument::MalformedEmail("nope".into())
            .to_string()
            .contains("nope"));
    }
}
