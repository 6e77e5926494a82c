/// Why a story access check did not allow the request.
///
/// Variants are ordered by precedence: evaluation stops at the first one that
/// applies, so an unauthenticated caller never learns whether a story exists.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Authentication required.")]
    Unauthenticated,

    #[error("Invalid story ID.")]
    InvalidInput,

    #[error("Story not found.")]
    NotFound,

    /// Deliberately silent about which relation the caller is missing.
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    /// The relation lookup itself failed. Not retried here.
    #[error("Authorization check failed.")]
    Unexpected(anyhow::Error),
}

impl AccessError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::Unexpected(_) => 500,
        }
    }
}
