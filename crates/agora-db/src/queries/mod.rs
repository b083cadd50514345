mod comments;
mod likes;
mod messages;
mod sessions;
mod users;

pub use likes::{parse_reaction, parse_target_kind};
pub use messages::HISTORY_PAGE_SIZE;

use crate::Result;

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Checks a free-text body: non-blank and at most `max` characters.
pub(crate) fn check_content(field: &str, content: &str, max: usize) -> Result<()> {
    let len = content.chars().count();
    if content.trim().is_empty() || len > max {
        return Err(crate::ForumError::Validation(format!(
            "{field} must be 1-{max} characters"
        )));
    }
    Ok(())
}
