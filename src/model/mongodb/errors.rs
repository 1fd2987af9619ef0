//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error, from either
/// a single or a bulk write.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        _ => false,
    }
}
