mod storage;

pub use storage::{MAX_MEDIA_BYTES, MediaStorage, MediaStorageError, is_valid_oid};
