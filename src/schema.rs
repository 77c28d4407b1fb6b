//! Names of the reserved sub-databases and the reserved keys inside
//! `queue_db`. Subscriber sub-databases are named dynamically after the
//! subscriber identifier and are not listed here.

pub const DATA_DB: &str = "data_db";
pub const META_DB: &str = "meta_db";
pub const PENDING_DB: &str = "pending_db";
pub const QUEUE_DB: &str = "queue_db";
pub const SUBSCRIBER_DB: &str = "subscriber_db";

pub const MESSAGE_TIMEOUT_KEY: &[u8] = b"message_timeout";
pub const MAX_MESSAGES_KEY: &[u8] = b"max_messages";
pub const HWM_DB_SIZE_KEY: &[u8] = b"hwm_db_size";
pub const STRATEGY_KEY: &[u8] = b"strategy";

pub const PRUNE_FIRST_NAME: &str = "PRUNE_FIRST";
pub const PRUNE_LAST_NAME: &str = "PRUNE_LAST";

/// A subscriber identifier must not contain spaces; reserved sub-db names
/// collide with nothing a caller can name since all of them already contain
/// an underscore, but we still guard against accidental reuse.
pub fn is_valid_subscriber_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(' ')
}
