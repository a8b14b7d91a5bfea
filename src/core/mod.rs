pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ExpiryError, Result};
pub use types::{
    Document, EXPIRE_AT_FIELD, ID_FIELD, RecordId, STATUS_FIELD, decode_deadline,
    encode_deadline,
};
