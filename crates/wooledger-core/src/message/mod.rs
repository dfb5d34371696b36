//! Archived message records.
//!
//! A [`MessageRecord`] is the metadata index's view of one archived e-mail:
//! who sent it to whom, when, under which classification, and which terms it
//! can be found by. The raw message itself lives in the archive store under
//! [`MessageRecord::body_ref`].

mod model;

pub use model::{
    DateRange, MessageId, MessageRecord, NewMessage, Sender, TermSet, Tier, object_key,
};
