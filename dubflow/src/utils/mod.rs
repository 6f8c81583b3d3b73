//! Small shared helpers.

pub mod numerals;
pub mod timestamps;

pub use numerals::sino_numeral;
pub use timestamps::{format_iso8601, iso_timestamp, Timestamp};
