//! Small helpers for timestamps, execution ids and list parsing.

mod ids;
pub mod timestamps;
mod text;

pub use ids::generate_execution_id;
pub use text::{is_valid_task_name, split_csl, title_case};
pub use timestamps::{elapsed_ms, format_timestamp, iso_timestamp, now_utc, Timestamp};
