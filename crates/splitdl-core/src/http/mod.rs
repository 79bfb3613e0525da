//! HTTP collaborator: HEAD metadata and Range source, both on libcurl.

mod head;
mod source;

pub use head::{fetch_head, HeadInfo};
pub use source::HttpSourceFactory;
