pub mod bootstrap;
pub mod report_writer;

pub use bootstrap::{build_collaborators, build_controller};
pub use report_writer::{render_json, render_text, write_report, WriteOptions};
