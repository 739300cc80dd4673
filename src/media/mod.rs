// Encoder process plumbing
//
// - commands: argument builder and process launch with merged output
// - stream: splitting raw encoder output into lines
// - probe: reading duration and stream details from an input banner

pub mod commands;
pub mod probe;
pub mod stream;

pub use commands::*;
pub use probe::{estimate_total_seconds, parse_media_info, probe, MediaInfo};
pub use stream::LineSplitter;
