pub mod config;
pub mod context;
pub mod error;
pub mod types;

pub use config::Config;
pub use context::youtube_video_id;
pub use error::CommentLensError;
pub use types::*;
