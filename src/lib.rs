// ABOUTME: Public library API for crossblog
// ABOUTME: Re-exports core modules so the binary and integration tests share them

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod frontmatter;
pub mod git;
pub mod model;
pub mod platforms;
pub mod publish;
pub mod storage;
pub mod summary;
pub mod util;
pub mod watch;

pub use error::{Error, Result};
pub use frontmatter::FrontmatterMapping;
pub use model::{Post, TransferOptions};
