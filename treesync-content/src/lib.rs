//! # treesync-content
//!
//! Turns posts into export documents and back:
//!
//! - [`front_matter`]: two-phase `---` block splitter, YAML parse and render
//! - [`paths`]: tera-based export path templates per post type
//! - [`export`]: [`PostRenderer`] producing [`ExportedPost`] (path + content)
//! - [`import`]: overlaying an imported document onto a [`Post`](treesync_core::Post)
//!
//! ```rust,no_run
//! use treesync_content::PostRenderer;
//! use treesync_core::{Post, PostId};
//!
//! fn show(post: &Post) {
//!     if let Ok(renderer) = PostRenderer::with_defaults() {
//!         if let Ok(exported) = renderer.export(post) {
//!             println!("{}: {} bytes", exported.path, exported.content.len());
//!         }
//!     }
//! }
//! # show(&Post::new(PostId(1), "Hello", "body"));
//! ```

pub mod error;
pub mod export;
pub mod front_matter;
pub mod import;
pub mod paths;

pub use error::ContentError;
pub use export::{ExportedPost, PostRenderer};
pub use front_matter::{Document, FrontMatter};
pub use paths::PathTemplates;
