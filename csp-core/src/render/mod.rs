//! HTML rendering of domain views and the landing page
//!
//! Output depends only on the inputs, so rendering an unchanged ledger twice
//! yields byte-identical pages.

mod html;
pub mod landing;
pub mod view;

pub use landing::render_index;
pub use view::render_view;

/// Default stylesheet written next to the rendered pages
pub const STYLES_CSS: &str = include_str!("../../assets/styles.css");

/// Default script for collapsible entries, search and deletion
pub const SCRIPTS_JS: &str = include_str!("../../assets/scripts.js");
