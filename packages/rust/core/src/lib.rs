//! Domain logic for drivedb.
//!
//! - [`tree`]: the vehicle configuration tree (fork, copy, propagate, destroy)
//! - [`matrix`] and [`status`]: derived presentation of a configuration
//! - [`vehicles`]: tree operations persisted through storage
//! - [`article`], [`render`], [`guide`]: the guide save pipeline
//! - [`slug`]: hash-suffixed slugs for both record kinds

pub mod article;
pub mod guide;
pub mod matrix;
pub mod render;
pub mod slug;
pub mod status;
pub mod tree;
pub mod vehicles;

pub use guide::{GuidePipeline, SaveReport};
pub use render::MarkdownRenderer;
pub use tree::{ConfigTree, NewConfig};
pub use vehicles::{AddVehicle, ConfigView, Vehicles};
