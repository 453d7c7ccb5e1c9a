//! Image catalog store and manifest resolver.
//!
//! The catalog is two keys in a consistent key-value store: the multi-arch
//! image list and the unavailable-image feedback set. The scheduler reads
//! the first and feeds the second; the resolver loop drains the second back
//! into the first by asking the container registry about each image.

pub mod config;
pub mod memory;
pub mod resolver;
pub mod store;

pub use config::CatalogConfig;
pub use memory::MemoryCatalog;
pub use resolver::{CommandInspector, ManifestInspector, Resolver};
pub use store::{Catalog, CatalogStore};

/// Key of the multi-arch image list.
pub const IMAGES_KEY: &str = "/kubehice/images";

/// Key of the unavailable-image set.
pub const UNAVAILABLE_IMAGES_KEY: &str = "/kubehice/unavailableimages";
