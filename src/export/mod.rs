//! Container writers.
//!
//! GLB is the primary artifact; USDZ is the optional secondary format.

pub mod gltf;
pub mod usd;

pub use gltf::{assemble_glb, write_glb};
pub use usd::{export_usda, export_usdz, UsdaExport};
