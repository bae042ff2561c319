//! Lumen Mesh - Tetrahedral geometry store for photon transport.
//!
//! This crate provides:
//!
//! - **Mesh types**: `TetMesh`, `Medium`, `Region`, `Adjacency`
//! - **Preprocessing**: winding fix-up, element/node volumes, face
//!   adjacency, source/detector element classification
//! - **Queries**: barycentric coordinates and enclosing-element search
//! - **ROI overlays**: per-edge, per-node and per-face implicit geometry data
//!
//! Preprocessing passes mutate the mesh in place and are run once, in
//! order, before transport. After that the mesh is only ever borrowed
//! immutably.
//!
//! # Example
//!
//! ```ignore
//! use lumen_mesh::{structured_box, Medium, Region};
//! use lumen_math::DVec3;
//!
//! let media = vec![Medium::ambient(1.0), Medium::new(0.01, 1.0, 0.9, 1.37)];
//! let mesh = structured_box(DVec3::ZERO, DVec3::splat(60.0), [6, 6, 6], media, |_| Region::Medium(1))?;
//! let (elem, bary) = mesh.locate_enclosing_element(DVec3::new(30.0, 30.0, 0.0)).unwrap();
//! ```

pub mod builder;
pub mod error;
pub mod medium;
pub mod mesh;
pub mod roi;
pub mod topology;

// Re-export commonly used types
pub use builder::structured_box;
pub use error::{MeshError, MeshResult};
pub use medium::{Medium, Region};
pub use mesh::TetMesh;
pub use roi::{RoiOverlay, RoiRef};
pub use topology::{Adjacency, EDGE_PAIRS, FACE_NODES};
