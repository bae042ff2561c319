use thiserror::Error;

/// Errors raised while assembling or preprocessing a mesh.
///
/// All of these are configuration errors: the mesh cannot be used for
/// transport and the run must not start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("mesh has no nodes")]
    NoNodes,

    #[error("mesh has no elements")]
    NoElements,

    #[error("media table is empty (region 0 must describe the ambient medium)")]
    NoMedia,

    #[error("{what}: expected {expected} entries, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("element {element} has {found} nodes, expected 4 or 10")]
    BadElementArity { element: usize, found: usize },

    #[error("element {element} references node {node}, mesh has {count} nodes")]
    NodeOutOfRange {
        element: usize,
        node: usize,
        count: usize,
    },

    #[error("element {element} uses region {region}, only {count} media are defined")]
    RegionOutOfRange {
        element: usize,
        region: usize,
        count: usize,
    },

    #[error("invalid region label {label} on element {element}")]
    InvalidLabel { element: usize, label: i64 },

    #[error("element {element} face {face} refers to neighbor {neighbor} outside the mesh")]
    NeighborOutOfRange {
        element: usize,
        face: usize,
        neighbor: usize,
    },

    #[error("face of element {element} is shared by more than two elements")]
    NonManifoldFace { element: usize },

    #[error("box phantom needs at least one cell per axis and a positive extent")]
    EmptyGrid,
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
