//! HueSlicer: a streaming geometry pipeline that decomposes large
//! relief-style meshes into per-tile meshes small enough for a consumer 3D
//! printer's bed, either by a DP-found seam plus streaming triangle clipper
//! (the tiled branch) or by watershed segmentation plus boundary tracing
//! (the alternative branch).

pub mod boundary;
pub mod clip;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod geom;
pub mod heightmap;
pub mod mask;
pub mod mesh;
pub mod pipeline;
pub mod seam;
pub mod watershed;

pub use config::{CoreConfig, LayoutMode};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use error::{HueSlicerError, Result};
pub use pipeline::{Pipeline, PipelineOutput};
