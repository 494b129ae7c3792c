//! Scene modes.
//!
//! Each sample exposes a small closed set of variants. Every variant's
//! pipelines and pass sequences are built once at setup; switching modes only
//! changes which pre-built sequence gets recorded.

use serde::Deserialize;

/// A closed, enumerable set of runtime-selectable modes.
pub trait SceneMode: Copy + Eq + std::fmt::Debug + 'static {
    /// Every variant, in cycling order.
    const ALL: &'static [Self];

    /// Short human-readable label used in logs.
    fn label(self) -> &'static str;

    /// The variant after `self`, wrapping around.
    fn next(self) -> Self {
        let position = Self::ALL
            .iter()
            .position(|&mode| mode == self)
            .unwrap_or(0);
        Self::ALL[(position + 1) % Self::ALL.len()]
    }
}

/// How the sampled environment cubemap is produced each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CubemapMode {
    /// Sample a cubemap uploaded once at setup.
    #[default]
    Static,
    /// Render the six faces with six render passes.
    MultiPass,
    /// Render all six faces in one layered render pass.
    SinglePass,
}

impl SceneMode for CubemapMode {
    const ALL: &'static [Self] = &[Self::Static, Self::MultiPass, Self::SinglePass];

    fn label(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::MultiPass => "multi-pass",
            Self::SinglePass => "single-pass",
        }
    }
}

/// Geometry-shader sample draw modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    /// Faceted shading computed per primitive.
    #[default]
    Flat,
    /// Smooth shading plus generated normal-vector lines.
    NormalVector,
}

impl SceneMode for DrawMode {
    const ALL: &'static [Self] = &[Self::Flat, Self::NormalVector];

    fn label(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::NormalVector => "normal-vector",
        }
    }
}

/// Image filter applied by the compute sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    Sepia,
    Sobel,
}

impl SceneMode for FilterKind {
    const ALL: &'static [Self] = &[Self::Sepia, Self::Sobel];

    fn label(self) -> &'static str {
        match self {
            Self::Sepia => "sepia",
            Self::Sobel => "sobel",
        }
    }
}

/// Polygon fill of the tessellated ground.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TessellationMode {
    Solid,
    /// Draws the generated triangles as lines, which shows the subdivision.
    #[default]
    Wireframe,
}

impl SceneMode for TessellationMode {
    const ALL: &'static [Self] = &[Self::Solid, Self::Wireframe];

    fn label(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Wireframe => "wireframe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_cycles_through_all_variants() {
        assert_eq!(CubemapMode::Static.next(), CubemapMode::MultiPass);
        assert_eq!(CubemapMode::MultiPass.next(), CubemapMode::SinglePass);
        assert_eq!(CubemapMode::SinglePass.next(), CubemapMode::Static);
        assert_eq!(DrawMode::NormalVector.next(), DrawMode::Flat);
        assert_eq!(FilterKind::Sepia.next(), FilterKind::Sobel);
        assert_eq!(TessellationMode::Wireframe.next(), TessellationMode::Solid);
    }

    #[test]
    fn test_labels_are_distinct() {
        let labels: Vec<_> = CubemapMode::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(labels, ["static", "multi-pass", "single-pass"]);
    }
}
