//! Stellar association catalogues and cutout figures.
//!
//! [`read_associations`] loads an association catalogue and its id mask by
//! directory convention; the [`cutouts`] module crops WCS-registered images
//! around sky positions and outlines label masks on top of them.

pub mod catalogue;
pub mod contour;
pub mod coords;
pub mod cutouts;
pub mod error;
pub mod figure;
pub mod fits;
pub mod image;
pub mod render;
pub mod reproject;
pub mod stretch;
pub mod viewer;
pub mod wcs;

pub use catalogue::{
    read_associations, read_associations_with, AssociationCatalogue, AssociationRecord, Associations,
    DataSelector,
};
pub use coords::{Angle, SkyCoord, SkyPolygon, SkyRectangle};
pub use cutouts::{
    cluster_nebulae_figure, multi_cutout, multi_page_cutout, plot_cluster_nebulae, single_cutout,
    ClusterImages, CutoutLayers,
};
pub use error::{Error, Result};
pub use figure::{Axes, Figure};
pub use image::{Cutout, LabelMask, SkyImage};
pub use wcs::Wcs;
