//! Cutout figures: image crops around sky positions with label-mask
//! outlines and point markers overlaid.

use crate::contour::{find_contours, label_contours, BINARY_LEVEL};
use crate::coords::{Angle, SkyCoord, SkyPolygon, SkyRectangle};
use crate::error::{Error, Result};
use crate::figure::{
    Axes, Color, Figure, Line, Marker, Raster, ScaleBar, Scatter, TextBox, BLACK, TAB_BLUE,
    TAB_RED, WHITE,
};
use crate::image::{Cutout, LabelMask, SkyImage};
use crate::render;
use crate::reproject::{isolate_label, reproject_nearest, unique_labels};
use crate::stretch::{colorize, create_rgb, Colormap, ImageNorm, Interval, Stretch};
use crate::viewer;
use crate::wcs::Wcs;
use ndarray::Array2;
use std::path::Path;

/// Figure widths in inches.
pub const TWO_COLUMN: f64 = 6.974;
pub const A4_WIDTH: f64 = 8.27;

pub const GRID_DPI: f64 = 300.0;
pub const CLUSTER_DPI: f64 = 600.0;

pub const DEFAULT_NCOLS: usize = 4;
pub const DEFAULT_NROWS: usize = 5;

/// Edge length of the cutouts in grid figures.
pub fn default_size() -> Angle {
    Angle::from_arcsec(4.0)
}

/// Points closer than this many pixels to a cutout edge are not marked.
const EDGE_MARGIN: f64 = 5.0;
const LEGEND_CAPTION: &str = "region ID/assoc ID";

struct MaskStyle {
    color: Color,
    fill: [f64; 4],
    label: &'static str,
}

const NEBULAE: MaskStyle = MaskStyle {
    color: TAB_RED,
    fill: [0.84, 0.15, 0.16, 0.1],
    label: "HII-region",
};

const ASSOCIATIONS: MaskStyle = MaskStyle {
    color: TAB_BLUE,
    fill: [0.12, 0.47, 0.71, 0.1],
    label: "association",
};

/// Inputs shared by every panel of a cutout grid.
#[derive(Clone, Copy)]
pub struct CutoutLayers<'a> {
    pub image: &'a SkyImage,
    /// Outlined in red, e.g. the nebula catalogue.
    pub mask1: &'a LabelMask,
    /// Outlined in blue, e.g. the associations.
    pub mask2: Option<&'a LabelMask>,
    pub points: Option<&'a [SkyCoord]>,
}

/// Draw one cutout of `layers.image` centred on `position` into `ax`.
///
/// The image is shown with a linear 99.5 % stretch in reversed grey. Every
/// label of each mask, resampled onto the cutout grid, is outlined and the
/// labelled area tinted. Points inside 90 % of the cutout are marked unless
/// they lie within a few pixels of an edge.
pub fn single_cutout(
    mut ax: Axes,
    position: SkyCoord,
    layers: &CutoutLayers<'_>,
    label: Option<&str>,
    size: Angle,
) -> Result<Axes> {
    let cutout = Cutout::new(layers.image, position, size)?;
    let norm = ImageNorm::simple(&cutout.data, Stretch::Linear, Interval::Percent(99.5));
    ax.imshow(colorize(&cutout.data, &norm, Colormap::GrayR));

    outline_mask(&mut ax, layers.mask1, &cutout, &NEBULAE);
    if let Some(mask2) = layers.mask2 {
        outline_mask(&mut ax, mask2, &cutout, &ASSOCIATIONS);
    }
    if let Some(points) = layers.points {
        mark_points(&mut ax, points, &cutout, size);
    }
    if let Some(label) = label {
        ax.text(TextBox {
            x: 0.06,
            y: 0.87,
            text: label.to_string(),
            size: 8.0,
            color: BLACK,
            background: Some(WHITE),
        });
    }
    Ok(ax)
}

fn outline_mask(ax: &mut Axes, mask: &LabelMask, cutout: &Cutout, style: &MaskStyle) {
    let labels = reproject_nearest(mask, &cutout.wcs, cutout.shape());
    for contour in label_contours(&labels) {
        ax.plot(
            Line::new(contour.xy(), style.color)
                .width(1.0)
                .label(style.label),
        );
    }
    let [r, g, b, a] = style.fill;
    ax.overlay_rgba(tint(&labels, Color::from_fractions(r, g, b, a)));
}

/// Uniform colour over every labelled pixel, transparent elsewhere.
fn tint(labels: &Array2<f64>, color: Color) -> Raster {
    let (rows, cols) = labels.dim();
    let on = [color.r, color.g, color.b, (color.alpha * 255.0).round() as u8];
    let pixels = labels
        .iter()
        .map(|v| if v.is_nan() { [0; 4] } else { on })
        .collect();
    Raster::new(cols, rows, pixels)
}

fn mark_points(ax: &mut Axes, points: &[SkyCoord], cutout: &Cutout, size: Angle) {
    let region = SkyRectangle::new(cutout.position, size * 0.9, size * 0.9);
    let (rows, cols) = cutout.shape();
    let inside = |v: f64, n: usize| EDGE_MARGIN < v && v < n as f64 - EDGE_MARGIN;
    let kept: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| region.contains(**p, &cutout.wcs))
        .map(|p| p.to_pixel(&cutout.wcs))
        .filter(|&(x, y)| inside(x, cols) && inside(y, rows))
        .collect();
    log::debug!("{} of {} points marked", kept.len(), points.len());
    if !kept.is_empty() {
        ax.scatter(Scatter {
            points: kept,
            marker: Marker::Circle,
            size: 20.0,
            width: 0.4,
            color: TAB_BLUE,
            label: Some("cluster".into()),
        });
    }
}

/// Grid of `nrows x ncols` panels filled with cutouts in row-major order.
fn cutout_grid(
    positions: &[SkyCoord],
    labels: Option<&[String]>,
    layers: &CutoutLayers<'_>,
    size: Angle,
    nrows: usize,
    ncols: usize,
    width: f64,
) -> Result<Figure> {
    let mut fig = Figure::grid(nrows, ncols, width, width / ncols as f64 * nrows as f64);
    fig.subplots_adjust(-0.1, 0.0);
    for (i, &position) in positions.iter().enumerate() {
        let label = labels.and_then(|l| l.get(i)).map(String::as_str);
        let ax = single_cutout(Axes::new(), position, layers, label, size)?;
        fig.set_axes(i, ax);
    }
    Ok(fig)
}

fn check_grid(positions: &[SkyCoord], ncols: usize) -> Result<()> {
    if positions.is_empty() {
        return Err(Error::Shape("no cutout positions given".into()));
    }
    if ncols == 0 {
        return Err(Error::Shape("ncols must be at least 1".into()));
    }
    Ok(())
}

/// Cutouts for all `positions` in a grid `ncols` wide; unused cells are
/// removed. Saved as PNG at [`GRID_DPI`] when `filename` is given, shown in
/// a window otherwise.
pub fn multi_cutout(
    positions: &[SkyCoord],
    layers: &CutoutLayers<'_>,
    labels: Option<&[String]>,
    filename: Option<&Path>,
    size: Angle,
    ncols: usize,
) -> Result<Figure> {
    check_grid(positions, ncols)?;
    let nrows = positions.len().div_ceil(ncols);
    let mut fig = cutout_grid(positions, labels, layers, size, nrows, ncols, TWO_COLUMN)?;
    for i in positions.len()..nrows * ncols {
        fig.remove(i);
    }

    match filename {
        Some(path) => {
            render::save_png(&fig, path, GRID_DPI)?;
        }
        None => viewer::show(&fig, "cutouts")?,
    }
    Ok(fig)
}

/// Cutouts paginated into `nrows x ncols` pages, all written to one PDF
/// document, one page each. The unused cells of the last page hold the legend and caption.
pub fn multi_page_cutout(
    positions: &[SkyCoord],
    layers: &CutoutLayers<'_>,
    labels: Option<&[String]>,
    filename: &Path,
    size: Angle,
    nrows: usize,
    ncols: usize,
) -> Result<Vec<Figure>> {
    check_grid(positions, ncols)?;
    if nrows == 0 {
        return Err(Error::Shape("nrows must be at least 1".into()));
    }
    let per_page = nrows * ncols;
    let npages = positions.len().div_ceil(per_page);

    let mut pages = Vec::with_capacity(npages);
    for page in 0..npages {
        println!("working on page {} of {npages}", page + 1);
        let start = page * per_page;
        let end = (start + per_page).min(positions.len());
        let page_labels = labels.map(|l| &l[start.min(l.len())..end.min(l.len())]);
        let mut fig = cutout_grid(
            &positions[start..end],
            page_labels,
            layers,
            size,
            nrows,
            ncols,
            A4_WIDTH,
        )?;

        let used = end - start;
        if page + 1 == npages && used < per_page {
            let handles = fig
                .axes(0)
                .map(Axes::legend_handles)
                .unwrap_or_default();
            let picked = match handles.len() {
                0 | 1 => handles,
                n => vec![handles[0].clone(), handles[n - 1].clone()],
            };
            let mut legend = Axes::new();
            legend.axis_off();
            legend.legend(picked, 7.0);
            legend.text(TextBox {
                x: 0.06,
                y: 0.87,
                text: LEGEND_CAPTION.to_string(),
                size: 8.0,
                color: BLACK,
                background: None,
            });
            fig.set_axes(used, legend);
            for i in used + 1..per_page {
                if let Some(ax) = fig.cell_mut(i) {
                    ax.axis_off();
                }
            }
        }
        pages.push(fig);
    }

    render::save_pdf_pages(&pages, filename)?;
    Ok(pages)
}

/// Bar of `length` in the lower-left corner of `ax`, drawn on the pixel
/// grid of `wcs`.
pub fn add_scale(ax: &mut Axes, wcs: &Wcs, length: Angle, label: &str) {
    let (scale_x, _) = wcs.pixel_scales();
    ax.scale_bar(ScaleBar {
        length: length.deg() / scale_x.deg(),
        label: label.to_string(),
        color: BLACK,
    });
}

/// Images shown by [`plot_cluster_nebulae`].
#[derive(Clone, Copy)]
pub struct ClusterImages<'a> {
    pub f275: &'a SkyImage,
    pub halpha: &'a SkyImage,
    pub astrosat: &'a SkyImage,
    pub sdss_g: &'a SkyImage,
    pub sdss_r: &'a SkyImage,
    pub sdss_i: &'a SkyImage,
}

/// Outlines of every label of `labels`, split by membership in `hii`.
fn classified_contours(labels: &Array2<f64>, hii: &[i64]) -> (Vec<Line>, Vec<Line>) {
    let mut hii_lines = Vec::new();
    let mut other_lines = Vec::new();
    for label in unique_labels(labels) {
        let is_hii = hii.contains(&(label.round() as i64));
        for contour in find_contours(&isolate_label(labels, label), BINARY_LEVEL) {
            let line = Line::new(contour.xy(), BLACK);
            if is_hii {
                hii_lines.push(line);
            } else {
                other_lines.push(line.dashed());
            }
        }
    }
    (hii_lines, other_lines)
}

fn draw_classified(ax: &mut Axes, labels: &Array2<f64>, hii: &[i64], color: Color, width: f64) {
    let (hii_lines, other_lines) = classified_contours(labels, hii);
    for mut line in hii_lines.into_iter().chain(other_lines) {
        line.color = color;
        line.width = width;
        ax.plot(line);
    }
}

/// Four panels around one object: the whole galaxy in colour with the HST
/// footprint, the FUV cutout with a scale bar, the Hα cutout with the nebula
/// outlines, and the F275W cutout with nebula and association outlines.
/// Nebulae whose id is in `hii_regions` are drawn solid, the others dashed.
///
/// Written as PNG at [`CLUSTER_DPI`] and as PDF when `filename` is given,
/// shown in a window otherwise.
#[allow(clippy::too_many_arguments)]
pub fn plot_cluster_nebulae(
    name: &str,
    position: SkyCoord,
    size: Angle,
    images: &ClusterImages<'_>,
    sky_region: &SkyPolygon,
    nebulae_mask: &LabelMask,
    associations_mask: &LabelMask,
    hii_regions: &[i64],
    filename: Option<&Path>,
) -> Result<Figure> {
    let fig = cluster_nebulae_figure(
        name,
        position,
        size,
        images,
        sky_region,
        nebulae_mask,
        associations_mask,
        hii_regions,
    )?;
    match filename {
        Some(path) => {
            log::info!("save image to file {}", path.with_extension("pdf").display());
            render::save_png(&fig, path, CLUSTER_DPI)?;
            render::save_pdf(&fig, path)?;
        }
        None => viewer::show(&fig, name)?,
    }
    Ok(fig)
}

/// The figure of [`plot_cluster_nebulae`] without writing or showing it.
#[allow(clippy::too_many_arguments)]
pub fn cluster_nebulae_figure(
    name: &str,
    position: SkyCoord,
    size: Angle,
    images: &ClusterImages<'_>,
    sky_region: &SkyPolygon,
    nebulae_mask: &LabelMask,
    associations_mask: &LabelMask,
    hii_regions: &[i64],
) -> Result<Figure> {
    log::debug!("{name} at {}", position.to_hmsdms(2));
    let hst = Cutout::new(images.f275, position, size)?;
    let halpha = Cutout::new(images.halpha, position, size)?;
    let fuv = Cutout::new(images.astrosat, position, size)?;

    let mut fig = Figure::grid(1, 4, TWO_COLUMN, TWO_COLUMN / 4.0);
    fig.subplots_adjust(0.0, 0.0);

    // whole galaxy in the Hα frame
    let frame = &images.halpha.wcs;
    let shape = images.halpha.shape();
    let gri = create_rgb(
        &reproject_nearest(images.sdss_i, frame, shape),
        &reproject_nearest(images.sdss_r, frame, shape),
        &reproject_nearest(images.sdss_g, frame, shape),
        [1.0, 1.0, 1.0],
        [99.0, 99.0, 99.0],
    )?;
    let mut ax1 = Axes::new();
    ax1.imshow(gri);
    ax1.plot(Line::new(sky_region.to_pixel(frame), TAB_RED).width(0.5).label("HST"));
    ax1.scatter(Scatter {
        points: vec![position.to_pixel(frame)],
        marker: Marker::Square,
        size: 10.0,
        width: 0.5,
        color: TAB_RED,
        label: None,
    });
    ax1.set_title(name);

    let mut ax2 = Axes::new();
    let norm = ImageNorm::simple(&fuv.data, Stretch::Linear, Interval::MinMax);
    ax2.imshow(colorize(&fuv.data, &norm, Colormap::Blues));
    ax2.set_title("Astrosat (FUV)");
    add_scale(&mut ax2, &fuv.wcs, Angle::from_arcsec(1.0), "1'");

    let mut ax3 = Axes::new();
    let norm = ImageNorm::simple(
        &halpha.data,
        Stretch::ASINH,
        Interval::Asymmetric {
            min_percent: None,
            max_percent: Some(98.0),
        },
    );
    ax3.imshow(colorize(&halpha.data, &norm, Colormap::Reds));
    ax3.set_title("MUSE (Hα)");
    let nebulae_muse = reproject_nearest(nebulae_mask, &halpha.wcs, halpha.shape());
    draw_classified(&mut ax3, &nebulae_muse, hii_regions, BLACK, 0.2);

    let mut ax4 = Axes::new();
    let norm = ImageNorm::simple(
        &hst.data,
        Stretch::Linear,
        Interval::Asymmetric {
            min_percent: None,
            max_percent: Some(99.8),
        },
    );
    ax4.imshow(colorize(&hst.data, &norm, Colormap::GrayR));
    ax4.set_title("HST (F275)");
    let nebulae_hst = reproject_nearest(nebulae_mask, &hst.wcs, hst.shape());
    draw_classified(&mut ax4, &nebulae_hst, hii_regions, TAB_BLUE, 0.2);
    let assoc_hst = reproject_nearest(associations_mask, &hst.wcs, hst.shape());
    for contour in label_contours(&assoc_hst) {
        ax4.plot(Line::new(contour.xy(), TAB_RED).width(0.5));
    }

    for (i, ax) in [ax1, ax2, ax3, ax4].into_iter().enumerate() {
        fig.set_axes(i, ax);
    }
    Ok(fig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::Header;

    fn wcs(n: usize) -> Wcs {
        Wcs::tan(
            (n as f64 / 2.0 + 0.5, n as f64 / 2.0 + 0.5),
            SkyCoord::new(24.17, 15.78),
            Angle::from_arcsec(0.1),
        )
        .unwrap()
    }

    fn image(n: usize) -> SkyImage {
        let data = Array2::from_shape_fn((n, n), |(r, c)| ((r * 7 + c * 3) % 11) as f64);
        SkyImage::new(data, Header::default(), wcs(n))
    }

    fn blob_mask(n: usize, centre: (usize, usize), label: f64) -> LabelMask {
        let mut data = Array2::zeros((n, n));
        for r in centre.1 - 3..=centre.1 + 3 {
            for c in centre.0 - 3..=centre.0 + 3 {
                data[[r, c]] = label;
            }
        }
        LabelMask::from_label_image(data, Header::default(), wcs(n))
    }

    #[test]
    fn one_label_gives_one_ring() {
        let img = image(100);
        let mask = blob_mask(100, (50, 50), 3.0);
        let layers = CutoutLayers {
            image: &img,
            mask1: &mask,
            mask2: None,
            points: None,
        };
        let centre = img.wcs.pixel_to_world(50.3, 50.3);
        let ax = single_cutout(Axes::new(), centre, &layers, Some("3"), default_size()).unwrap();
        assert_eq!(ax.contours("HII-region"), 1);
        let ring = ax.lines().next().unwrap();
        assert_eq!(ring.points.first(), ring.points.last());
        assert_eq!(ax.texts().next().unwrap().text, "3");
    }

    #[test]
    fn second_mask_is_blue() {
        let img = image(100);
        let nebula = blob_mask(100, (45, 45), 1.0);
        let assoc = blob_mask(100, (56, 56), 9.0);
        let layers = CutoutLayers {
            image: &img,
            mask1: &nebula,
            mask2: Some(&assoc),
            points: None,
        };
        let centre = img.wcs.pixel_to_world(50.3, 50.3);
        let ax = single_cutout(Axes::new(), centre, &layers, None, default_size()).unwrap();
        assert_eq!(ax.contours("HII-region"), 1);
        assert_eq!(ax.contours("association"), 1);
        let labels: Vec<String> = ax.legend_handles().into_iter().map(|h| h.label).collect();
        assert_eq!(labels, ["HII-region", "association"]);
    }

    #[test]
    fn points_near_the_edge_are_dropped() {
        let img = image(100);
        let mask = blob_mask(100, (50, 50), 3.0);
        // cutout of 40 px starting at pixel 31
        let centre = img.wcs.pixel_to_world(50.3, 50.3);
        let near_edge = img.wcs.pixel_to_world(31.0 + 37.0, 50.0);
        let well_inside = img.wcs.pixel_to_world(31.0 + 15.0, 31.0 + 20.0);
        let points = [near_edge, well_inside];
        let layers = CutoutLayers {
            image: &img,
            mask1: &mask,
            mask2: None,
            points: Some(&points),
        };
        let ax = single_cutout(Axes::new(), centre, &layers, None, default_size()).unwrap();
        let marked: Vec<(f64, f64)> = ax.markers().flat_map(|m| m.points.clone()).collect();
        assert_eq!(marked.len(), 1);
        assert!((marked[0].0 - 15.0).abs() < 1e-6);
    }

    #[test]
    fn tint_is_transparent_outside_labels() {
        let labels = Array2::from_shape_vec((1, 2), vec![f64::NAN, 4.0]).unwrap();
        let raster = tint(&labels, Color::from_fractions(0.84, 0.15, 0.16, 0.1));
        assert_eq!(raster.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(raster.pixel(0, 1), [214, 38, 41, 26]);
    }

    #[test]
    fn hii_membership_sets_line_style() {
        let mut labels = Array2::from_elem((12, 12), f64::NAN);
        for r in 2..5 {
            for c in 2..5 {
                labels[[r, c]] = 5.0;
                labels[[r + 5, c + 5]] = 6.0;
            }
        }
        let (hii, other) = classified_contours(&labels, &[5]);
        assert_eq!(hii.len(), 1);
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].style, crate::figure::LineStyle::Dashed);
    }

    #[test]
    fn scale_bar_length_in_pixels() {
        let mut ax = Axes::new();
        add_scale(&mut ax, &wcs(10), Angle::from_arcsec(1.0), "1'");
        match &ax.layers[0] {
            crate::figure::Layer::ScaleBar(bar) => assert!((bar.length - 10.0).abs() < 1e-9),
            other => panic!("unexpected layer {other:?}"),
        }
    }
}
