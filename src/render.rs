//! Draw [`Figure`]s with plotters: PNG through an in-memory bitmap, PDF
//! through SVG pages converted with svg2pdf.

use crate::error::{Error, Result};
use crate::figure::{Axes, Color, Figure, Glyph, Layer, Line, LineStyle, Marker, Raster, Scatter};
use image::RgbImage;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::Color as _;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use svg2pdf::usvg;

/// Units per inch of vector output; one SVG pixel is one PDF point.
pub const VECTOR_DPI: f64 = 72.0;
const TITLE_PT: f64 = 10.0;
const DASH_PT: (f64, f64) = (3.7, 1.6);

fn render_err<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> Error {
    Error::Render(e.to_string())
}

/// Text needs a system font; a missing one drops the label, not the figure.
fn text_drawn<T, E: std::error::Error + Send + Sync>(
    result: std::result::Result<T, DrawingAreaErrorKind<E>>,
) {
    if let Err(e) = result {
        log::warn!("text not drawn: {e}");
    }
}

fn rgba(c: Color) -> RGBAColor {
    RGBAColor(c.r, c.g, c.b, c.alpha)
}

fn pt_to_px(pt: f64, dpi: f64) -> f64 {
    pt * dpi / 72.0
}

pub fn pixel_size(fig: &Figure, dpi: f64) -> (u32, u32) {
    (
        ((fig.width_in * dpi).round() as u32).max(1),
        ((fig.height_in * dpi).round() as u32).max(1),
    )
}

/// Rasterise a figure at `dpi` into an RGB image.
pub fn render_rgb(fig: &Figure, dpi: f64) -> Result<RgbImage> {
    let (w, h) = pixel_size(fig, dpi);
    let mut buf = vec![0u8; w as usize * h as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
        draw_figure(&root, fig, dpi)?;
        root.present().map_err(render_err)?;
    }
    RgbImage::from_raw(w, h, buf).ok_or_else(|| Error::Render("bitmap size mismatch".into()))
}

/// Write `fig` as PNG; the extension of `path` is replaced by `.png`.
pub fn save_png(fig: &Figure, path: &Path, dpi: f64) -> Result<PathBuf> {
    let path = path.with_extension("png");
    let img = render_rgb(fig, dpi)?;
    img.save_with_format(&path, image::ImageFormat::Png)?;
    log::info!("saved {}", path.display());
    Ok(path)
}

/// Draw `fig` into an SVG document at [`VECTOR_DPI`].
pub fn render_svg(fig: &Figure) -> Result<String> {
    let (w, h) = pixel_size(fig, VECTOR_DPI);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (w, h)).into_drawing_area();
        draw_figure(&root, fig, VECTOR_DPI)?;
        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

/// Write `fig` as a one-page PDF; the extension of `path` is replaced by
/// `.pdf`.
pub fn save_pdf(fig: &Figure, path: &Path) -> Result<PathBuf> {
    save_pdf_pages(std::slice::from_ref(fig), path)
}

/// Write every figure as one page of a single PDF document, in order.
///
/// Each page is drawn as SVG and embedded as a form XObject scaled to a
/// media box of the figure's size in points.
pub fn save_pdf_pages(figs: &[Figure], path: &Path) -> Result<PathBuf> {
    let path = path.with_extension("pdf");
    if figs.is_empty() {
        return Err(Error::Render("no pages to write".into()));
    }
    let bytes = pdf_document(figs)?;
    std::fs::write(&path, bytes)?;
    log::info!("saved {} ({} pages)", path.display(), figs.len());
    Ok(path)
}

fn pdf_document(figs: &[Figure]) -> Result<Vec<u8>> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let mut alloc = Ref::new(1);
    let catalog_id = alloc.bump();
    let page_tree_id = alloc.bump();
    let page_ids: Vec<Ref> = figs.iter().map(|_| alloc.bump()).collect();

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(figs.len() as i32);

    let name = Name(b"P0");
    for (fig, &page_id) in figs.iter().zip(&page_ids) {
        let svg = render_svg(fig)?;
        let tree = usvg::Tree::from_str(&svg, &options).map_err(|e| Error::Pdf(e.to_string()))?;
        let (chunk, svg_id) = svg2pdf::to_chunk(&tree, svg2pdf::ConversionOptions::default())
            .map_err(|e| Error::Pdf(e.to_string()))?;
        let mut renumbered = HashMap::new();
        let chunk = chunk.renumber(|old| *renumbered.entry(old).or_insert_with(|| alloc.bump()));
        let svg_id = *renumbered
            .get(&svg_id)
            .ok_or_else(|| Error::Pdf("page XObject missing after renumbering".into()))?;

        let (w, h) = pixel_size(fig, VECTOR_DPI);
        let (w, h) = (w as f32, h as f32);
        let content_id = alloc.bump();
        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, w, h));
        page.parent(page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(name, svg_id);
        page.finish();

        let mut content = Content::new();
        content
            .save_state()
            .transform([w, 0.0, 0.0, h, 0.0, 0.0])
            .x_object(name)
            .restore_state();
        pdf.stream(content_id, &content.finish());
        pdf.extend(&chunk);
    }
    Ok(pdf.finish())
}

fn draw_figure<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, fig: &Figure, dpi: f64) -> Result<()> {
    root.fill(&WHITE).map_err(render_err)?;
    let (w, h) = root.dim_in_pixel();
    for (i, cell) in fig.cells.iter().enumerate() {
        let Some(ax) = cell else { continue };
        let rect = fig.cell_rect(i);
        let cell_px = (
            rect.x * w as f64,
            rect.y * h as f64,
            rect.width * w as f64,
            rect.height * h as f64,
        );
        draw_axes(root, ax, cell_px, dpi)?;
    }
    Ok(())
}

/// Largest box of the axes' data aspect ratio centred in the cell.
fn data_box(ax: &Axes, (x, y, w, h): (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
    if !ax.has_image() {
        return (x, y, w, h);
    }
    let dx = (ax.xlim.1 - ax.xlim.0).abs();
    let dy = (ax.ylim.1 - ax.ylim.0).abs();
    if dx == 0.0 || dy == 0.0 {
        return (x, y, w, h);
    }
    let scale = (w / dx).min(h / dy);
    let (bw, bh) = (dx * scale, dy * scale);
    (x + (w - bw) / 2.0, y + (h - bh) / 2.0, bw, bh)
}

fn draw_axes<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    ax: &Axes,
    cell: (f64, f64, f64, f64),
    dpi: f64,
) -> Result<()> {
    let (bx, by, bw, bh) = data_box(ax, cell);
    let (bw_px, bh_px) = ((bw.round() as i32).max(1), (bh.round() as i32).max(1));
    let area = root
        .clone()
        .shrink((bx.round() as i32, by.round() as i32), (bw_px, bh_px));

    let mut chart = ChartBuilder::on(&area)
        .build_cartesian_2d(ax.xlim.0..ax.xlim.1, ax.ylim.0..ax.ylim.1)
        .map_err(render_err)?;
    let px_per_unit = bw_px as f64 / (ax.xlim.1 - ax.xlim.0).abs().max(f64::EPSILON);
    let frac = |fx: f64, fy: f64| {
        (
            ax.xlim.0 + fx * (ax.xlim.1 - ax.xlim.0),
            ax.ylim.0 + fy * (ax.ylim.1 - ax.ylim.0),
        )
    };

    for layer in &ax.layers {
        match layer {
            Layer::Image(raster) => {
                let step = decimation(raster, bw_px, bh_px);
                chart.draw_series(raster_cells(raster, step)).map_err(render_err)?;
            }
            Layer::Line(line) => draw_line(&mut chart, line, px_per_unit, dpi)?,
            Layer::Scatter(scatter) => draw_scatter(&mut chart, scatter, dpi)?,
            Layer::Text(text) => {
                let font_px = pt_to_px(text.size, dpi);
                let pos = frac(text.x, text.y);
                if let Some(bg) = text.background {
                    let pad = (font_px * 0.3) as i32;
                    let tw = estimate_width(&text.text, font_px);
                    chart
                        .draw_series(std::iter::once(
                            EmptyElement::at(pos)
                                + Rectangle::new(
                                    [(-pad, -(font_px as i32) - pad), (tw + pad, pad)],
                                    rgba(bg).filled(),
                                ),
                        ))
                        .map_err(render_err)?;
                }
                let style = ("sans-serif", font_px)
                    .into_font()
                    .color(&rgba(text.color))
                    .pos(Pos::new(HPos::Left, VPos::Bottom));
                text_drawn(chart.draw_series(std::iter::once(
                    EmptyElement::at(pos) + Text::new(text.text.clone(), (0, 0), style),
                )));
            }
            Layer::Legend { entries, size } => {
                let font_px = pt_to_px(*size, dpi);
                let row = font_px * 1.6 / bh_px as f64;
                let n = entries.len() as f64;
                for (i, entry) in entries.iter().enumerate() {
                    let fy = 0.5 + ((n - 1.0) / 2.0 - i as f64) * row;
                    match entry.glyph {
                        Glyph::Line(style) => {
                            let line = Line {
                                points: vec![frac(0.05, fy), frac(0.2, fy)],
                                color: entry.color.with_alpha(1.0),
                                width: 1.0,
                                style,
                                label: None,
                            };
                            draw_line(&mut chart, &line, px_per_unit, dpi)?;
                        }
                        Glyph::Marker(marker) => {
                            let scatter = Scatter {
                                points: vec![frac(0.125, fy)],
                                marker,
                                size: 20.0,
                                width: 0.8,
                                color: entry.color,
                                label: None,
                            };
                            draw_scatter(&mut chart, &scatter, dpi)?;
                        }
                    }
                    let style = ("sans-serif", font_px)
                        .into_font()
                        .color(&BLACK)
                        .pos(Pos::new(HPos::Left, VPos::Center));
                    text_drawn(chart.draw_series(std::iter::once(
                        EmptyElement::at(frac(0.25, fy))
                            + Text::new(entry.label.clone(), (0, 0), style),
                    )));
                }
            }
            Layer::ScaleBar(bar) => {
                let (x0, y0) = frac(0.05, 0.08);
                let color = rgba(bar.color);
                chart
                    .draw_series(LineSeries::new(
                        vec![(x0, y0), (x0 + bar.length, y0)],
                        color.stroke_width(pt_to_px(1.5, dpi).round().max(1.0) as u32),
                    ))
                    .map_err(render_err)?;
                let style = ("sans-serif", pt_to_px(8.0, dpi))
                    .into_font()
                    .color(&color)
                    .pos(Pos::new(HPos::Center, VPos::Bottom));
                text_drawn(chart.draw_series(std::iter::once(
                    EmptyElement::at((x0 + bar.length / 2.0, y0))
                        + Text::new(bar.label.clone(), (0, -4), style),
                )));
            }
        }
    }

    if ax.axis_visible {
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(ax.xlim.0, ax.ylim.0), (ax.xlim.1, ax.ylim.1)],
                BLACK.stroke_width(1),
            )))
            .map_err(render_err)?;
    }

    if let Some(title) = &ax.title {
        let style = ("sans-serif", pt_to_px(TITLE_PT, dpi))
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        text_drawn(root.draw(&Text::new(
            title.clone(),
            ((bx + bw / 2.0) as i32, by as i32 - 4),
            style,
        )));
    }
    Ok(())
}

fn estimate_width(text: &str, font_px: f64) -> i32 {
    (text.chars().count() as f64 * font_px * 0.6).ceil() as i32
}

/// Raster pixels per drawn cell so that no more cells than device pixels
/// are emitted.
fn decimation(raster: &Raster, box_w: i32, box_h: i32) -> usize {
    let sx = raster.width as f64 / box_w.max(1) as f64;
    let sy = raster.height as f64 / box_h.max(1) as f64;
    (sx.max(sy).ceil() as usize).max(1)
}

fn raster_cells(raster: &Raster, step: usize) -> impl Iterator<Item = Rectangle<(f64, f64)>> + '_ {
    (0..raster.height).step_by(step).flat_map(move |row| {
        (0..raster.width).step_by(step).filter_map(move |col| {
            let [r, g, b, a] = raster.pixel(row, col);
            if a == 0 {
                return None;
            }
            let x1 = (col + step).min(raster.width) as f64 - 0.5;
            let y1 = (row + step).min(raster.height) as f64 - 0.5;
            Some(Rectangle::new(
                [(col as f64 - 0.5, row as f64 - 0.5), (x1, y1)],
                RGBAColor(r, g, b, a as f64 / 255.0).filled(),
            ))
        })
    })
}

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_line<DB: DrawingBackend>(chart: &mut Chart<'_, DB>, line: &Line, px_per_unit: f64, dpi: f64) -> Result<()> {
    if line.points.len() < 2 {
        return Ok(());
    }
    let width = pt_to_px(line.width, dpi).round().max(1.0) as u32;
    let style = rgba(line.color).stroke_width(width);
    match line.style {
        LineStyle::Solid => {
            chart
                .draw_series(LineSeries::new(line.points.iter().copied(), style))
                .map_err(render_err)?;
        }
        LineStyle::Dashed => {
            let on = pt_to_px(DASH_PT.0 * line.width, dpi) / px_per_unit;
            let off = pt_to_px(DASH_PT.1 * line.width, dpi) / px_per_unit;
            for dash in dash_segments(&line.points, on, off) {
                chart
                    .draw_series(LineSeries::new(dash, style))
                    .map_err(render_err)?;
            }
        }
    }
    Ok(())
}

fn draw_scatter<DB: DrawingBackend>(chart: &mut Chart<'_, DB>, scatter: &Scatter, dpi: f64) -> Result<()> {
    let radius = (pt_to_px(scatter.size.sqrt(), dpi) / 2.0).round().max(1.0) as i32;
    let width = pt_to_px(scatter.width, dpi).round().max(1.0) as u32;
    let style = rgba(scatter.color).stroke_width(width);
    match scatter.marker {
        Marker::Circle => chart
            .draw_series(
                scatter
                    .points
                    .iter()
                    .map(|&p| EmptyElement::at(p) + Circle::new((0, 0), radius, style)),
            )
            .map(|_| ()),
        Marker::Square => chart
            .draw_series(scatter.points.iter().map(|&p| {
                EmptyElement::at(p) + Rectangle::new([(-radius, -radius), (radius, radius)], style)
            }))
            .map(|_| ()),
    }
    .map_err(render_err)
}

/// Split a polyline into dashes of length `on` separated by gaps of `off`,
/// measured along the path.
fn dash_segments(points: &[(f64, f64)], on: f64, off: f64) -> Vec<Vec<(f64, f64)>> {
    if on <= 0.0 || points.len() < 2 {
        return vec![points.to_vec()];
    }
    let mut dashes = Vec::new();
    let mut current: Vec<(f64, f64)> = vec![points[0]];
    let mut drawing = true;
    let mut left = on;

    for pair in points.windows(2) {
        let (mut a, b) = (pair[0], pair[1]);
        let mut seg = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        while seg > left {
            let t = left / seg;
            let cut = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
            if drawing {
                current.push(cut);
                dashes.push(std::mem::take(&mut current));
            } else {
                current = vec![cut];
            }
            drawing = !drawing;
            seg -= left;
            left = if drawing { on } else { off };
            a = cut;
        }
        left -= seg;
        if drawing {
            current.push(b);
        }
    }
    if drawing && current.len() > 1 {
        dashes.push(current);
    }
    dashes
}
