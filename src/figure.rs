//! Explicit scene model for multi-panel figures.
//!
//! A [`Figure`] is a grid of optional [`Axes`]; each axes holds an ordered
//! list of [`Layer`]s in data (pixel) coordinates. Nothing is drawn until the
//! figure is handed to [`crate::render`].

/// Colour with an opacity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f64,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, alpha: 1.0 }
    }

    /// From fractional channels, as in `(0.84, 0.15, 0.16, 0.1)`.
    pub fn from_fractions(r: f64, g: f64, b: f64, alpha: f64) -> Self {
        let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: c(r),
            g: c(g),
            b: c(b),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }
}

pub const TAB_RED: Color = Color::rgb(214, 39, 40);
pub const TAB_BLUE: Color = Color::rgb(31, 119, 180);
pub const BLACK: Color = Color::rgb(0, 0, 0);
pub const WHITE: Color = Color::rgb(255, 255, 255);

/// RGBA pixels, row 0 first; row 0 is drawn at the bottom of the axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 4]>,
}

impl Raster {
    pub fn new(width: usize, height: usize, pixels: Vec<[u8; 4]>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, row: usize, col: usize) -> [u8; 4] {
        self.pixels[row * self.width + col]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
}

/// Polyline in data coordinates. `width` is in points.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub points: Vec<(f64, f64)>,
    pub color: Color,
    pub width: f64,
    pub style: LineStyle,
    pub label: Option<String>,
}

impl Line {
    pub fn new(points: Vec<(f64, f64)>, color: Color) -> Self {
        Self {
            points,
            color,
            width: 1.0,
            style: LineStyle::Solid,
            label: None,
        }
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    pub fn dashed(mut self) -> Self {
        self.style = LineStyle::Dashed;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Square,
}

/// Hollow markers. `size` is the marker area in points squared.
#[derive(Debug, Clone, PartialEq)]
pub struct Scatter {
    pub points: Vec<(f64, f64)>,
    pub marker: Marker,
    pub size: f64,
    pub width: f64,
    pub color: Color,
    pub label: Option<String>,
}

/// Text placed in axes-fraction coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub size: f64,
    pub color: Color,
    pub background: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Line(LineStyle),
    Marker(Marker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
    pub glyph: Glyph,
}

/// Horizontal bar of `length` data units in the lower-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    pub length: f64,
    pub label: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Image(Raster),
    Line(Line),
    Scatter(Scatter),
    Text(TextBox),
    Legend { entries: Vec<LegendEntry>, size: f64 },
    ScaleBar(ScaleBar),
}

/// One panel of a figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Axes {
    pub title: Option<String>,
    pub xlim: (f64, f64),
    pub ylim: (f64, f64),
    pub layers: Vec<Layer>,
    pub axis_visible: bool,
}

impl Default for Axes {
    fn default() -> Self {
        Self::new()
    }
}

impl Axes {
    pub fn new() -> Self {
        Self {
            title: None,
            xlim: (0.0, 1.0),
            ylim: (0.0, 1.0),
            layers: Vec::new(),
            axis_visible: true,
        }
    }

    /// Draw a raster and fit the limits to it, one data unit per pixel.
    pub fn imshow(&mut self, raster: Raster) {
        self.xlim = (-0.5, raster.width as f64 - 0.5);
        self.ylim = (-0.5, raster.height as f64 - 0.5);
        self.layers.push(Layer::Image(raster));
    }

    /// Draw a raster on top without touching the limits.
    pub fn overlay_rgba(&mut self, raster: Raster) {
        self.layers.push(Layer::Image(raster));
    }

    pub fn plot(&mut self, line: Line) {
        self.layers.push(Layer::Line(line));
    }

    pub fn scatter(&mut self, scatter: Scatter) {
        self.layers.push(Layer::Scatter(scatter));
    }

    pub fn text(&mut self, text: TextBox) {
        self.layers.push(Layer::Text(text));
    }

    pub fn legend(&mut self, entries: Vec<LegendEntry>, size: f64) {
        self.layers.push(Layer::Legend { entries, size });
    }

    pub fn scale_bar(&mut self, bar: ScaleBar) {
        self.layers.push(Layer::ScaleBar(bar));
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn axis_off(&mut self) {
        self.axis_visible = false;
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Line(line) => Some(line),
            _ => None,
        })
    }

    pub fn markers(&self) -> impl Iterator<Item = &Scatter> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Scatter(s) => Some(s),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextBox> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Text(t) => Some(t),
            _ => None,
        })
    }

    pub fn has_image(&self) -> bool {
        self.layers.iter().any(|l| matches!(l, Layer::Image(_)))
    }

    /// Lines carrying `label`.
    pub fn contours(&self, label: &str) -> usize {
        self.lines()
            .filter(|l| l.label.as_deref() == Some(label))
            .count()
    }

    /// Legend entries for every labelled artist, first occurrence of each
    /// label only.
    pub fn legend_handles(&self) -> Vec<LegendEntry> {
        let mut handles: Vec<LegendEntry> = Vec::new();
        for layer in &self.layers {
            let entry = match layer {
                Layer::Line(l) => l.label.as_ref().map(|label| LegendEntry {
                    label: label.clone(),
                    color: l.color,
                    glyph: Glyph::Line(l.style),
                }),
                Layer::Scatter(s) => s.label.as_ref().map(|label| LegendEntry {
                    label: label.clone(),
                    color: s.color,
                    glyph: Glyph::Marker(s.marker),
                }),
                _ => None,
            };
            if let Some(entry) = entry {
                if !handles.iter().any(|h| h.label == entry.label) {
                    handles.push(entry);
                }
            }
        }
        handles
    }
}

/// Placement of a grid cell in figure fractions, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A page: a grid of panels with matplotlib-style subplot spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width_in: f64,
    pub height_in: f64,
    pub nrows: usize,
    pub ncols: usize,
    pub cells: Vec<Option<Axes>>,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
    /// Horizontal gap between cells as a fraction of the cell width.
    pub wspace: f64,
    /// Vertical gap between cells as a fraction of the cell height.
    pub hspace: f64,
}

impl Figure {
    pub fn grid(nrows: usize, ncols: usize, width_in: f64, height_in: f64) -> Self {
        Self {
            width_in,
            height_in,
            nrows,
            ncols,
            cells: (0..nrows * ncols).map(|_| Some(Axes::new())).collect(),
            left: 0.125,
            right: 0.9,
            bottom: 0.11,
            top: 0.88,
            wspace: 0.2,
            hspace: 0.2,
        }
    }

    pub fn subplots_adjust(&mut self, wspace: f64, hspace: f64) {
        self.wspace = wspace;
        self.hspace = hspace;
    }

    pub fn axes(&self, index: usize) -> Option<&Axes> {
        self.cells.get(index).and_then(Option::as_ref)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut Axes> {
        self.cells.get_mut(index).and_then(Option::as_mut)
    }

    pub fn set_axes(&mut self, index: usize, axes: Axes) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = Some(axes);
        }
    }

    /// Delete the panel at `index`; the cell stays blank.
    pub fn remove(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = None;
        }
    }

    pub fn blank_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    pub fn iter_axes(&self) -> impl Iterator<Item = &Axes> {
        self.cells.iter().flatten()
    }

    /// Rectangle of cell `index` (row-major).
    pub fn cell_rect(&self, index: usize) -> CellRect {
        let (row, col) = (index / self.ncols.max(1), index % self.ncols.max(1));
        let ncols = self.ncols.max(1) as f64;
        let nrows = self.nrows.max(1) as f64;

        let avail_w = self.right - self.left;
        let cell_w = avail_w / (ncols + self.wspace * (ncols - 1.0));
        let avail_h = self.top - self.bottom;
        let cell_h = avail_h / (nrows + self.hspace * (nrows - 1.0));

        CellRect {
            x: self.left + col as f64 * cell_w * (1.0 + self.wspace),
            y: (1.0 - self.top) + row as f64 * cell_h * (1.0 + self.hspace),
            width: cell_w,
            height: cell_h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn imshow_sets_pixel_limits() {
        let mut ax = Axes::new();
        ax.imshow(Raster::new(4, 3, vec![[0; 4]; 12]));
        assert_eq!(ax.xlim, (-0.5, 3.5));
        assert_eq!(ax.ylim, (-0.5, 2.5));
        assert!(ax.has_image());
    }

    #[test]
    fn legend_handles_are_unique() {
        let mut ax = Axes::new();
        for _ in 0..3 {
            ax.plot(Line::new(vec![(0.0, 0.0), (1.0, 1.0)], TAB_RED).label("HII-region"));
        }
        ax.plot(Line::new(vec![], BLACK));
        ax.scatter(Scatter {
            points: vec![(0.5, 0.5)],
            marker: Marker::Circle,
            size: 20.0,
            width: 0.4,
            color: TAB_BLUE,
            label: Some("cluster".into()),
        });
        let handles = ax.legend_handles();
        let labels: Vec<&str> = handles.iter().map(|h| h.label.as_str()).collect();
        assert_eq!(labels, ["HII-region", "cluster"]);
        assert_eq!(ax.contours("HII-region"), 3);
    }

    #[test]
    fn grid_cells_and_removal() {
        let mut fig = Figure::grid(2, 4, 7.0, 4.0);
        assert_eq!(fig.cells.len(), 8);
        fig.remove(7);
        assert_eq!(fig.blank_cells(), 1);
        assert!(fig.axes(7).is_none());
        assert!(fig.cell_mut(3).is_some());
    }

    #[test]
    fn cells_tile_the_subplot_area() {
        let mut fig = Figure::grid(2, 3, 6.0, 4.0);
        fig.subplots_adjust(0.0, 0.0);
        let first = fig.cell_rect(0);
        let last = fig.cell_rect(5);
        assert_abs_diff_eq!(first.x, fig.left, epsilon = 1e-12);
        assert_abs_diff_eq!(last.x + last.width, fig.right, epsilon = 1e-12);
        assert_abs_diff_eq!(last.y + last.height, 1.0 - fig.bottom, epsilon = 1e-12);
    }

    #[test]
    fn fractional_colour() {
        let c = Color::from_fractions(0.84, 0.15, 0.16, 0.1);
        assert_eq!((c.r, c.g, c.b), (214, 38, 41));
        assert_abs_diff_eq!(c.alpha, 0.1);
    }
}
