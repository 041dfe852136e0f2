//! Interactive window for figures that are not written to disk.

use crate::error::{Error, Result};
use crate::figure::Figure;
use crate::render;
use egui::TextureHandle;
use image::RgbImage;

/// Resolution the figure is rasterised at for display.
const SCREEN_DPI: f64 = 100.0;

/// Rasterise `figure` and show it until the window is closed.
pub fn show(figure: &Figure, title: &str) -> Result<()> {
    let rgb = render::render_rgb(figure, SCREEN_DPI)?;
    let (w, h) = rgb.dimensions();
    log::info!("showing {title} ({w}x{h})");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([w as f32 + 16.0, h as f32 + 48.0])
            .with_title(title),
        ..Default::default()
    };
    let title = title.to_string();
    eframe::run_native(
        "clusterview",
        options,
        Box::new(move |_cc| Ok(Box::new(FigureViewer::new(title, rgb)))),
    )
    .map_err(|e| Error::Viewer(e.to_string()))
}

struct FigureViewer {
    title: String,
    rgb: RgbImage,
    /// Cached egui texture of `rgb`
    texture: Option<TextureHandle>,
    /// Zoom: None = autofit, Some(s) = explicit scale factor
    zoom: Option<f32>,
    /// Whether the keyboard shortcuts help popup is open
    show_help: bool,
}

impl FigureViewer {
    fn new(title: String, rgb: RgbImage) -> Self {
        Self {
            title,
            rgb,
            texture: None,
            zoom: None,
            show_help: false,
        }
    }

    fn texture(&mut self, ctx: &egui::Context) -> &TextureHandle {
        let rgb = &self.rgb;
        self.texture.get_or_insert_with(|| {
            let color_image = egui::ColorImage::from_rgb(
                [rgb.width() as usize, rgb.height() as usize],
                rgb.as_raw(),
            );
            ctx.load_texture("figure", color_image, egui::TextureOptions::LINEAR)
        })
    }
}

fn zoom_in(zoom: Option<f32>) -> Option<f32> {
    Some((zoom.unwrap_or(1.0) * 1.25).min(32.0))
}

fn zoom_out(zoom: Option<f32>) -> Option<f32> {
    Some((zoom.unwrap_or(1.0) / 1.25).max(0.05))
}

/// On-screen size of an image of `img` pixels; autofit keeps the aspect
/// ratio inside `available`.
fn display_size(img: egui::Vec2, available: egui::Vec2, zoom: Option<f32>) -> egui::Vec2 {
    match zoom {
        None => img * (available.x / img.x).min(available.y / img.y),
        Some(s) => img * s,
    }
}

impl eframe::App for FigureViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (plus, minus, reset, fit, help, escape) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Plus) || i.key_pressed(egui::Key::Equals),
                i.key_pressed(egui::Key::Minus),
                i.key_pressed(egui::Key::Num0),
                i.key_pressed(egui::Key::F),
                i.key_pressed(egui::Key::Questionmark),
                i.key_pressed(egui::Key::Escape),
            )
        });

        if plus {
            self.zoom = zoom_in(self.zoom);
        }
        if minus {
            self.zoom = zoom_out(self.zoom);
        }
        if reset {
            self.zoom = Some(1.0);
        }
        if fit {
            self.zoom = None;
        }
        if help {
            self.show_help = !self.show_help;
        }
        if escape {
            if self.show_help {
                self.show_help = false;
            } else {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }

        if self.show_help {
            egui::Window::new("Keyboard shortcuts")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    egui::Grid::new("help_grid").striped(true).show(ui, |ui| {
                        let rows: &[(&str, &str)] = &[
                            ("+  /  -", "Zoom in / out"),
                            ("0", "Zoom to 1:1 (100 %)"),
                            ("F", "Zoom to fit"),
                            ("?", "Show / hide this help"),
                            ("Esc", "Close help, then the window"),
                        ];
                        for (key, desc) in rows {
                            ui.label(egui::RichText::new(*key).monospace().strong());
                            ui.label(*desc);
                            ui.end_row();
                        }
                    });
                    ui.separator();
                    if ui.button("Close  [?]").clicked() {
                        self.show_help = false;
                    }
                });
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.title);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let zoom_str = match self.zoom {
                        None => "Fit".to_string(),
                        Some(s) => format!("{:.0}%", s * 100.0),
                    };
                    ui.label(zoom_str).on_hover_text("Zoom  [+] [-] [0=1:1] [F=fit]");
                    ui.label("Zoom:");
                });
            });
        });

        let zoom = self.zoom;
        let texture = self.texture(ctx).clone();
        egui::CentralPanel::default().show(ctx, |ui| {
            let size = display_size(texture.size_vec2(), ui.available_size(), zoom);
            egui::ScrollArea::both().show(ui, |ui| {
                ui.image((texture.id(), size));
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_is_clamped() {
        let mut z = None;
        for _ in 0..40 {
            z = zoom_in(z);
        }
        assert_eq!(z, Some(32.0));
        for _ in 0..80 {
            z = zoom_out(z);
        }
        assert_eq!(z, Some(0.05));
    }

    #[test]
    fn autofit_keeps_aspect() {
        let size = display_size(egui::vec2(200.0, 100.0), egui::vec2(100.0, 100.0), None);
        assert_eq!(size, egui::vec2(100.0, 50.0));
        let size = display_size(egui::vec2(200.0, 100.0), egui::vec2(100.0, 100.0), Some(2.0));
        assert_eq!(size, egui::vec2(400.0, 200.0));
    }
}
