use std::sync::Arc;

use egui::{ColorImage, TextureHandle, TextureOptions};
use image::RgbaImage;

use crate::app::views::View;

/// Shows the latest composited frame scaled to the available space.
pub struct FrameView {
    texture: Option<TextureHandle>,
}

impl FrameView {
    pub fn new() -> Self {
        Self { texture: None }
    }

    pub fn update(&mut self, ctx: &egui::Context, frame: &Arc<RgbaImage>) {
        let size = [frame.width() as usize, frame.height() as usize];
        let color_image = ColorImage::from_rgba_unmultiplied(size, frame.as_raw());

        match self.texture.as_mut() {
            Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("overlay_frame", color_image, TextureOptions::LINEAR));
            }
        }
    }
}

impl Default for FrameView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for FrameView {
    fn draw(&mut self, ui: &mut egui::Ui) {
        match &self.texture {
            Some(texture) => {
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::new(texture).shrink_to_fit());
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label("Waiting for the first frame...");
                });
            }
        }
    }
}
