use crate::common::CanvasSize;

/// Where an image lands on the canvas. May extend past the canvas edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales an image to cover one canvas dimension and centers it on the other.
///
/// Images relatively wider than the canvas match its height and overhang left and right;
/// all others match its width and overhang top and bottom.
pub fn aspect_fit(image_width: u32, image_height: u32, canvas: CanvasSize) -> Placement {
    let image_aspect = image_width as f32 / image_height as f32;
    let canvas_width = canvas.width as f32;
    let canvas_height = canvas.height as f32;

    if image_aspect > canvas.aspect() {
        let height = canvas_height;
        let width = height * image_aspect;
        Placement {
            x: (canvas_width - width) / 2.0,
            y: 0.0,
            width,
            height,
        }
    } else {
        let width = canvas_width;
        let height = width / image_aspect;
        Placement {
            x: 0.0,
            y: (canvas_height - height) / 2.0,
            width,
            height,
        }
    }
}
