/// Paint command set emitted from a render tree

use crate::color::Color;
use crate::rendering::tree::ElementContainer;
use crate::rendering::RenderOptions;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Color,
    },
    Image {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        image: Arc<RgbaImage>,
    },
}

/// Emit paint commands for `tree` in paint order (parents before children),
/// translated into the capture region and scaled to device pixels.
pub fn paint_tree(
    tree: &ElementContainer,
    options: &RenderOptions,
    images: &HashMap<String, Arc<RgbaImage>>,
) -> Vec<PaintCommand> {
    paint_tree_at(tree, (options.region.x, options.region.y), options.scale as f64, images)
}

/// Like `paint_tree` with an explicit origin (CSS px) and scale factor
pub fn paint_tree_at(
    tree: &ElementContainer,
    (origin_x, origin_y): (f64, f64),
    scale: f64,
    images: &HashMap<String, Arc<RgbaImage>>,
) -> Vec<PaintCommand> {
    let mut commands = Vec::new();

    tree.walk(&mut |c| {
        let x = ((c.bounds.left - origin_x) * scale).round() as i32;
        let y = ((c.bounds.top - origin_y) * scale).round() as i32;
        let width = (c.bounds.width * scale).round().max(0.0) as u32;
        let height = (c.bounds.height * scale).round().max(0.0) as u32;
        if width == 0 || height == 0 {
            return;
        }
        if !c.background_color.is_transparent() {
            commands.push(PaintCommand::SolidRect { x, y, width, height, rgba: c.background_color });
        }
        if let Some(image) = c.image.as_ref().and_then(|src| images.get(src)) {
            commands.push(PaintCommand::Image { x, y, width, height, image: image.clone() });
        }
    });
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bounds::Bounds;
    use crate::color::TRANSPARENT;

    #[test]
    fn commands_are_translated_and_scaled() {
        let mut tree = ElementContainer::leaf(0, "div", Bounds::new(10.0, 20.0, 5.0, 5.0), Color::BLACK);
        tree.children.push(ElementContainer::leaf(1, "p", Bounds::new(12.0, 20.0, 1.0, 0.0), Color::WHITE));
        tree.children.push(ElementContainer::leaf(2, "i", Bounds::new(12.0, 22.0, 1.0, 1.0), TRANSPARENT));

        let cmds = paint_tree_at(&tree, (10.0, 20.0), 2.0, &HashMap::new());
        // zero-height and transparent boxes emit nothing
        assert_eq!(
            cmds,
            vec![PaintCommand::SolidRect { x: 0, y: 0, width: 10, height: 10, rgba: Color::BLACK }]
        );
    }

    #[test]
    fn loaded_images_are_drawn_over_the_background() {
        let mut img = ElementContainer::leaf(3, "img", Bounds::new(2.0, 2.0, 4.0, 2.0), Color::BLACK);
        img.image = Some("a.png".into());
        let mut missing = ElementContainer::leaf(4, "img", Bounds::new(0.0, 0.0, 4.0, 2.0), TRANSPARENT);
        missing.image = Some("blocked.png".into());
        let mut tree = ElementContainer::leaf(0, "div", Bounds::new(0.0, 0.0, 8.0, 8.0), TRANSPARENT);
        tree.children = vec![img, missing];

        let pixels = Arc::new(RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 255, 255])));
        let images = HashMap::from([("a.png".to_string(), pixels.clone())]);
        let cmds = paint_tree_at(&tree, (0.0, 0.0), 1.0, &images);
        // images that never loaded are not drawn
        assert_eq!(
            cmds,
            vec![
                PaintCommand::SolidRect { x: 2, y: 2, width: 4, height: 2, rgba: Color::BLACK },
                PaintCommand::Image { x: 2, y: 2, width: 4, height: 2, image: pixels },
            ]
        );
    }
}
