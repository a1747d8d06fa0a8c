/// Software rasterizer for paint commands

use crate::rendering::paint::PaintCommand;
use crate::rendering::RasterSurface;

/// Source-over blend of one non-premultiplied RGBA pixel onto `dst`
fn blend(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        dst.copy_from_slice(&src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (oa * 255.0).round() as u8;
}

/// Clip a rectangle to the surface; returns (x0, y0, x1, y1) in pixels
fn clip(surface: &RasterSurface, x: i32, y: i32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = x.max(0) as i64;
    let y0 = y.max(0) as i64;
    let x1 = (x as i64 + width as i64).min(surface.width as i64);
    let y1 = (y as i64 + height as i64).min(surface.height as i64);
    (x0 < x1 && y0 < y1).then_some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

pub fn rasterize(surface: &mut RasterSurface, commands: &[PaintCommand]) {
    let stride = surface.width as usize * 4;
    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                let Some((x0, y0, x1, y1)) = clip(surface, *x, *y, *width, *height) else { continue };
                let src = rgba.to_array();
                for py in y0..y1 {
                    for px in x0..x1 {
                        let i = py as usize * stride + px as usize * 4;
                        blend(&mut surface.pixels[i..i + 4], src);
                    }
                }
            }
            PaintCommand::Image { x, y, width, height, image } => {
                let Some((x0, y0, x1, y1)) = clip(surface, *x, *y, *width, *height) else { continue };
                if image.width() == 0 || image.height() == 0 {
                    continue;
                }
                // nearest neighbour
                for py in y0..y1 {
                    let sy = ((py as i64 - *y as i64) as u64 * image.height() as u64 / *height as u64) as u32;
                    for px in x0..x1 {
                        let sx = ((px as i64 - *x as i64) as u64 * image.width() as u64 / *width as u64) as u32;
                        let src = image.get_pixel(sx.min(image.width() - 1), sy.min(image.height() - 1)).0;
                        let i = py as usize * stride + px as usize * 4;
                        blend(&mut surface.pixels[i..i + 4], src);
                    }
                }
            }
        }
    }
}

/// Draw `layer` over `surface` at the origin
pub fn composite(surface: &mut RasterSurface, layer: &RasterSurface) {
    let w = surface.width.min(layer.width) as usize;
    let h = surface.height.min(layer.height) as usize;
    let dst_stride = surface.width as usize * 4;
    let src_stride = layer.width as usize * 4;
    for y in 0..h {
        for x in 0..w {
            let s = y * src_stride + x * 4;
            let d = y * dst_stride + x * 4;
            let src = [layer.pixels[s], layer.pixels[s + 1], layer.pixels[s + 2], layer.pixels[s + 3]];
            blend(&mut surface.pixels[d..d + 4], src);
        }
    }
}
