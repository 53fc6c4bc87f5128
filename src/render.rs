//! Minimal ray-cast rendering of colliders to PNG and GIF.
//!
//! Enough to eyeball a learned tree: a perspective camera orbits the
//! bounding box, each pixel traces one ray, and hits are shaded by the
//! collision normal against a headlight. Normal-map trees plug in through
//! [`MapNormals`](crate::collide::MapNormals), so their effect on shading is
//! directly visible.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use rand::Rng;
use rayon::prelude::*;

use crate::collide::Collider3;
use crate::geom::{Coord, Vec3};

const BACKGROUND: [u8; 3] = [255, 255, 255];
const BASE_COLOR: [f64; 3] = [0.35, 0.55, 0.85];

/// Render one frame looking at the collider's center.
///
/// `yaw` is the angle around the z axis; `pitch` tilts the camera off the
/// horizontal plane.
pub fn render_view(
    collider: &(impl Collider3 + ?Sized),
    image_size: usize,
    yaw: f64,
    pitch: f64,
) -> RgbImage {
    let center = collider.min().mid(collider.max());
    let radius = collider.min().dist(collider.max()) * 0.5;
    let eye_dir = Vec3::new(
        yaw.cos() * pitch.cos(),
        yaw.sin() * pitch.cos(),
        pitch.sin(),
    );
    let eye = center + eye_dir.scale(radius * 2.4);

    let forward = (center - eye).normalize();
    let right = forward.cross(Vec3::z_axis());
    let right = if right.norm() < 1e-9 {
        Vec3::x_axis()
    } else {
        right.normalize()
    };
    let up = right.cross(forward);
    let fov_scale = 0.55;

    let rows: Vec<Vec<[u8; 3]>> = (0..image_size)
        .into_par_iter()
        .map(|y| {
            let mut row = Vec::with_capacity(image_size);
            for x in 0..image_size {
                let u = (x as f64 + 0.5) / image_size as f64 * 2.0 - 1.0;
                let v = 1.0 - (y as f64 + 0.5) / image_size as f64 * 2.0;
                let dir = (forward + right.scale(u * fov_scale) + up.scale(v * fov_scale))
                    .normalize();
                row.push(shade(collider, eye, dir));
            }
            row
        })
        .collect();

    let mut img = RgbImage::new(image_size as u32, image_size as u32);
    for (y, row) in rows.iter().enumerate() {
        for (x, px) in row.iter().enumerate() {
            img.put_pixel(x as u32, y as u32, Rgb(*px));
        }
    }
    img
}

fn shade(collider: &(impl Collider3 + ?Sized), origin: Vec3<f64>, direction: Vec3<f64>) -> [u8; 3] {
    let Some(hit) = collider.first_ray_collision(origin, direction) else {
        return BACKGROUND;
    };
    // Headlight shading: brightness from the angle to the viewer.
    let facing = hit.normal.dot(direction).abs();
    let light = 0.25 + 0.75 * facing;
    let to_byte = |c: f64| (c * light * 255.0).clamp(0.0, 255.0) as u8;
    [
        to_byte(BASE_COLOR[0]),
        to_byte(BASE_COLOR[1]),
        to_byte(BASE_COLOR[2]),
    ]
}

/// A grid of random viewpoints in a single image.
pub fn render_random_grid<R: Rng + ?Sized>(
    collider: &(impl Collider3 + ?Sized),
    grid: usize,
    image_size: usize,
    rng: &mut R,
) -> RgbImage {
    let mut out = RgbImage::new((grid * image_size) as u32, (grid * image_size) as u32);
    for gy in 0..grid {
        for gx in 0..grid {
            let yaw = rng.gen::<f64>() * std::f64::consts::TAU;
            let pitch = (rng.gen::<f64>() - 0.5) * std::f64::consts::PI * 0.8;
            let tile = render_view(collider, image_size, yaw, pitch);
            for (x, y, px) in tile.enumerate_pixels() {
                out.put_pixel((gx * image_size) as u32 + x, (gy * image_size) as u32 + y, *px);
            }
        }
    }
    out
}

/// Save a PNG of a single frame.
pub fn save_png<P: AsRef<Path>>(path: P, img: &RgbImage) -> io::Result<()> {
    img.save(path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Save a rotating GIF orbiting the collider.
pub fn save_rotating_gif<P: AsRef<Path>>(
    path: P,
    collider: &(impl Collider3 + ?Sized),
    image_size: usize,
    frames: usize,
    fps: f64,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let delay_ms = (1000.0 / fps).round().max(1.0) as u32;
    for i in 0..frames {
        let yaw = i as f64 / frames as f64 * std::f64::consts::TAU;
        let rgb = render_view(collider, image_size, yaw, 0.35);
        let mut rgba = RgbaImage::new(rgb.width(), rgb.height());
        for (x, y, px) in rgb.enumerate_pixels() {
            rgba.put_pixel(x, y, Rgba([px.0[0], px.0[1], px.0[2], 255]));
        }
        let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
        encoder
            .encode_frame(frame)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collide::TreeCollider;
    use crate::tree::{BoundedSolidTree, Tree};
    use std::sync::Arc;

    fn box_collider() -> TreeCollider {
        let tree = Tree::branch(
            Vec3::x_axis(),
            0.0,
            Tree::leaf(false),
            Tree::leaf(true),
        );
        TreeCollider::new(BoundedSolidTree {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            tree: Arc::new(tree),
        })
    }

    #[test]
    fn view_contains_object_and_background() {
        let collider = box_collider();
        let img = render_view(&collider, 64, 0.3, 0.3);
        let mut background = 0;
        let mut object = 0;
        for px in img.pixels() {
            if px.0 == BACKGROUND {
                background += 1;
            } else {
                object += 1;
            }
        }
        assert!(object > 0, "object not visible");
        assert!(background > 0, "object fills the whole frame");
    }
}
