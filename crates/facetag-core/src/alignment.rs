//! Face alignment via 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference positions
//! and warps the face into the 112×112 crop ArcFace expects.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// 2×3 similarity transform `[a, -b, tx, b, a, ty]`:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
type Similarity = [f32; 6];

/// Closed-form least-squares similarity transform from `src` to `dst`.
///
/// Solved on centroid-centred points, so scale/rotation come from two sums
/// and the translation follows from the centroids.
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let n = src.len() as f32;
    let centroid = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (scx, scy) = centroid(src);
    let (dcx, dcy) = centroid(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut src_energy = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - scx, sy - scy);
        let (dx, dy) = (dx - dcx, dy - dcy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        src_energy += sx * sx + sy * sy;
    }

    if src_energy < 1e-12 {
        // All landmarks coincide; only the translation is recoverable.
        return [1.0, 0.0, dcx - scx, 0.0, 1.0, dcy - scy];
    }

    let a = dot / src_energy;
    let b = cross / src_energy;
    let tx = dcx - (a * scx - b * scy);
    let ty = dcy - (b * scx + a * scy);

    [a, -b, tx, b, a, ty]
}

/// Inverse-map every output pixel through `matrix` with bilinear sampling.
///
/// Samples falling outside the source are black.
fn warp_affine(image: &RgbImage, matrix: &Similarity, out_size: usize) -> RgbImage {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);
    let size = out_size as u32;

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(size, size);
    }
    let ia = a / det;
    let ib = b / det;

    let (width, height) = (image.width() as i64, image.height() as i64);
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < width && y >= 0 && y < height {
            image.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(size, size, |ox, oy| {
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut out = [0u8; 3];
        for (c, channel) in out.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *channel = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Align a detected face to the canonical 112×112 ArcFace crop.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}
