//! Synthetic test scenes shared by the unit tests.
//!
//! The face renderer draws a flat-shaded frontal face (skin block, two
//! darker eye rectangles, a mouth bar) that satisfies every cascade stage;
//! the negative generators (gradients, checkerboard, noise) each violate
//! at least one stage.

use crate::preprocess::resize_bilinear;
use crate::types::Frame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) struct FaceSpec {
    pub fx: u32,
    pub fy: u32,
    pub size: u32,
    pub bg: u8,
    pub skin: u8,
    pub eye: u8,
    pub mouth: u8,
}

impl Default for FaceSpec {
    fn default() -> Self {
        Self { fx: 40, fy: 40, size: 80, bg: 40, skin: 190, eye: 70, mouth: 90 }
    }
}

/// Render a 160x160 frame containing the face, with optional uniform
/// per-pixel noise of amplitude `noise_amp`.
pub(crate) fn render_face(spec: &FaceSpec, noise_amp: i32, seed: u64) -> Frame {
    let (w, h) = (160u32, 160u32);
    let mut data = vec![spec.bg; (w * h) as usize];

    let mut rect = |x0: u32, y0: u32, x1: u32, y1: u32, v: u8| {
        for y in y0..y1.min(h) {
            for x in x0..x1.min(w) {
                data[(y * w + x) as usize] = v;
            }
        }
    };

    let fs = spec.size;
    let at = |frac: f64| (fs as f64 * frac) as u32;
    rect(spec.fx, spec.fy, spec.fx + fs, spec.fy + fs, spec.skin);

    let es = at(0.18);
    let ey = spec.fy + at(0.24);
    let eh = (es as f64 * 0.8) as u32;
    rect(spec.fx + at(0.18), ey, spec.fx + at(0.18) + es, ey + eh, spec.eye);
    rect(spec.fx + at(0.64), ey, spec.fx + at(0.64) + es, ey + eh, spec.eye);
    rect(
        spec.fx + at(0.30),
        spec.fy + at(0.70),
        spec.fx + at(0.70),
        spec.fy + at(0.82),
        spec.mouth,
    );

    if noise_amp > 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        for v in data.iter_mut() {
            let n = rng.gen_range(-noise_amp..=noise_amp);
            *v = (*v as i32 + n).clamp(0, 255) as u8;
        }
    }

    Frame::new(data, w, h).expect("buffer matches dimensions")
}

/// Canonical clean face at (40,40) with size 80 in a 160x160 frame.
pub(crate) fn face_frame() -> Frame {
    render_face(&FaceSpec::default(), 0, 0)
}

/// Canonical face with uniform noise.
pub(crate) fn noisy_face_frame(seed: u64, amp: i32) -> Frame {
    render_face(&FaceSpec::default(), amp, seed)
}

/// Canonical face translated by (dx, dy); a large shift between
/// consecutive frames triggers the excess-motion rejection.
pub(crate) fn shifted_face_frame(dx: i32, dy: i32, seed: u64, amp: i32) -> Frame {
    let base = FaceSpec::default();
    render_face(
        &FaceSpec {
            fx: (base.fx as i32 + dx).max(0) as u32,
            fy: (base.fy as i32 + dy).max(0) as u32,
            ..base
        },
        amp,
        seed,
    )
}

/// The raw face area of the canonical frame, resized to the canonical
/// extraction size.
pub(crate) fn face_crop_128() -> Frame {
    resize_bilinear(&face_frame().crop(40, 40, 80, 80), 128, 128)
}

/// 400x400 scene holding a face that fills 86% of the frame plus a small
/// secondary face drawn into the big one's forehead region.
pub(crate) fn oversized_face_scene() -> Frame {
    let (w, h) = (400u32, 400u32);
    let mut data = vec![40u8; (w * h) as usize];

    let mut draw = |fx: u32, fy: u32, fs: u32| {
        let mut rect = |x0: u32, y0: u32, x1: u32, y1: u32, v: u8| {
            for y in y0..y1.min(h) {
                for x in x0..x1.min(w) {
                    data[(y * w + x) as usize] = v;
                }
            }
        };
        let at = |frac: f64| (fs as f64 * frac) as u32;
        rect(fx, fy, fx + fs, fy + fs, 190);
        let es = at(0.18);
        let ey = fy + at(0.24);
        let eh = (es as f64 * 0.8) as u32;
        rect(fx + at(0.18), ey, fx + at(0.18) + es, ey + eh, 70);
        rect(fx + at(0.64), ey, fx + at(0.64) + es, ey + eh, 70);
        rect(fx + at(0.30), fy + at(0.70), fx + at(0.70), fy + at(0.82), 90);
    };
    draw(15, 15, 370);
    draw(168, 18, 64);

    Frame::new(data, w, h).expect("buffer matches dimensions")
}

pub(crate) fn noise_frame(w: u32, h: u32, seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..(w as usize * h as usize)).map(|_| rng.gen()).collect();
    Frame::new(data, w, h).expect("buffer matches dimensions")
}

pub(crate) fn gradient_frame(w: u32, h: u32, horizontal: bool) -> Frame {
    let mut data = vec![0u8; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let t = if horizontal {
                x as f64 / (w - 1) as f64
            } else {
                y as f64 / (h - 1) as f64
            };
            data[(y * w + x) as usize] = (t * 255.0) as u8;
        }
    }
    Frame::new(data, w, h).expect("buffer matches dimensions")
}

pub(crate) fn checker_frame(w: u32, h: u32, cell: u32) -> Frame {
    let mut data = vec![0u8; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            if (x / cell + y / cell) % 2 == 1 {
                data[(y * w + x) as usize] = 255;
            }
        }
    }
    Frame::new(data, w, h).expect("buffer matches dimensions")
}
