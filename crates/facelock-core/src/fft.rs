//! Radix-2 FFT used for the spectral feature slots.
//!
//! The canonical face crop is a power-of-two square, so a plain iterative
//! Cooley-Tukey transform covers everything the extractor needs.

/// Complex value as (re, im). A full complex type would be overkill here.
pub type Complex = (f64, f64);

#[inline]
fn c_add(a: Complex, b: Complex) -> Complex {
    (a.0 + b.0, a.1 + b.1)
}

#[inline]
fn c_sub(a: Complex, b: Complex) -> Complex {
    (a.0 - b.0, a.1 - b.1)
}

#[inline]
fn c_mul(a: Complex, b: Complex) -> Complex {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

/// In-place forward FFT. `data.len()` must be a power of two.
pub fn fft_in_place(data: &mut [Complex]) {
    let n = data.len();
    debug_assert!(n.is_power_of_two());
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    // Butterfly passes.
    let mut len = 2;
    while len <= n {
        let ang = -2.0 * std::f64::consts::PI / len as f64;
        let wlen: Complex = (ang.cos(), ang.sin());
        let mut i = 0;
        while i < n {
            let mut w: Complex = (1.0, 0.0);
            for k in 0..len / 2 {
                let u = data[i + k];
                let v = c_mul(data[i + k + len / 2], w);
                data[i + k] = c_add(u, v);
                data[i + k + len / 2] = c_sub(u, v);
                w = c_mul(w, wlen);
            }
            i += len;
        }
        len <<= 1;
    }
}

/// In-place 2D FFT of a square row-major grid: rows first, then columns.
pub fn fft2d_in_place(grid: &mut [Complex], size: usize) {
    debug_assert!(size.is_power_of_two());
    debug_assert_eq!(grid.len(), size * size);

    let mut line = vec![(0.0, 0.0); size];
    for y in 0..size {
        line.copy_from_slice(&grid[y * size..(y + 1) * size]);
        fft_in_place(&mut line);
        grid[y * size..(y + 1) * size].copy_from_slice(&line);
    }
    for x in 0..size {
        for y in 0..size {
            line[y] = grid[y * size + x];
        }
        fft_in_place(&mut line);
        for y in 0..size {
            grid[y * size + x] = line[y];
        }
    }
}

/// In-place inverse 2D FFT, via conjugation around the forward transform.
pub fn ifft2d_in_place(grid: &mut [Complex], size: usize) {
    for v in grid.iter_mut() {
        v.1 = -v.1;
    }
    fft2d_in_place(grid, size);
    let scale = 1.0 / (size * size) as f64;
    for v in grid.iter_mut() {
        v.0 *= scale;
        v.1 = -v.1 * scale;
    }
}

/// Forward 2D FFT of a grayscale image.
pub fn fft2d_of_pixels(pixels: &[u8], size: usize) -> Vec<Complex> {
    debug_assert_eq!(pixels.len(), size * size);
    let mut grid: Vec<Complex> = pixels.iter().map(|&p| (p as f64, 0.0)).collect();
    fft2d_in_place(&mut grid, size);
    grid
}

/// 2D FFT magnitude of a square power-of-two grayscale image, row-major.
pub fn fft2d_magnitude(pixels: &[u8], size: usize) -> Vec<f64> {
    fft2d_of_pixels(pixels, size)
        .iter()
        .map(|&(re, im)| re.hypot(im))
        .collect()
}
