use crate::rng::hash2;

#[inline]
fn smootherstep(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 2D gradient noise (Perlin-style) in roughly [-1, 1].
#[inline]
pub fn gradient_noise(x: f32, y: f32, seed: u32) -> f32 {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let fx = x - ix as f32;
    let fy = y - iy as f32;
    let sx = smootherstep(fx);
    let sy = smootherstep(fy);

    #[inline]
    fn grad(hash: u32, dx: f32, dy: f32) -> f32 {
        // 16 evenly-spaced unit gradients (every 22.5°).
        match hash & 15 {
            0  =>  dx,
            1  =>  0.924 * dx + 0.383 * dy,
            2  =>  0.707 * (dx + dy),
            3  =>  0.383 * dx + 0.924 * dy,
            4  =>  dy,
            5  => -0.383 * dx + 0.924 * dy,
            6  =>  0.707 * (-dx + dy),
            7  => -0.924 * dx + 0.383 * dy,
            8  => -dx,
            9  => -0.924 * dx - 0.383 * dy,
            10 =>  0.707 * (-dx - dy),
            11 => -0.383 * dx - 0.924 * dy,
            12 => -dy,
            13 =>  0.383 * dx - 0.924 * dy,
            14 =>  0.707 * (dx - dy),
            _  =>  0.924 * dx - 0.383 * dy,
        }
    }

    let v00 = grad(hash2(ix, iy, seed), fx, fy);
    let v10 = grad(hash2(ix + 1, iy, seed), fx - 1.0, fy);
    let v01 = grad(hash2(ix, iy + 1, seed), fx, fy - 1.0);
    let v11 = grad(hash2(ix + 1, iy + 1, seed), fx - 1.0, fy - 1.0);

    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    lerp(a, b, sy) * 1.414
}

/// Octave stack shared by `fbm` and `ridged`.
#[derive(Clone, Copy, Debug)]
pub struct Octaves {
    pub count: u32,
    /// Base frequency in cycles per world unit.
    pub frequency: f32,
    pub lacunarity: f32,
    pub gain: f32,
}

impl Octaves {
    pub const fn new(count: u32, frequency: f32) -> Self {
        Self {
            count,
            frequency,
            lacunarity: 2.0,
            gain: 0.5,
        }
    }

    /// Normalized weighted sum of `shape(noise)` over the stack, rotating the
    /// sample plane ~30° per octave to break grid alignment.
    #[inline]
    fn accumulate(&self, x: f32, y: f32, seed: u32, shape: impl Fn(f32) -> f32) -> f32 {
        const COS30: f32 = 0.866025;
        const SIN30: f32 = 0.5;
        let mut sum = 0.0;
        let mut norm = 0.0;
        let mut amp = 1.0;
        let mut freq = self.frequency;
        let (mut px, mut py) = (x, y);
        for i in 0..self.count {
            sum += shape(gradient_noise(px * freq, py * freq, seed.wrapping_add(i))) * amp;
            norm += amp;
            amp *= self.gain;
            freq *= self.lacunarity;
            (px, py) = (px * COS30 - py * SIN30, px * SIN30 + py * COS30);
        }
        if norm > 0.0 { sum / norm } else { 0.0 }
    }
}

/// Fractal Brownian motion in roughly [-1, 1].
pub fn fbm(x: f32, y: f32, seed: u32, octaves: &Octaves) -> f32 {
    octaves.accumulate(x, y, seed, |n| n)
}

/// Ridged multifractal in [0, 1]; sharp crests where the noise crosses zero.
pub fn ridged(x: f32, y: f32, seed: u32, octaves: &Octaves) -> f32 {
    octaves.accumulate(x, y, seed, |n| 1.0 - n.abs())
}
