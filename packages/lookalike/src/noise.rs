//! Seeded 3D simplex noise.
//!
//! Smooth, deterministic for a given permutation table, output roughly in
//! [-1, 1]. The table is shuffled from a caller-provided RNG so tests can pin
//! the field with a seed.

use rand::seq::SliceRandom;
use rand::Rng;

const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;

/// Gradient directions: midpoints of the edges of a cube.
const GRAD3: [[f32; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

/// 3D simplex noise field.
#[derive(Clone)]
pub struct Noise3 {
    /// Doubled permutation table so lookups never wrap.
    perm: [u8; 512],
}

impl std::fmt::Debug for Noise3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Noise3").finish_non_exhaustive()
    }
}

impl Noise3 {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(rng);
        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = table[i & 255];
        }
        Self { perm }
    }

    fn gradient_dot(&self, i: i32, j: i32, k: i32, x: f32, y: f32, z: f32) -> f32 {
        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let kk = (k & 255) as usize;
        let idx = self.perm[ii + self.perm[jj + self.perm[kk] as usize] as usize] as usize % 12;
        let g = GRAD3[idx];
        g[0] * x + g[1] * y + g[2] * z
    }

    fn corner(&self, i: i32, j: i32, k: i32, x: f32, y: f32, z: f32) -> f32 {
        let t = 0.6 - x * x - y * y - z * z;
        if t < 0.0 {
            0.0
        } else {
            let t2 = t * t;
            t2 * t2 * self.gradient_dot(i, j, k, x, y, z)
        }
    }

    /// Sample the field at `(x, y, z)`.
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        // Skew into simplex cell space
        let s = (x + y + z) * F3;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();
        let t = (i + j + k) * G3;
        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);

        // Which of the six tetrahedra are we in?
        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - i1 as f32 + G3;
        let y1 = y0 - j1 as f32 + G3;
        let z1 = z0 - k1 as f32 + G3;
        let x2 = x0 - i2 as f32 + 2.0 * G3;
        let y2 = y0 - j2 as f32 + 2.0 * G3;
        let z2 = z0 - k2 as f32 + 2.0 * G3;
        let x3 = x0 - 1.0 + 3.0 * G3;
        let y3 = y0 - 1.0 + 3.0 * G3;
        let z3 = z0 - 1.0 + 3.0 * G3;

        let (i, j, k) = (i as i32, j as i32, k as i32);
        let n0 = self.corner(i, j, k, x0, y0, z0);
        let n1 = self.corner(i + i1, j + j1, k + k1, x1, y1, z1);
        let n2 = self.corner(i + i2, j + j2, k + k2, x2, y2, z2);
        let n3 = self.corner(i + 1, j + 1, k + 1, x3, y3, z3);

        // Scale so the result covers roughly [-1, 1]
        32.0 * (n0 + n1 + n2 + n3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn same_seed_same_field() {
        let a = Noise3::new(&mut StdRng::seed_from_u64(7));
        let b = Noise3::new(&mut StdRng::seed_from_u64(7));
        for i in 0..50 {
            let p = i as f32 * 0.37;
            assert_eq!(a.sample(p, p * 0.5, -p), b.sample(p, p * 0.5, -p));
        }
    }

    #[test]
    fn output_is_bounded() {
        let noise = Noise3::new(&mut StdRng::seed_from_u64(1));
        for i in 0..2000 {
            let f = i as f32;
            let v = noise.sample(f * 0.113, f * 0.071 - 3.0, f * 0.029 + 1.5);
            assert!(v.abs() <= 1.05, "sample {} out of range: {}", i, v);
        }
    }

    #[test]
    fn lattice_origin_is_zero() {
        let noise = Noise3::new(&mut StdRng::seed_from_u64(3));
        assert_eq!(noise.sample(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn field_is_continuous() {
        let noise = Noise3::new(&mut StdRng::seed_from_u64(11));
        let a = noise.sample(0.5, 0.25, 0.75);
        let b = noise.sample(0.5001, 0.25, 0.75);
        assert!((a - b).abs() < 0.01);
    }
}
