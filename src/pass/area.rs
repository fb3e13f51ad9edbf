//! Coverage table for the antialias blend.
//!
//! For a pixel sitting on a detected edge, the blend shader walks to both
//! ends of the edge run and reads this table at `(d1, d2)` — the distances
//! to each end. The table answers how much of the crossing neighbors to mix
//! in: the revectorized edge is modeled as a line crossing the run, so the
//! signed coverage at a pixel is `0.5 - (d1 + 0.5) / (d1 + d2 + 1)`. Near
//! the left end that is positive (blend from one side), near the right end
//! negative (blend from the other), and zero mid-run.
//!
//! Generation is pure CPU work; the antialias stage runs it on a background
//! thread and uploads the result as a 32x32 rgba8 texture.

/// Table resolution per axis; run distances clamp below this.
pub const AREA_SIZE: u32 = 32;

/// How far the blend shader walks along an edge run, per direction.
pub const MAX_SEARCH: u32 = 8;

/// Signed coverage for a pixel `d1` steps from one run end and `d2` from the
/// other. Positive blends the first crossing neighbor, negative the second.
pub fn coverage(d1: u32, d2: u32) -> f32 {
    let len = (d1 + d2 + 1) as f32;
    (0.5 - (d1 as f32 + 0.5) / len).clamp(-0.5, 0.5)
}

/// The full table as tightly packed rgba8 texels, `d1` along x and `d2`
/// along y. r holds the positive weight, g the negative one.
pub fn area_table() -> Vec<u8> {
    let size = AREA_SIZE as usize;
    let mut data = Vec::with_capacity(size * size * 4);
    for d2 in 0..AREA_SIZE {
        for d1 in 0..AREA_SIZE {
            let a = coverage(d1, d2);
            let w_first = a.max(0.0);
            let w_second = (-a).max(0.0);
            data.push((w_first * 255.0).round() as u8);
            data.push((w_second * 255.0).round() as u8);
            data.push(0);
            data.push(255);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(data: &[u8], d1: u32, d2: u32) -> (u8, u8) {
        let idx = ((d2 * AREA_SIZE + d1) * 4) as usize;
        (data[idx], data[idx + 1])
    }

    #[test]
    fn table_covers_every_distance_pair() {
        let data = area_table();
        assert_eq!(data.len(), (AREA_SIZE * AREA_SIZE * 4) as usize);
    }

    #[test]
    fn search_range_fits_inside_the_table() {
        assert!(MAX_SEARCH < AREA_SIZE);
    }

    #[test]
    fn weights_never_exceed_half_coverage() {
        let data = area_table();
        for chunk in data.chunks_exact(4) {
            assert!(chunk[0] <= 128, "positive weight above half: {}", chunk[0]);
            assert!(chunk[1] <= 128, "negative weight above half: {}", chunk[1]);
        }
    }

    #[test]
    fn mid_run_pixels_get_no_blend() {
        let data = area_table();
        for d in [0, 1, 5, 15, 31] {
            assert_eq!(texel(&data, d, d), (0, 0), "equidistant pixel at d = {d}");
        }
    }

    #[test]
    fn run_ends_get_the_strongest_blend() {
        let data = area_table();
        let (first, _) = texel(&data, 0, 31);
        assert!(first > 120, "left end of a long run should approach 0.5");
        let (_, second) = texel(&data, 31, 0);
        assert!(second > 120, "right end of a long run should approach 0.5");
    }

    #[test]
    fn coverage_falls_off_monotonically_along_a_run() {
        let d2 = 8;
        let mut last = f32::INFINITY;
        for d1 in 0..AREA_SIZE {
            let a = coverage(d1, d2);
            assert!(a < last, "coverage must strictly decrease in d1");
            last = a;
        }
    }

    #[test]
    fn swapping_ends_mirrors_the_weights() {
        let data = area_table();
        for d1 in 0..AREA_SIZE {
            for d2 in 0..AREA_SIZE {
                let (first, _) = texel(&data, d1, d2);
                let (_, second) = texel(&data, d2, d1);
                // Independent roundings may differ by one quantization step.
                assert!(
                    (first as i16 - second as i16).abs() <= 1,
                    "mirror mismatch at ({d1}, {d2}): {first} vs {second}"
                );
            }
        }
    }

    mod coverage_bounds {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn coverage_stays_signed_and_one_sided(d1 in 0u32..32, d2 in 0u32..32) {
                let a = coverage(d1, d2);
                prop_assert!((-0.5..=0.5).contains(&a));
                // A pixel blends from at most one side.
                prop_assert!(a.max(0.0) * (-a).max(0.0) == 0.0);
            }
        }
    }
}
