use crate::ops::shapes::dedup_points;
use crate::viewport::Point;

/// Default number of output samples per smoothing-window half-width.
pub const DEFAULT_SAMPLES_PER_UNIT: f32 = 10.0;

/// Smooth a closed freehand contour along its arc length.
///
/// The contour is resampled at evenly spaced arc-length positions; each
/// sample is the raised-cosine weighted mean of the original vertices whose
/// cyclic arc-length distance is below `2 * scale`.  Vertices are bucketed by
/// arc length into buckets no narrower than that window, so only the sample's
/// own and adjacent buckets are searched.
///
/// The result is an open point list; callers treat it as closed when filling.
pub fn smooth_contour(contour: &[Point], scale: f32, samples_per_unit: f32) -> Vec<Point> {
    let pts = dedup_points(contour);
    let n = pts.len();
    if n < 3 || scale.is_nan() || scale <= 0.0 || samples_per_unit.is_nan() || samples_per_unit <= 0.0 {
        return pts;
    }

    // Cumulative arc length; the closing edge only contributes to the total.
    let mut dist = Vec::with_capacity(n);
    let mut acc = 0.0_f32;
    dist.push(0.0);
    for i in 1..n {
        acc += pts[i].distance(pts[i - 1]);
        dist.push(acc);
    }
    let total = acc + pts[0].distance(pts[n - 1]);
    if total <= 0.0 {
        return pts;
    }

    let max_dist = 2.0 * scale;
    // Buckets at least one window wide, so every in-window vertex sits in the
    // sample's bucket or a cyclic neighbour, including across the seam.
    let bucket_count = ((total / max_dist).floor() as usize).max(1);
    let bucket_width = total / bucket_count as f32;
    let bucket_of = |d: f32| ((d / bucket_width).floor() as usize).min(bucket_count - 1);

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); bucket_count];
    for (i, &d) in dist.iter().enumerate() {
        buckets[bucket_of(d)].push(i);
    }

    let sample_count = ((samples_per_unit * total / max_dist).ceil() as usize).max(1);
    let mut out = Vec::with_capacity(sample_count);
    let mut searched: Vec<usize> = Vec::with_capacity(3);

    for k in 0..sample_count {
        let s = k as f32 * total / sample_count as f32;
        let b = bucket_of(s);

        searched.clear();
        for off in [bucket_count - 1, 0, 1] {
            let idx = (b + off) % bucket_count;
            if !searched.contains(&idx) {
                searched.push(idx);
            }
        }

        let (mut sx, mut sy, mut sw) = (0.0_f32, 0.0_f32, 0.0_f32);
        for &bucket in &searched {
            for &i in &buckets[bucket] {
                let direct = (s - dist[i]).abs();
                let d = direct.min(total - direct);
                if d < max_dist {
                    let w = 0.5 * (1.0 + (std::f32::consts::PI * d / max_dist).cos());
                    sx += w * pts[i].x;
                    sy += w * pts[i].y;
                    sw += w;
                }
            }
        }

        if sw > 0.0 {
            out.push(Point::new(sx / sw, sy / sw));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(cx: f32, cy: f32, r: f32, n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Point::new(cx + r * a.cos(), cy + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn circle_stays_on_circle() {
        let input = circle(100.0, 100.0, 50.0, 720);
        let scale = 0.5;
        let out = smooth_contour(&input, scale, DEFAULT_SAMPLES_PER_UNIT);
        assert!(!out.is_empty());
        for p in &out {
            let r = p.distance(Point::new(100.0, 100.0));
            assert!((r - 50.0).abs() < 2.0 * scale, "radius {r}");
        }
    }

    #[test]
    fn sample_count_follows_length() {
        let input = circle(0.0, 0.0, 20.0, 400);
        let total: f32 = (0..400)
            .map(|i| input[i].distance(input[(i + 1) % 400]))
            .sum();
        let out = smooth_contour(&input, 1.0, 10.0);
        let expected = (10.0 * total / 2.0).ceil() as usize;
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn jitter_is_reduced() {
        // Square with a zig-zag on every vertex.
        let mut input = Vec::new();
        for i in 0..200 {
            let t = i as f32 / 50.0;
            let jitter = if i % 2 == 0 { 0.4 } else { -0.4 };
            let p = match i / 50 {
                0 => Point::new(t * 40.0, jitter),
                1 => Point::new(40.0 + jitter, (t - 1.0) * 40.0),
                2 => Point::new(40.0 - (t - 2.0) * 40.0, 40.0 + jitter),
                _ => Point::new(jitter, 40.0 - (t - 3.0) * 40.0),
            };
            input.push(p);
        }
        let out = smooth_contour(&input, 1.0, 10.0);
        // Points along the middle of the top edge sit close to y = 0.
        let top: Vec<&Point> = out.iter().filter(|p| p.x > 10.0 && p.x < 30.0 && p.y < 5.0).collect();
        assert!(!top.is_empty());
        assert!(top.iter().all(|p| p.y.abs() < 0.2));
    }

    /// Every vertex weighed against every sample, no bucketing.
    fn smooth_all_vertices(contour: &[Point], scale: f32, samples_per_unit: f32) -> Vec<Point> {
        let n = contour.len();
        let mut dist = vec![0.0_f32];
        for i in 1..n {
            dist.push(dist[i - 1] + contour[i].distance(contour[i - 1]));
        }
        let total = dist[n - 1] + contour[0].distance(contour[n - 1]);
        let max_dist = 2.0 * scale;
        let count = ((samples_per_unit * total / max_dist).ceil() as usize).max(1);
        (0..count)
            .filter_map(|k| {
                let s = k as f32 * total / count as f32;
                let (mut sx, mut sy, mut sw) = (0.0_f32, 0.0_f32, 0.0_f32);
                for (p, &d) in contour.iter().zip(&dist) {
                    let direct = (s - d).abs();
                    let d = direct.min(total - direct);
                    if d < max_dist {
                        let w = 0.5 * (1.0 + (std::f32::consts::PI * d / max_dist).cos());
                        sx += w * p.x;
                        sy += w * p.y;
                        sw += w;
                    }
                }
                (sw > 0.0).then(|| Point::new(sx / sw, sy / sw))
            })
            .collect()
    }

    #[test]
    fn seam_neighbours_match_exhaustive_search() {
        // 10×5 rectangle walked in unit steps: perimeter 30.  A window of
        // 30 / 3.1 leaves a short remainder after three full windows.
        let mut input = Vec::new();
        for x in 0..10 {
            input.push(Point::new(x as f32, 0.0));
        }
        for y in 0..5 {
            input.push(Point::new(10.0, y as f32));
        }
        for x in (1..=10).rev() {
            input.push(Point::new(x as f32, 5.0));
        }
        for y in (1..=5).rev() {
            input.push(Point::new(0.0, y as f32));
        }
        let scale = 30.0 / 3.1 / 2.0;

        let fast = smooth_contour(&input, scale, 4.0);
        let exact = smooth_all_vertices(&input, scale, 4.0);
        assert_eq!(fast.len(), exact.len());
        for (i, (a, b)) in fast.iter().zip(&exact).enumerate() {
            assert!(a.distance(*b) < 1e-3, "sample {i}: {a:?} vs {b:?}");
        }
    }

    #[test]
    fn matches_exhaustive_search_for_many_windows() {
        let input = circle(10.0, -4.0, 7.0, 97);
        for scale in [0.3, 1.1, 2.9, 5.0, 40.0] {
            let fast = smooth_contour(&input, scale, 3.0);
            let exact = smooth_all_vertices(&input, scale, 3.0);
            assert_eq!(fast.len(), exact.len(), "scale {scale}");
            for (a, b) in fast.iter().zip(&exact) {
                assert!(a.distance(*b) < 1e-3, "scale {scale}: {a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn degenerate_inputs_pass_through() {
        let two = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert_eq!(smooth_contour(&two, 1.0, 10.0), two);
        let tri = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert_eq!(smooth_contour(&tri, 0.0, 10.0), tri);
    }
}
