use crate::{LonLat, MAX_DISTANCE_STOP_TO_LINE};

const ON_LINE_EPSILON: f64 = 1e-9;
const DEGENERATE_SEGMENT_EPSILON: f64 = 1e-14;

/// Where a point lands on a polyline.
#[derive(Clone, Debug, PartialEq)]
pub struct LineProjection {
    /// Fractional vertex indices of every occurrence of the projected point
    /// on the line, sorted ascending. More than one value means the line
    /// passes through the same place repeatedly (loops).
    pub positions_on_line: Vec<f64>,
    pub projected_point: LonLat,
}

/// The position u in [0, 1] of the orthogonal projection of `p` along the
/// segment from `p1` to `p2`. None if the segment is degenerate or the
/// projection falls outside the segment.
pub fn project_on_segment(p: LonLat, p1: LonLat, p2: LonLat) -> Option<f64> {
    let dx = p2.lon - p1.lon;
    let dy = p2.lat - p1.lat;
    let d2 = dx * dx + dy * dy;
    if d2 < DEGENERATE_SEGMENT_EPSILON {
        return None;
    }
    let u = ((p.lon - p1.lon) * dx + (p.lat - p1.lat) * dy) / d2;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    Some(u)
}

/// Projects `p` onto the closest place on `line`, looking no further than
/// five times the stop-to-line limit. Checks vertices first, then segment
/// interiors with a cheap bbox test. Repeated occurrences of the winning
/// point (the line doubling over itself) are all collected.
pub fn project_on_line(p: LonLat, line: &[LonLat]) -> Option<LineProjection> {
    if line.len() < 2 {
        return None;
    }

    let mut result: Option<LineProjection> = None;
    let mut d_min = MAX_DISTANCE_STOP_TO_LINE * 5.0;
    let mut closest_to_vertex = false;

    for (i, vertex) in line.iter().enumerate() {
        let d = p.gps_dist_meters(*vertex);
        if d < d_min {
            result = Some(LineProjection {
                positions_on_line: vec![i as f64],
                projected_point: *vertex,
            });
            d_min = d;
            closest_to_vertex = true;
        } else if let Some(ref mut r) = result {
            // Repeated occurrence of the track vertex, like Oslo Line 5
            if *vertex == r.projected_point {
                r.positions_on_line.push(i as f64);
            }
        }
    }

    for seg in 0..line.len() - 1 {
        // Cheap bbox check first
        if !(line[seg].lon.min(line[seg + 1].lon) - MAX_DISTANCE_STOP_TO_LINE <= p.lon
            && p.lon <= line[seg].lon.max(line[seg + 1].lon) + MAX_DISTANCE_STOP_TO_LINE
            && line[seg].lat.min(line[seg + 1].lat) - MAX_DISTANCE_STOP_TO_LINE <= p.lat
            && p.lat <= line[seg].lat.max(line[seg + 1].lat) + MAX_DISTANCE_STOP_TO_LINE)
        {
            continue;
        }
        let u = match project_on_segment(p, line[seg], line[seg + 1]) {
            Some(u) if u != 0.0 => u,
            // u = 0 coincides with the vertex already handled above
            _ => continue,
        };
        let projected = LonLat::new(
            line[seg].lon + u * (line[seg + 1].lon - line[seg].lon),
            line[seg].lat + u * (line[seg + 1].lat - line[seg].lat),
        );
        let d = p.gps_dist_meters(projected);
        if d < d_min {
            result = Some(LineProjection {
                positions_on_line: vec![seg as f64 + u],
                projected_point: projected,
            });
            d_min = d;
            closest_to_vertex = false;
        } else if let Some(ref mut r) = result {
            // Repeated occurrence of the track segment, like Oslo Line 5
            if projected == r.projected_point && !closest_to_vertex {
                r.positions_on_line.push(seg as f64 + u);
            }
        }
    }
    result
}

/// Locates a point that is known to lie on the line. Returns the segment
/// index and the position inside that segment. Only exact axis-aligned
/// arithmetic with a tiny epsilon; use `project_on_line` for points that
/// are merely near the line.
pub fn find_segment(p: LonLat, line: &[LonLat], start_vertex: usize) -> Option<(usize, f64)> {
    for seg in start_vertex..line.len().saturating_sub(1) {
        if p.is_near(line[seg]) {
            return Some((seg, 0.0));
        }
        let px = if line[seg].lon == line[seg + 1].lon {
            if !(p.lon - ON_LINE_EPSILON <= line[seg].lon
                && line[seg].lon <= p.lon + ON_LINE_EPSILON)
            {
                continue;
            }
            None
        } else {
            Some((p.lon - line[seg].lon) / (line[seg + 1].lon - line[seg].lon))
        };
        if px.map_or(true, |x| (0.0..=1.0).contains(&x)) {
            let py = if line[seg].lat == line[seg + 1].lat {
                if !(p.lat - ON_LINE_EPSILON <= line[seg].lat
                    && line[seg].lat <= p.lat + ON_LINE_EPSILON)
                {
                    continue;
                }
                None
            } else {
                Some((p.lat - line[seg].lat) / (line[seg + 1].lat - line[seg].lat))
            };
            let consistent = match (px, py) {
                (Some(x), Some(y)) => x - ON_LINE_EPSILON <= y && y <= x + ON_LINE_EPSILON,
                _ => true,
            };
            if py.map_or(true, |y| (0.0..=1.0).contains(&y)) && consistent {
                let u = match (px, py) {
                    (Some(x), _) if x != 0.0 => x,
                    (_, Some(y)) => y,
                    (Some(x), None) => x,
                    (None, None) => 0.0,
                };
                return Some((seg, u));
            }
        }
    }
    None
}

/// Path length along the line between two points lying on it. Returns the
/// length and the vertex to resume from for the next leg. For a closed line
/// the search for `p2` wraps around once. None if either point cannot be
/// located.
pub fn distance_on_line(
    p1: LonLat,
    p2: LonLat,
    line: &[LonLat],
    start_vertex: usize,
) -> Option<(f64, usize)> {
    let line_len = line.len();
    let (seg1, pos1) = find_segment(p1, line, start_vertex)?;
    if let Some(located) = find_segment(p2, line, seg1) {
        return finish_distance_on_line(pos1, seg1, located, line, line_len);
    }
    if line_len >= 2 && line[0] == line[line_len - 1] {
        let mut extended = line.to_vec();
        extended.extend_from_slice(&line[1..]);
        let located = find_segment(p2, &extended, seg1)?;
        return finish_distance_on_line(pos1, seg1, located, &extended, line_len);
    }
    None
}

fn finish_distance_on_line(
    pos1: f64,
    seg1: usize,
    (seg2, pos2): (usize, f64),
    line: &[LonLat],
    line_len: usize,
) -> Option<(f64, usize)> {
    if seg1 == seg2 {
        let d = line[seg1].gps_dist_meters(line[seg1 + 1]) * (pos2 - pos1).abs();
        return Some((d, seg1 % line_len));
    }
    let mut d = 0.0;
    if pos1 < 1.0 {
        d += line[seg1].gps_dist_meters(line[seg1 + 1]) * (1.0 - pos1);
    }
    for i in seg1 + 1..seg2 {
        d += line[i].gps_dist_meters(line[i + 1]);
    }
    if pos2 > 0.0 {
        d += line[seg2].gps_dist_meters(line[seg2 + 1]) * pos2;
    }
    Some((d, seg2 % line_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIFT: f64 = 1e-6;

    fn check_bulk(
        points: &[(f64, f64)],
        segments: &[((f64, f64), (f64, f64))],
        answers: &[Option<f64>],
    ) {
        for (point, answer) in points.iter().zip(answers) {
            let p = LonLat::new(point.0, point.1);
            for (a, b) in segments {
                for (s1, s2, ans) in [
                    (*a, *b, *answer),
                    (*b, *a, answer.map(|u| 1.0 - u)),
                ] {
                    let u = project_on_segment(
                        p,
                        LonLat::new(s1.0, s1.1),
                        LonLat::new(s2.0, s2.1),
                    );
                    match (u, ans) {
                        (None, None) => {}
                        (Some(u), Some(ans)) => {
                            assert!(
                                (u - ans).abs() < 1e-10,
                                "projection of {} onto {:?}-{:?}: got {}, want {}",
                                p,
                                s1,
                                s2,
                                u,
                                ans
                            );
                        }
                        _ => panic!(
                            "projection of {} onto {:?}-{:?}: got {:?}, want {:?}",
                            p, s1, s2, u, ans
                        ),
                    }
                }
            }
        }
    }

    #[test]
    fn test_projection_on_horizontal_segments() {
        let points = [
            (-2.0, 0.0),
            (-1.0 - SHIFT, 0.0),
            (-1.0, 0.0),
            (-1.0 + SHIFT, 0.0),
            (-0.5, 0.0),
            (0.0, 0.0),
            (0.5, 0.0),
            (1.0 - SHIFT, 0.0),
            (1.0, 0.0),
            (1.0 + SHIFT, 0.0),
            (2.0, 0.0),
        ];
        let segments = [
            ((-1.0, -1.0), (1.0, -1.0)),
            ((-1.0, 0.0), (1.0, 0.0)),
            ((-1.0, 1.0), (1.0, 1.0)),
        ];
        let answers = [
            None,
            None,
            Some(0.0),
            Some(SHIFT / 2.0),
            Some(0.25),
            Some(0.5),
            Some(0.75),
            Some(1.0 - SHIFT / 2.0),
            Some(1.0),
            None,
            None,
        ];
        check_bulk(&points, &segments, &answers);
    }

    #[test]
    fn test_projection_on_vertical_segments() {
        let points = [
            (0.0, -2.0),
            (0.0, -1.0 - SHIFT),
            (0.0, -1.0),
            (0.0, -1.0 + SHIFT),
            (0.0, -0.5),
            (0.0, 0.0),
            (0.0, 0.5),
            (0.0, 1.0 - SHIFT),
            (0.0, 1.0),
            (0.0, 1.0 + SHIFT),
            (0.0, 2.0),
        ];
        let segments = [
            ((-1.0, -1.0), (-1.0, 1.0)),
            ((0.0, -1.0), (0.0, 1.0)),
            ((1.0, -1.0), (1.0, 1.0)),
        ];
        let answers = [
            None,
            None,
            Some(0.0),
            Some(SHIFT / 2.0),
            Some(0.25),
            Some(0.5),
            Some(0.75),
            Some(1.0 - SHIFT / 2.0),
            Some(1.0),
            None,
            None,
        ];
        check_bulk(&points, &segments, &answers);
    }

    #[test]
    fn test_projection_on_inclined_segment() {
        let points = [
            (-2.0, -2.0),
            (-1.0, -1.0),
            (-0.5, -0.5),
            (0.0, 0.0),
            (0.5, 0.5),
            (1.0, 1.0),
            (2.0, 2.0),
        ];
        let segments = [
            ((-2.0, 0.0), (0.0, 2.0)),
            ((-1.0, -1.0), (1.0, 1.0)),
            ((0.0, -2.0), (2.0, 0.0)),
        ];
        let answers = [
            None,
            Some(0.0),
            Some(0.25),
            Some(0.5),
            Some(0.75),
            Some(1.0),
            None,
        ];
        check_bulk(&points, &segments, &answers);
    }

    #[test]
    fn test_projection_on_degenerate_segment() {
        for x in [-1.0, 0.0, 1.0] {
            for y in [-1.0, 0.0, 1.0] {
                let p = LonLat::new(x, y);
                assert_eq!(
                    project_on_segment(p, LonLat::new(0.0, 0.0), LonLat::new(0.0, 0.0)),
                    None
                );
                assert_eq!(
                    project_on_segment(p, LonLat::new(0.0, 0.0), LonLat::new(0.0, 1e-8)),
                    None
                );
            }
        }
    }

    fn line(pts: &[(f64, f64)]) -> Vec<LonLat> {
        pts.iter().map(|(x, y)| LonLat::new(*x, *y)).collect()
    }

    #[test]
    fn test_project_on_line_simple() {
        let tracks = line(&[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)]);
        let p = project_on_line(LonLat::new(0.0005, 0.0001), &tracks).unwrap();
        assert_eq!(p.positions_on_line, vec![0.5]);
        assert!(p.projected_point.is_near(LonLat::new(0.0005, 0.0)));

        // A stop exactly at a vertex
        let p = project_on_line(LonLat::new(0.001, 0.0), &tracks).unwrap();
        assert_eq!(p.positions_on_line, vec![1.0]);

        // Far away from everything
        assert!(project_on_line(LonLat::new(1.0, 1.0), &tracks).is_none());
    }

    #[test]
    fn test_project_on_line_collects_repeated_vertices() {
        // The line passes through the same point twice
        let tracks = line(&[
            (0.0, 0.0),
            (0.001, 0.0),
            (0.001, 0.001),
            (0.0005, 0.001),
            (0.001, 0.0),
            (0.002, 0.0),
        ]);
        let p = project_on_line(LonLat::new(0.001, -0.00001), &tracks).unwrap();
        assert_eq!(p.positions_on_line, vec![1.0, 4.0]);
    }

    #[test]
    fn test_find_segment() {
        let tracks = line(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001)]);
        assert_eq!(find_segment(LonLat::new(0.0, 0.0), &tracks, 0), Some((0, 0.0)));
        let (seg, u) = find_segment(LonLat::new(0.0005, 0.0), &tracks, 0).unwrap();
        assert_eq!(seg, 0);
        assert!((u - 0.5).abs() < 1e-9);
        let (seg, u) = find_segment(LonLat::new(0.001, 0.00025), &tracks, 0).unwrap();
        assert_eq!(seg, 1);
        assert!((u - 0.25).abs() < 1e-9);
        assert_eq!(find_segment(LonLat::new(0.5, 0.5), &tracks, 0), None);
        // Searching past the match returns nothing
        assert_eq!(find_segment(LonLat::new(0.0005, 0.0), &tracks, 1), None);
    }

    #[test]
    fn test_distance_on_line() {
        let tracks = line(&[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)]);
        let (d, vertex) =
            distance_on_line(LonLat::new(0.0, 0.0), LonLat::new(0.002, 0.0), &tracks, 0)
                .unwrap();
        let straight = LonLat::new(0.0, 0.0).gps_dist_meters(LonLat::new(0.002, 0.0));
        assert!((d - straight).abs() < 0.01);
        assert_eq!(vertex, 1);
    }

    #[test]
    fn test_distance_on_line_wraps_around_closed_line() {
        let tracks = line(&[
            (0.0, 0.0),
            (0.001, 0.0),
            (0.001, 0.001),
            (0.0, 0.001),
            (0.0, 0.0),
        ]);
        // From the last segment back to the first: possible only by wrapping
        let (d, vertex) =
            distance_on_line(LonLat::new(0.0, 0.001), LonLat::new(0.001, 0.0), &tracks, 3)
                .unwrap();
        let side = LonLat::new(0.0, 0.0).gps_dist_meters(LonLat::new(0.001, 0.0));
        assert!((d - 2.0 * side).abs() < 1.0, "distance {}", d);
        assert_eq!(vertex, 4);
    }
}
