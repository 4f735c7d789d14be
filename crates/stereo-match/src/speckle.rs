use crate::disparity::{DisparityMap, DISP_SCALE};

/// Invalidate small connected blobs.
///
/// Pixels are connected (4-neighbourhood) when both are valid and their
/// disparities differ by at most `max_diff_px`. Regions of at most
/// `max_speckle_size` pixels are marked invalid.
pub fn filter_speckles(map: &mut DisparityMap, max_speckle_size: u32, max_diff_px: u32) {
    if max_speckle_size == 0 {
        return;
    }
    let (w, h) = (map.width as usize, map.height as usize);
    let max_diff = max_diff_px as i32 * DISP_SCALE as i32;
    let mut label = vec![0u32; w * h];
    let mut next_label = 0u32;
    let mut stack = Vec::new();
    let mut region = Vec::new();

    for start in 0..w * h {
        if label[start] != 0 || map.data[start] == DisparityMap::INVALID {
            continue;
        }
        next_label += 1;
        label[start] = next_label;
        stack.push(start);
        region.clear();

        while let Some(p) = stack.pop() {
            region.push(p);
            let v = map.data[p] as i32;
            let (x, y) = (p % w, p / w);
            let neighbours = [
                (x > 0).then(|| p - 1),
                (x + 1 < w).then(|| p + 1),
                (y > 0).then(|| p - w),
                (y + 1 < h).then(|| p + w),
            ];
            for q in neighbours.into_iter().flatten() {
                let n = map.data[q];
                if label[q] == 0 && n != DisparityMap::INVALID && (n as i32 - v).abs() <= max_diff {
                    label[q] = next_label;
                    stack.push(q);
                }
            }
        }

        if region.len() <= max_speckle_size as usize {
            for &p in &region {
                map.data[p] = DisparityMap::INVALID;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_small_blob_keeps_large_region() {
        let mut map = DisparityMap::new_invalid(10, 10);
        for y in 0..10 {
            for x in 0..6 {
                map.data[y * 10 + x] = 160 + x as i16;
            }
        }
        // A 2x2 blob far from its surroundings.
        for (x, y) in [(8, 2), (9, 2), (8, 3), (9, 3)] {
            map.data[y * 10 + x] = 800;
        }
        filter_speckles(&mut map, 10, 2);
        assert_eq!(map.valid_count(), 60);
        assert_eq!(map.raw(8, 2), DisparityMap::INVALID);
        assert_eq!(map.raw(5, 9), 165);
    }

    #[test]
    fn disparity_jump_splits_regions() {
        let mut map = DisparityMap::new_invalid(8, 1);
        map.data.copy_from_slice(&[16, 16, 16, 16, 16, 400, 400, 16]);
        filter_speckles(&mut map, 2, 1);
        assert_eq!(map.raw(5, 0), DisparityMap::INVALID);
        assert_eq!(map.raw(6, 0), DisparityMap::INVALID);
        assert_eq!(map.raw(7, 0), DisparityMap::INVALID);
        assert_eq!(map.raw(0, 0), 16);
    }
}
