use crate::shared::region::FaceRegion;

/// Greedy single-pass IoU clustering.
///
/// Each region joins the first cluster it overlaps by more than
/// `iou_threshold`, growing that cluster to the bounding box of both;
/// otherwise it starts a new cluster. Order-dependent: the first region seen
/// anchors a cluster. Clusters only ever grow, so appending regions to the
/// input never shrinks [`total_area`] of the output.
pub fn compute_union(regions: &[FaceRegion], iou_threshold: f64) -> Vec<FaceRegion> {
    let mut clusters: Vec<FaceRegion> = Vec::new();
    for region in regions.iter().filter(|r| !r.is_empty()) {
        match clusters
            .iter_mut()
            .find(|cluster| cluster.iou(region) > iou_threshold)
        {
            Some(cluster) => *cluster = cluster.bounding_union(region),
            None => {
                let mut seed = region.clone();
                seed.contour = None;
                clusters.push(seed);
            }
        }
    }
    clusters
}

/// Sum of areas; overlaps are double-counted.
pub fn total_area(regions: &[FaceRegion]) -> f64 {
    regions.iter().map(FaceRegion::area).sum()
}

/// Whether `after` covers materially more than `before`: more regions, or
/// total area larger by more than `factor`.
pub fn coverage_grew(before: &[FaceRegion], after: &[FaceRegion], factor: f64) -> bool {
    after.len() > before.len() || total_area(after) > total_area(before) * factor
}
