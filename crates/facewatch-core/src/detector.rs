//! Haar cascade face detector.
//!
//! Evaluates an OpenCV-format boosted Haar cascade (`haarcascade_*.xml`)
//! over an image pyramid with integral images, then merges overlapping
//! window hits into face rectangles with a minimum-neighbors vote.

use crate::preprocess::resize_bilinear;
use crate::types::BoundingBox;
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

// --- Cascade evaluation constants ---
const DEFAULT_SCALE_FACTOR: f64 = 1.3;
const DEFAULT_MIN_NEIGHBORS: usize = 5;
const DEFAULT_MIN_FACE_SIZE: u32 = 50;
/// Relative tolerance used when deciding whether two hits are the same face.
const GROUP_EPS: f64 = 0.2;
/// Tolerance subtracted from every stage threshold.
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    NotFound(String),
    #[error("failed to read cascade: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed cascade: {0}")]
    Format(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid detector parameters: {0}")]
    InvalidParams(String),
}

/// Strategy for locating faces in a grayscale frame.
pub trait Detector: Send {
    fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox>;
}

/// Scan parameters for [`CascadeDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Multiplicative growth of the scan window per pyramid level (> 1).
    pub scale_factor: f64,
    /// A face is reported only when more than this many window hits agree.
    pub min_neighbors: usize,
    /// Smallest reported face side, in pixels.
    pub min_size: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_FACE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f32,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

/// Internal tree node. Child indices `<= 0` address leaves (`-idx`).
#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<Node>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted cascade of Haar-feature decision trees.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: &str) -> Result<Self, CascadeError> {
        if !Path::new(path).exists() {
            return Err(CascadeError::NotFound(path.to_string()));
        }
        let xml = std::fs::read_to_string(path)?;
        let cascade = Self::from_xml(&xml)?;
        tracing::info!(
            path,
            window = ?(cascade.window_width, cascade.window_height),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            "loaded Haar cascade"
        );
        Ok(cascade)
    }

    /// Parse the `opencv-cascade-classifier` XML layout.
    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| CascadeError::Format("missing <cascade> element".into()))?;

        let stage_type = text_of(root, "stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = text_of(root, "featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!("feature type {feature_type}")));
        }

        let window_width: u32 = parse_num(text_of(root, "width")?, "width")?;
        let window_height: u32 = parse_num(text_of(root, "height")?, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Format(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = elements(child(root, "features")?)
            .map(|node| parse_feature(node, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = elements(child(root, "stages")?)
            .map(|node| parse_stage(node, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::Format("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the base-size window whose top-left corner is
    /// `(wx, wy)`; true when all stages pass.
    fn classify_window(&self, ii: &IntegralImage, wx: u32, wy: u32) -> bool {
        // Variance normalization over the window shrunk by one pixel per side.
        let norm_w = self.window_width - 2;
        let norm_h = self.window_height - 2;
        let area = norm_w as f64 * norm_h as f64;
        let sum = ii.sum(wx + 1, wy + 1, norm_w, norm_h) as f64;
        let sq_sum = ii.sq_sum(wx + 1, wy + 1, norm_w, norm_h) as f64;
        let nf = area * sq_sum - sum * sum;
        let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };
        let inv_norm = 1.0 / nf;

        for stage in &self.stages {
            let mut stage_sum = 0.0f32;
            for weak in &stage.classifiers {
                let mut idx: i32 = 0;
                loop {
                    let node = &weak.nodes[idx as usize];
                    let value = self.feature_value(node.feature, ii, wx, wy) * inv_norm;
                    idx = if value < node.threshold as f64 {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break;
                    }
                }
                stage_sum += weak.leaves[(-idx) as usize];
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }

    fn feature_value(&self, feature: usize, ii: &IntegralImage, wx: u32, wy: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight as f64 * ii.sum(wx + r.x, wy + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// Multi-scale detector over a [`HaarCascade`].
pub struct CascadeDetector {
    cascade: HaarCascade,
    params: DetectorParams,
}

impl CascadeDetector {
    pub fn new(cascade: HaarCascade, params: DetectorParams) -> Result<Self, CascadeError> {
        if !(params.scale_factor > 1.0) {
            return Err(CascadeError::InvalidParams(format!(
                "scale factor must be > 1, got {}",
                params.scale_factor
            )));
        }
        Ok(Self { cascade, params })
    }

    /// Load the cascade file and build a detector in one step.
    pub fn load(path: &str, params: DetectorParams) -> Result<Self, CascadeError> {
        Self::new(HaarCascade::load(path)?, params)
    }

    /// Raw window hits in original-frame coordinates, before grouping.
    fn scan(&self, gray: &GrayImage) -> Vec<Rect> {
        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = self.cascade.window_size();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let window_w = (win_w as f64 * factor).round() as u32;
            let window_h = (win_h as f64 * factor).round() as u32;
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }

            if window_w >= self.params.min_size && window_h >= self.params.min_size {
                let resized;
                let scaled: &GrayImage = if factor == 1.0 {
                    gray
                } else {
                    resized = resize_bilinear(gray, scaled_w, scaled_h);
                    &resized
                };
                let ii = IntegralImage::new(scaled);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..=scaled_h - win_h).step_by(step) {
                    for x in (0..=scaled_w - win_w).step_by(step) {
                        if self.cascade.classify_window(&ii, x, y) {
                            hits.push(Rect {
                                x: (x as f64 * factor).round() as i32,
                                y: (y as f64 * factor).round() as i32,
                                width: window_w as i32,
                                height: window_h as i32,
                            });
                        }
                    }
                }
                tracing::trace!(factor, hits = hits.len(), "pyramid level scanned");
            }

            factor *= self.params.scale_factor;
        }

        hits
    }
}

impl Detector for CascadeDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        let (img_w, img_h) = gray.dimensions();
        let hits = self.scan(gray);
        let hit_count = hits.len();

        let faces: Vec<BoundingBox> = group_rectangles(hits, self.params.min_neighbors, GROUP_EPS)
            .into_iter()
            .filter(|(r, _)| r.width >= self.params.min_size as i32 && r.height >= self.params.min_size as i32)
            .filter_map(|(r, _)| r.to_bbox(img_w, img_h))
            .collect();

        tracing::debug!(hits = hit_count, faces = faces.len(), "cascade scan complete");
        faces
    }
}

/// Summed-area tables for pixel values and squared pixel values.
struct IntegralImage {
    stride: usize,
    sum: Vec<i64>,
    sq: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0i64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        let data = gray.as_raw();

        for y in 0..h {
            let mut row_sum = 0i64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let p = data[y * w + x] as i64;
                row_sum += p;
                row_sq += (p * p) as u64;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq }
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> i64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sum[y1 * self.stride + x1] - self.sum[y0 * self.stride + x1] - self.sum[y1 * self.stride + x0]
            + self.sum[y0 * self.stride + x0]
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        (self.sq[y1 * self.stride + x1] + self.sq[y0 * self.stride + x0])
            - (self.sq[y0 * self.stride + x1] + self.sq[y1 * self.stride + x0])
    }
}

/// Signed rectangle used while grouping window hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl Rect {
    fn to_bbox(self, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        let x = self.x.max(0) as u32;
        let y = self.y.max(0) as u32;
        let right = (self.x + self.width).max(0) as u32;
        let bottom = (self.y + self.height).max(0) as u32;
        BoundingBox::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y)).clamp_to(frame_w, frame_h)
    }
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.x + a.width - b.x - b.width).abs() as f64) <= delta
        && ((a.y + a.height - b.y - b.height).abs() as f64) <= delta
}

/// Cluster similar hits, average each cluster, and keep clusters with
/// more than `min_neighbors` members. Returns `(rect, hits)` pairs.
///
/// Small clusters nested inside a stronger cluster are dropped.
fn group_rectangles(rects: Vec<Rect>, min_neighbors: usize, eps: f64) -> Vec<(Rect, usize)> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.into_iter().map(|r| (r, 1)).collect();
    }

    // Union-find partition over the "similar" relation.
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; n];
    let mut sums: Vec<[i64; 4]> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = sums.len();
            sums.push([0; 4]);
            counts.push(0);
        }
        let cls = class_of_root[root];
        sums[cls][0] += r.x as i64;
        sums[cls][1] += r.y as i64;
        sums[cls][2] += r.width as i64;
        sums[cls][3] += r.height as i64;
        counts[cls] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| {
            let avg = |v: i64| (v as f64 / c as f64).round() as i32;
            Rect {
                x: avg(s[0]),
                y: avg(s[1]),
                width: avg(s[2]),
                height: avg(s[3]),
            }
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.width <= r2.x + r2.width + dx
                && r1.y + r1.height <= r2.y + r2.height + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            grouped.push((*r1, n1));
        }
    }
    grouped
}

fn child<'a, 'i>(node: roxmltree::Node<'a, 'i>, name: &str) -> Result<roxmltree::Node<'a, 'i>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| CascadeError::Format(format!("missing <{name}>")))
}

fn text_of<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str, CascadeError> {
    Ok(child(node, name)?.text().unwrap_or("").trim())
}

fn elements<'a, 'i>(node: roxmltree::Node<'a, 'i>) -> impl Iterator<Item = roxmltree::Node<'a, 'i>> {
    node.children().filter(|n| n.is_element())
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> Result<T, CascadeError> {
    s.parse()
        .map_err(|_| CascadeError::Format(format!("bad {what}: {s:?}")))
}

fn parse_list(s: &str, what: &str) -> Result<Vec<f64>, CascadeError> {
    s.split_whitespace().map(|tok| parse_num(tok, what)).collect()
}

fn parse_feature(node: roxmltree::Node, win_w: u32, win_h: u32) -> Result<HaarFeature, CascadeError> {
    if let Ok(tilted) = text_of(node, "tilted") {
        if tilted != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }

    let rects = elements(child(node, "rects")?)
        .map(|r| {
            let v = parse_list(r.text().unwrap_or(""), "rect")?;
            if v.len() != 5 {
                return Err(CascadeError::Format(format!("rect needs 5 values, got {}", v.len())));
            }
            if v[..4].iter().any(|&c| c < 0.0) {
                return Err(CascadeError::Format(format!("negative rect coordinate in {v:?}")));
            }
            let rect = WeightedRect {
                x: v[0] as u32,
                y: v[1] as u32,
                width: v[2] as u32,
                height: v[3] as u32,
                weight: v[4] as f32,
            };
            if rect.x + rect.width > win_w || rect.y + rect.height > win_h {
                return Err(CascadeError::Format(format!("rect {v:?} exceeds {win_w}x{win_h} window")));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(CascadeError::Format("feature without rects".into()));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: roxmltree::Node, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f32 = parse_num(text_of(node, "stageThreshold")?, "stageThreshold")?;

    let classifiers = elements(child(node, "weakClassifiers")?)
        .map(|weak| {
            let raw = parse_list(text_of(weak, "internalNodes")?, "internalNodes")?;
            let leaves: Vec<f32> = parse_list(text_of(weak, "leafValues")?, "leafValues")?
                .into_iter()
                .map(|v| v as f32)
                .collect();

            if raw.is_empty() || raw.len() % 4 != 0 {
                return Err(CascadeError::Format(format!(
                    "internalNodes length {} is not a positive multiple of 4",
                    raw.len()
                )));
            }
            let nodes: Vec<Node> = raw
                .chunks(4)
                .map(|c| Node {
                    left: c[0] as i32,
                    right: c[1] as i32,
                    feature: c[2] as usize,
                    threshold: c[3] as f32,
                })
                .collect();

            if leaves.len() != nodes.len() + 1 {
                return Err(CascadeError::Format(format!(
                    "{} nodes need {} leaves, got {}",
                    nodes.len(),
                    nodes.len() + 1,
                    leaves.len()
                )));
            }
            for node in &nodes {
                if node.feature >= feature_count {
                    return Err(CascadeError::Format(format!(
                        "feature index {} out of range ({feature_count} features)",
                        node.feature
                    )));
                }
                for idx in [node.left, node.right] {
                    let valid = if idx > 0 {
                        (idx as usize) < nodes.len()
                    } else {
                        ((-idx) as usize) < leaves.len()
                    };
                    if !valid {
                        return Err(CascadeError::Format(format!("tree index {idx} out of range")));
                    }
                }
            }
            Ok(WeakClassifier { nodes, leaves })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// One stage, one stump: fires when the left half of the window is
    /// brighter than the right half.
    const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams><maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams><maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.0000000000000001e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 12 24 1.</_>
        <_>
          12 0 12 24 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn edge_detector(min_neighbors: usize, min_size: u32) -> CascadeDetector {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        CascadeDetector::new(
            cascade,
            DetectorParams {
                scale_factor: 1.3,
                min_neighbors,
                min_size,
            },
        )
        .unwrap()
    }

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rect {
        Rect { x, y, width: w, height: h }
    }

    #[test]
    fn test_parse_cascade() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        assert_eq!(cascade.window_size(), (24, 24));
        assert_eq!(cascade.stage_count(), 1);
        assert_eq!(cascade.features.len(), 1);
        assert_eq!(cascade.features[0].rects.len(), 2);
        assert!((cascade.stages[0].threshold + STAGE_THRESHOLD_EPS).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_lbp() {
        let xml = EDGE_CASCADE.replace("<featureType>HAAR", "<featureType>LBP");
        assert!(matches!(HaarCascade::from_xml(&xml), Err(CascadeError::Unsupported(_))));
    }

    #[test]
    fn test_parse_rejects_tilted_features() {
        let xml = EDGE_CASCADE.replace("</rects></_></features>", "</rects><tilted>1</tilted></_></features>");
        assert!(matches!(HaarCascade::from_xml(&xml), Err(CascadeError::Unsupported(_))));
    }

    #[test]
    fn test_parse_rejects_out_of_range_feature() {
        let xml = EDGE_CASCADE.replace("0 -1 0 1.0000000000000001e-01", "0 -1 3 0.1");
        assert!(matches!(HaarCascade::from_xml(&xml), Err(CascadeError::Format(_))));
    }

    #[test]
    fn test_parse_rejects_rect_outside_window() {
        let xml = EDGE_CASCADE.replace("12 0 12 24 -1.", "20 0 12 24 -1.");
        assert!(matches!(HaarCascade::from_xml(&xml), Err(CascadeError::Format(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = HaarCascade::load("/nonexistent/cascade.xml");
        assert!(matches!(result, Err(CascadeError::NotFound(_))));
    }

    #[test]
    fn test_scale_factor_must_exceed_one() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let params = DetectorParams { scale_factor: 1.0, ..DetectorParams::default() };
        assert!(matches!(CascadeDetector::new(cascade, params), Err(CascadeError::InvalidParams(_))));
    }

    #[test]
    fn test_integral_sums() {
        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x + y * 4) as u8]));
        let ii = IntegralImage::new(&gray);
        assert_eq!(ii.sum(0, 0, 4, 3), (0..12).sum::<i64>());
        // Pixels 5, 6, 9, 10
        assert_eq!(ii.sum(1, 1, 2, 2), 30);
        assert_eq!(ii.sq_sum(1, 1, 2, 2), 25 + 36 + 81 + 100);
    }

    #[test]
    fn test_window_classification() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();

        let uniform = GrayImage::from_pixel(24, 24, Luma([200]));
        assert!(!cascade.classify_window(&IntegralImage::new(&uniform), 0, 0));

        let bright_left = GrayImage::from_fn(24, 24, |x, _| Luma([if x < 12 { 255 } else { 0 }]));
        assert!(cascade.classify_window(&IntegralImage::new(&bright_left), 0, 0));

        let bright_right = GrayImage::from_fn(24, 24, |x, _| Luma([if x < 12 { 0 } else { 255 }]));
        assert!(!cascade.classify_window(&IntegralImage::new(&bright_right), 0, 0));
    }

    #[test]
    fn test_detect_uniform_frame_finds_nothing() {
        let detector = edge_detector(2, 24);
        let gray = GrayImage::from_pixel(120, 120, Luma([90]));
        assert!(detector.detect(&gray).is_empty());
    }

    #[test]
    fn test_detect_finds_edge_pattern() {
        let detector = edge_detector(2, 24);
        // White block at 36..60 followed by black: a bright-left edge at x = 60.
        let gray = GrayImage::from_fn(120, 120, |x, y| {
            Luma([if (36..60).contains(&x) && (36..84).contains(&y) { 255 } else { 0 }])
        });
        let faces = detector.detect(&gray);
        assert!(!faces.is_empty());
        for face in &faces {
            let cx = face.x + face.width / 2;
            let cy = face.y + face.height / 2;
            assert!((30..=90).contains(&cx), "center x {cx} far from edge");
            assert!((20..=100).contains(&cy), "center y {cy} far from pattern");
            assert!(face.x + face.width <= 120 && face.y + face.height <= 120);
        }
    }

    #[test]
    fn test_detect_is_deterministic() {
        let detector = edge_detector(2, 24);
        let gray = GrayImage::from_fn(120, 120, |x, y| {
            Luma([if (36..60).contains(&x) && (36..84).contains(&y) { 255 } else { 0 }])
        });
        assert_eq!(detector.detect(&gray), detector.detect(&gray));
    }

    #[test]
    fn test_scan_covers_exact_fit_and_last_position() {
        let detector = edge_detector(0, 24);

        let exact = GrayImage::from_fn(24, 24, |x, _| Luma([if x < 12 { 255 } else { 0 }]));
        assert_eq!(detector.scan(&exact), vec![rect(0, 0, 24, 24)]);

        // Edge only lines up with the last horizontal window position.
        let shifted = GrayImage::from_fn(26, 24, |x, _| Luma([if (2..14).contains(&x) { 255 } else { 0 }]));
        assert!(detector.scan(&shifted).contains(&rect(2, 0, 24, 24)));
    }

    #[test]
    fn test_min_size_larger_than_frame_finds_nothing() {
        let detector = edge_detector(2, 500);
        let gray = GrayImage::from_fn(120, 120, |x, _| Luma([if x < 60 { 255 } else { 0 }]));
        assert!(detector.detect(&gray).is_empty());
    }

    #[test]
    fn test_group_requires_more_than_min_neighbors() {
        let hits = vec![
            rect(100, 100, 50, 50),
            rect(101, 100, 50, 50),
            rect(100, 101, 50, 50),
            rect(102, 101, 50, 50),
        ];
        assert!(group_rectangles(hits.clone(), 4, GROUP_EPS).is_empty());
        let grouped = group_rectangles(hits, 3, GROUP_EPS);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].1, 4);
        assert_eq!(grouped[0].0, rect(101, 101, 50, 50));
    }

    #[test]
    fn test_group_separates_distant_clusters() {
        let mut hits = vec![rect(0, 0, 30, 30); 3];
        hits.extend(vec![rect(200, 200, 30, 30); 3]);
        hits.push(rect(400, 0, 30, 30));
        let grouped = group_rectangles(hits, 2, GROUP_EPS);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.iter().all(|(_, n)| *n == 3));
    }

    #[test]
    fn test_group_drops_weak_nested_cluster() {
        let mut hits = vec![rect(100, 100, 100, 100); 8];
        hits.extend(vec![rect(130, 130, 30, 30); 3]);
        let grouped = group_rectangles(hits, 2, GROUP_EPS);
        assert_eq!(grouped, vec![(rect(100, 100, 100, 100), 8)]);
    }

    #[test]
    fn test_group_zero_neighbors_passes_through() {
        let hits = vec![rect(0, 0, 10, 10), rect(1, 1, 10, 10)];
        assert_eq!(group_rectangles(hits, 0, GROUP_EPS).len(), 2);
    }
}
