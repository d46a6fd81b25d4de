use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// 固定深度分割表中的一段 [lower, upper] 公分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthInterval {
    pub lower_cm: i32,
    pub upper_cm: i32,
}

impl DepthInterval {
    pub fn label(&self) -> String {
        format!("{}-{}cm", self.lower_cm, self.upper_cm)
    }
}

impl fmt::Display for DepthInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}cm", self.lower_cm, self.upper_cm)
    }
}

/// WCS coverage 識別碼，例如 "1"、"4"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerIdentifier(String);

impl LayerIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 主要估計值或信賴區間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Estimate,
    Percentile5,
    Percentile95,
}

impl ConfidenceBand {
    pub fn filename_suffix(&self) -> &'static str {
        match self {
            ConfidenceBand::Estimate => "",
            ConfidenceBand::Percentile5 => "_5percentile",
            ConfidenceBand::Percentile95 => "_95percentile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).abs()
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).abs()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// WCS/STAC 的 "minx,miny,maxx,maxy" 查詢字串
    pub fn to_query_value(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }

    pub fn to_polygon(&self) -> geo::Polygon<f64> {
        geo::Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        )
        .to_polygon()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        b.to_array()
    }
}

/// 單值或清單；單值會被廣播
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }

    /// 單值重複 `len` 次，清單原樣返回
    pub fn broadcast(self, len: usize) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v; len],
            OneOrMany::Many(v) => v,
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(v: T) -> Self {
        OneOrMany::One(v)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(v: Vec<T>) -> Self {
        OneOrMany::Many(v)
    }
}

/// 每個 (layer, depth range) 的擷取請求
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    pub property_name: String,
    pub layer_name: String,
    pub depth_min: i32,
    pub depth_max: i32,
    pub want_confidence_intervals: bool,
}

/// 請求格網：指定解析度或像素寬高
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridSpec {
    Resolution { resx: f64, resy: f64 },
    Size { width: usize, height: usize },
}

/// 一次 GetCoverage 呼叫的所有參數
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRequest {
    pub url: String,
    pub identifier: String,
    pub crs: String,
    pub bbox: BoundingBox,
    pub format: String,
    pub grid: GridSpec,
    pub time: Option<String>,
}

impl CoverageRequest {
    pub fn geotiff(
        url: impl Into<String>,
        identifier: impl Into<String>,
        crs: impl Into<String>,
        bbox: BoundingBox,
        grid: GridSpec,
    ) -> Self {
        Self {
            url: url.into(),
            identifier: identifier.into(),
            crs: crs.into(),
            bbox,
            format: "GeoTIFF".to_string(),
            grid,
            time: None,
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }
}

/// 單一擷取的結果
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(PathBuf),
    SkippedNoData,
    Failed(String),
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Success(p) => Some(p.as_path()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestEntry {
    pub label: String,
    pub outcome: FetchOutcome,
}

/// 一次擷取呼叫中所有 (layer, interval, band) 的結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestReport {
    pub entries: Vec<HarvestEntry>,
}

impl HarvestReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: impl Into<String>, outcome: FetchOutcome) {
        self.entries.push(HarvestEntry {
            label: label.into(),
            outcome,
        });
    }

    pub fn extend(&mut self, other: HarvestReport) {
        self.entries.extend(other.entries);
    }

    /// 成功寫入的檔案（依擷取順序）
    pub fn fetched_paths(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.path().map(Path::to_path_buf))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            FetchOutcome::Failed(reason) => Some((e.label.as_str(), reason.as_str())),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == FetchOutcome::SkippedNoData)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
