// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/sample.rs - 检测结果（marking）数据模型与解析
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::HashMap;

use roxmltree::{Document, Node};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
  #[error("XML syntax error: {0}")]
  Syntax(roxmltree::Error),
  #[error("missing attribute `{attr}` on <{tag}>")]
  MissingAttribute { tag: String, attr: &'static str },
  #[error("missing element <{missing}> in <{parent}>")]
  MissingElement {
    parent: &'static str,
    missing: &'static str,
  },
  #[error("invalid number in attribute `{attr}`: `{value}`")]
  InvalidNumber { attr: &'static str, value: String },
  #[error("attribute `size` must be `WxH`, found `{0}`")]
  InvalidSize(String),
  #[error("pose must contain 6 values, found {0}")]
  InvalidPose(usize),
}

impl From<roxmltree::Error> for ParseError {
  fn from(err: roxmltree::Error) -> Self {
    ParseError::Syntax(err)
  }
}

/// 2x3 视图变换矩阵。
///
/// 本地库把六个值按逗号展平输出，先按 3 行 2 列排列再转置，
/// 即 `[[v0, v2, v4], [v1, v3, v5]]`。封装在这里，约定若有修正只改此处。
#[derive(Debug, Clone, PartialEq)]
pub struct Pose(pub [[f32; 3]; 2]);

impl Pose {
  fn from_attr(attr: &'static str, value: &str) -> Result<Self, ParseError> {
    let values = parse_float_list(attr, value)?;
    if values.len() != 6 {
      return Err(ParseError::InvalidPose(values.len()));
    }
    Ok(Pose([
      [values[0], values[2], values[4]],
      [values[1], values[3], values[5]],
    ]))
  }
}

/// 红色（判定）工具结果中的缺陷区域。
#[derive(Debug, Clone)]
pub struct Region {
  pub area: f32,
  pub center: [f32; 2],
  pub score: f32,
  /// 区域轮廓点，保持库的原始编码不解析
  pub points: String,
}

/// 红色（判定）工具结果。
#[derive(Debug, Clone)]
pub struct RedResult {
  pub score: f32,
  pub mode: String,
  pub threshold: Vec<f32>,
  /// 命名资源 -> uuid
  pub resources: HashMap<String, String>,
  pub regions: Vec<Region>,
}

/// 绿色（分类）工具结果：标签名 -> 置信度。
#[derive(Debug, Clone)]
pub struct GreenResult {
  pub tags: HashMap<String, f32>,
}

/// 蓝色（特征匹配）工具提取的单个特征。
#[derive(Debug, Clone)]
pub struct Feature {
  pub id: String,
  pub score: f32,
  pub loc: [f32; 2],
  pub size: f32,
  pub angle: f32,
}

/// 蓝色（特征匹配）工具的单个匹配。
#[derive(Debug, Clone)]
pub struct MatchResult {
  pub model_id: String,
  pub score: f32,
  pub node_coords: String,
  pub string: String,
  pub pose: Pose,
  /// 参与匹配的特征索引（按文档顺序）
  pub feat: Vec<String>,
}

/// 蓝色（特征匹配）工具结果。
#[derive(Debug, Clone)]
pub struct BlueResult {
  pub features: Vec<Feature>,
  pub matches: Vec<MatchResult>,
}

/// 单个检查视图。
///
/// 三种结果形态理论上互斥，但解析不做此假设：出现哪种就填哪种。
#[derive(Debug, Clone)]
pub struct View {
  /// [宽, 高]
  pub size: [f32; 2],
  pub pose: Pose,
  pub red: Option<RedResult>,
  pub green: Option<GreenResult>,
  pub blue: Option<BlueResult>,
}

/// 单个工具的标记结果。
#[derive(Debug, Clone)]
pub struct Marking {
  pub tool_name: String,
  /// 视图按文档顺序排列（与相机/检查视图顺序一致）
  pub views: Vec<View>,
}

/// 一次 `process` 调用的完整解析结果。
#[derive(Debug, Clone, Default)]
pub struct Sample {
  /// 工具名 -> 标记。同名工具重复出现时后者覆盖前者（继承自本地库
  /// 的既有行为，调用方不应依赖重复工具名）。
  pub markings: HashMap<String, Marking>,
}

impl Sample {
  /// 解析 `vidi_runtime_process` 返回的 XML 片段。
  ///
  /// 每次调用都从空映射开始，调用之间不共享任何状态。
  pub fn parse(xml: &str) -> Result<Sample, ParseError> {
    let doc = Document::parse(xml)?;
    let mut markings = HashMap::new();

    for node in doc
      .descendants()
      .filter(|n| n.has_tag_name("marking"))
    {
      let tool_name = required_attr(&node, "tool_name")?.to_string();
      let views = node
        .children()
        .filter(|n| n.has_tag_name("view"))
        .map(|view| parse_view(&view))
        .collect::<Result<Vec<_>, _>>()?;

      markings.insert(
        tool_name.clone(),
        Marking { tool_name, views },
      );
    }

    Ok(Sample { markings })
  }

  pub fn marking(&self, tool_name: &str) -> Option<&Marking> {
    self.markings.get(tool_name)
  }

  pub fn is_empty(&self) -> bool {
    self.markings.is_empty()
  }
}

fn parse_view(node: &Node) -> Result<View, ParseError> {
  let size = parse_size(required_attr(node, "size")?)?;
  let pose = Pose::from_attr("pose", required_attr(node, "pose")?)?;

  let mut view = View {
    size,
    pose,
    red: None,
    green: None,
    blue: None,
  };

  for child in node.children().filter(Node::is_element) {
    match child.tag_name().name() {
      "red" => view.red = Some(parse_red(&child)?),
      "green" => view.green = Some(parse_green(&child)?),
      "blue" => view.blue = Some(parse_blue(&child)?),
      _ => {}
    }
  }

  Ok(view)
}

fn parse_red(node: &Node) -> Result<RedResult, ParseError> {
  let score = float_attr(node, "score")?;
  let mode = required_attr(node, "mode")?.to_string();
  let threshold = parse_float_list("threshold", required_attr(node, "threshold")?)?;

  let mut resources = HashMap::new();
  for resource in node.children().filter(|n| n.has_tag_name("resource")) {
    resources.insert(
      required_attr(&resource, "name")?.to_string(),
      required_attr(&resource, "uuid")?.to_string(),
    );
  }

  let mut regions = Vec::new();
  for region in node.children().filter(|n| n.has_tag_name("region")) {
    regions.push(Region {
      area: float_attr(&region, "area")?,
      center: parse_pair("center", required_attr(&region, "center")?)?,
      score: float_attr(&region, "score")?,
      points: required_attr(&region, "points")?.to_string(),
    });
  }

  Ok(RedResult {
    score,
    mode,
    threshold,
    resources,
    regions,
  })
}

fn parse_green(node: &Node) -> Result<GreenResult, ParseError> {
  let mut tags = HashMap::new();
  for tag in node.children().filter(|n| n.has_tag_name("tag")) {
    tags.insert(
      required_attr(&tag, "name")?.to_string(),
      float_attr(&tag, "score")?,
    );
  }
  Ok(GreenResult { tags })
}

fn parse_blue(node: &Node) -> Result<BlueResult, ParseError> {
  let mut features = Vec::new();
  for feat in node.children().filter(|n| n.has_tag_name("feat")) {
    features.push(Feature {
      id: required_attr(&feat, "id")?.to_string(),
      score: float_attr(&feat, "score")?,
      loc: parse_pair("loc", required_attr(&feat, "loc")?)?,
      size: float_attr(&feat, "size")?,
      angle: float_attr(&feat, "angle")?,
    });
  }

  let mut matches = Vec::new();
  for m in node.children().filter(|n| n.has_tag_name("match")) {
    let pose_node = m
      .children()
      .find(|n| n.has_tag_name("pose"))
      .ok_or(ParseError::MissingElement {
        parent: "match",
        missing: "pose",
      })?;

    matches.push(MatchResult {
      model_id: required_attr(&m, "model_id")?.to_string(),
      score: float_attr(&m, "score")?,
      node_coords: required_attr(&m, "node_coords")?.to_string(),
      string: required_attr(&m, "string")?.to_string(),
      pose: Pose::from_attr("matrix", required_attr(&pose_node, "matrix")?)?,
      feat: m
        .children()
        .filter(|n| n.has_tag_name("feat"))
        .map(|n| required_attr(&n, "idx").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?,
    });
  }

  Ok(BlueResult { features, matches })
}

fn required_attr<'a>(node: &Node<'a, '_>, attr: &'static str) -> Result<&'a str, ParseError> {
  node.attribute(attr).ok_or_else(|| ParseError::MissingAttribute {
    tag: node.tag_name().name().to_string(),
    attr,
  })
}

fn parse_float(attr: &'static str, value: &str) -> Result<f32, ParseError> {
  value
    .trim()
    .parse::<f32>()
    .map_err(|_| ParseError::InvalidNumber {
      attr,
      value: value.to_string(),
    })
}

fn float_attr(node: &Node, attr: &'static str) -> Result<f32, ParseError> {
  parse_float(attr, required_attr(node, attr)?)
}

/// 解析逗号分隔的浮点列表，允许 `[...]` 包裹；空列表返回空向量。
fn parse_float_list(attr: &'static str, value: &str) -> Result<Vec<f32>, ParseError> {
  let trimmed = value
    .trim()
    .trim_start_matches('[')
    .trim_end_matches(']')
    .trim();
  if trimmed.is_empty() {
    return Ok(Vec::new());
  }
  trimmed
    .split(',')
    .map(|part| parse_float(attr, part))
    .collect()
}

/// `x,y` 形式的坐标对。
fn parse_pair(attr: &'static str, value: &str) -> Result<[f32; 2], ParseError> {
  let values = parse_float_list(attr, value)?;
  if values.len() != 2 {
    return Err(ParseError::InvalidNumber {
      attr,
      value: value.to_string(),
    });
  }
  Ok([values[0], values[1]])
}

/// `WxH` 形式的视图尺寸。
fn parse_size(value: &str) -> Result<[f32; 2], ParseError> {
  let mut parts = value.split('x');
  let (Some(w), Some(h), None) = (parts.next(), parts.next(), parts.next()) else {
    return Err(ParseError::InvalidSize(value.to_string()));
  };
  Ok([parse_float("size", w)?, parse_float("size", h)?])
}
