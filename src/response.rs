// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/response.rs - 简单 XML 响应的属性提取
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

use roxmltree::Document;

use crate::sample::ParseError;

/// 根元素的属性包（`vidi_version` 的响应形态）。
pub fn root_attributes(xml: &str) -> Result<HashMap<String, String>, ParseError> {
  let doc = Document::parse(xml)?;
  Ok(
    doc
      .root_element()
      .attributes()
      .map(|a| (a.name().to_string(), a.value().to_string()))
      .collect(),
  )
}

/// 根元素下指定标签的 `id` 属性列表，保持文档顺序。
///
/// 设备、工作区、流三种列表共用这一形态：
/// `<devices><device id="0"/><device id="1"/></devices>`。
pub fn id_list(xml: &str, tag: &'static str) -> Result<Vec<String>, ParseError> {
  let doc = Document::parse(xml)?;
  doc
    .root_element()
    .children()
    .filter(|n| n.has_tag_name(tag))
    .map(|n| {
      n.attribute("id")
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingAttribute {
          tag: tag.to_string(),
          attr: "id",
        })
    })
    .collect()
}

/// 把递归的 `<tool id= type=>` 树展平为 id -> type 映射。
///
/// 先序深度优先遍历：同名 id 冲突时后访问者（即后代）覆盖先访问者。
pub fn flatten_tools(xml: &str) -> Result<HashMap<String, String>, ParseError> {
  let doc = Document::parse(xml)?;
  let mut tools = HashMap::new();

  for node in doc.descendants().filter(|n| n.has_tag_name("tool")) {
    let id = node
      .attribute("id")
      .ok_or_else(|| ParseError::MissingAttribute {
        tag: "tool".to_string(),
        attr: "id",
      })?;
    let tool_type = node
      .attribute("type")
      .ok_or_else(|| ParseError::MissingAttribute {
        tag: "tool".to_string(),
        attr: "type",
      })?;
    tools.insert(id.to_string(), tool_type.to_string());
  }

  Ok(tools)
}

/// 错误消息元素的文本内容。
pub fn message_text(xml: &str) -> Result<String, ParseError> {
  let doc = Document::parse(xml)?;
  Ok(
    doc
      .root_element()
      .text()
      .unwrap_or_default()
      .to_string(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn version_attributes_become_a_map() {
    let attrs = root_attributes(r#"<image version="2.0.0" build="123"/>"#).unwrap();
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs["version"], "2.0.0");
    assert_eq!(attrs["build"], "123");
  }

  #[test]
  fn device_list_keeps_document_order() {
    let xml = r#"<devices><device id="0"/><device id="1"/></devices>"#;
    assert_eq!(id_list(xml, "device").unwrap(), vec!["0", "1"]);
  }

  #[test]
  fn foreign_children_are_ignored() {
    let xml = r#"<workspaces><workspace id="a"/><note/><workspace id="b"/></workspaces>"#;
    assert_eq!(id_list(xml, "workspace").unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn missing_id_is_an_error() {
    let xml = r#"<streams><stream/></streams>"#;
    assert!(matches!(
      id_list(xml, "stream"),
      Err(ParseError::MissingAttribute { attr: "id", .. })
    ));
  }

  #[test]
  fn tool_tree_is_flattened() {
    let xml = r#"
      <tools>
        <tool id="a" type="red">
          <tool id="b" type="green">
            <tool id="c" type="blue"/>
          </tool>
        </tool>
        <tool id="d" type="red"/>
      </tools>"#;

    let tools = flatten_tools(xml).unwrap();
    assert_eq!(tools.len(), 4);
    assert_eq!(tools["a"], "red");
    assert_eq!(tools["b"], "green");
    assert_eq!(tools["c"], "blue");
    assert_eq!(tools["d"], "red");
  }

  #[test]
  fn descendant_overwrites_parent_on_id_collision() {
    let xml = r#"
      <tools>
        <tool id="a" type="red">
          <tool id="a" type="blue"/>
        </tool>
      </tools>"#;

    let tools = flatten_tools(xml).unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools["a"], "blue");
  }

  #[test]
  fn error_message_text_is_extracted() {
    let xml = r#"<error>workspace not found</error>"#;
    assert_eq!(message_text(xml).unwrap(), "workspace not found");
  }

  #[test]
  fn empty_message_yields_empty_string() {
    assert_eq!(message_text("<error/>").unwrap(), "");
  }
}
