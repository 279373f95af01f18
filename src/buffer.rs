// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/buffer.rs - 本地文本缓冲区的作用域守卫
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

use std::ffi::CStr;

use tracing::warn;

use crate::error::RuntimeError;
use crate::ffi::{Api, VidiBuffer};

/// 本地库文本缓冲区的作用域守卫。
///
/// 构造时调用 `vidi_init_buffer` 申请缓冲区，析构时调用 `vidi_free_buffer`
/// 释放，任何退出路径（包括解析出错提前返回）都不会泄漏。读取必须通过
/// [`TextBuffer::text`]，它在释放之前把字节复制到 Rust 管理的内存中，
/// 释放后的本地内存不会再被访问。
pub struct TextBuffer<'a> {
  api: &'a Api,
  raw: VidiBuffer,
}

impl<'a> TextBuffer<'a> {
  /// 向本地库申请一个文本缓冲区。
  pub fn acquire(api: &'a Api) -> Result<Self, RuntimeError> {
    let mut raw = VidiBuffer::empty();
    let code = unsafe { (api.init_buffer)(&mut raw) };
    if code != 0 {
      return Err(RuntimeError::BufferAlloc(code));
    }
    Ok(TextBuffer { api, raw })
  }

  /// 传给本地调用的出参指针。
  pub fn as_mut_ptr(&mut self) -> *mut VidiBuffer {
    &mut self.raw
  }

  /// 把缓冲区内容复制为 UTF-8 字符串。
  ///
  /// 本地库写入的是以 NUL 结尾的 UTF-8 字节序列；空指针视为空串。
  pub fn text(&self) -> Result<String, RuntimeError> {
    if self.raw.data.is_null() {
      return Ok(String::new());
    }
    let bytes = unsafe { CStr::from_ptr(self.raw.data) }.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
  }
}

impl Drop for TextBuffer<'_> {
  fn drop(&mut self) {
    let code = unsafe { (self.api.free_buffer)(&mut self.raw) };
    if code != 0 {
      warn!("释放本地缓冲区失败: 错误码 {}", code);
    }
  }
}
