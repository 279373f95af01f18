// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/error.rs - 运行时错误类型
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

use thiserror::Error;

use crate::image::MarshalError;
use crate::sample::ParseError;

/// 运行时绑定层的统一错误类型。
///
/// 错误分四类：本地调用失败（`Native` / `ErrorLookup` / `BufferAlloc`）、
/// 调用前校验失败（`NotInitialized` / `MissingDebugFile` / `InvalidString`）、
/// 响应解析失败（`InvalidUtf8` / `Parse`），以及图像封送失败（`Marshal`）。
#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("native call failed (code {code}): {message}")]
  Native { code: i32, message: String },
  #[error("failed to get error message for code {0}")]
  ErrorLookup(i32),
  #[error("failed to allocate buffer (code {0})")]
  BufferAlloc(i32),
  #[error("the runtime is not initialized")]
  NotInitialized,
  #[error("you should provide a filename when using file as debug sink")]
  MissingDebugFile,
  #[error("failed to load the native library: {0}")]
  Load(libloading::Error),
  #[error("string argument contains an interior NUL byte: {0}")]
  InvalidString(std::ffi::NulError),
  #[error("native response is not valid UTF-8: {0}")]
  InvalidUtf8(std::string::FromUtf8Error),
  #[error("failed to parse native response: {0}")]
  Parse(ParseError),
  #[error("image marshaling failed: {0}")]
  Marshal(MarshalError),
}

impl From<libloading::Error> for RuntimeError {
  fn from(err: libloading::Error) -> Self {
    RuntimeError::Load(err)
  }
}

impl From<std::ffi::NulError> for RuntimeError {
  fn from(err: std::ffi::NulError) -> Self {
    RuntimeError::InvalidString(err)
  }
}

impl From<std::string::FromUtf8Error> for RuntimeError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    RuntimeError::InvalidUtf8(err)
  }
}

impl From<ParseError> for RuntimeError {
  fn from(err: ParseError) -> Self {
    RuntimeError::Parse(err)
  }
}

impl From<MarshalError> for RuntimeError {
  fn from(err: MarshalError) -> Self {
    RuntimeError::Marshal(err)
  }
}
