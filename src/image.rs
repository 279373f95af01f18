// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/image.rs - 图像封送（解码位图 <-> 本地图像结构）
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

use std::ffi::c_char;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use thiserror::Error;
use tracing::warn;

use crate::ffi::{Api, VidiImage};

#[derive(Error, Debug)]
pub enum MarshalError {
  #[error("unsupported image type")]
  UnsupportedFormat,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("image loading error: {0}")]
  ImageLoadError(image::ImageError),
  #[error("channel count mismatch: expected {expected}, found {found}")]
  ChannelMismatch { expected: u32, found: u32 },
  #[error("pixel buffer size mismatch")]
  SizeMismatch,
}

impl From<std::io::Error> for MarshalError {
  fn from(err: std::io::Error) -> Self {
    MarshalError::IoError(err)
  }
}

impl From<image::ImageError> for MarshalError {
  fn from(err: image::ImageError) -> Self {
    MarshalError::ImageLoadError(err)
  }
}

const GRAY_CHANNELS: u32 = 1;
const BGR_CHANNELS: u32 = 3;

/// 可作为本地图像参数传入的类型（调用方封送的帧或库持有的句柄）。
pub trait AsVidiImage {
  fn as_vidi(&mut self) -> *mut VidiImage;
}

/// 调用方持有的图像帧，已按本地结构布局封送。
///
/// 支持 8 位灰度与 8 位 RGB 两种输入；RGB 像素在封送时重排为 BGR。
/// `channel_depth` 与 `step` 保持库默认值 0（8 位通道 / 库计算行距）。
/// 像素内存由本结构体持有，与本地库的 `vidi_free_image` 无关。
pub struct ImageFrame {
  raw: VidiImage,
  data: Vec<u8>,
}

impl ImageFrame {
  fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
    let raw = VidiImage {
      width,
      height,
      channels,
      data: std::ptr::null_mut(),
      channel_depth: 0,
      step: 0,
    };
    ImageFrame { raw, data }
  }

  /// 从 8 位灰度图封送，字节原样复制。
  pub fn from_gray(image: &GrayImage) -> Self {
    ImageFrame::new(
      image.width(),
      image.height(),
      GRAY_CHANNELS,
      image.as_raw().clone(),
    )
  }

  /// 从 8 位 RGB 图封送，通道重排为 BGR。
  pub fn from_rgb(image: &RgbImage) -> Self {
    let mut data = Vec::with_capacity(image.as_raw().len());
    for pixel in image.as_raw().chunks_exact(BGR_CHANNELS as usize) {
      data.push(pixel[2]);
      data.push(pixel[1]);
      data.push(pixel[0]);
    }
    ImageFrame::new(image.width(), image.height(), BGR_CHANNELS, data)
  }

  /// 按解码后的像素格式分派，其他格式一律拒绝。
  pub fn from_dynamic(image: &DynamicImage) -> Result<Self, MarshalError> {
    match image {
      DynamicImage::ImageLuma8(gray) => Ok(ImageFrame::from_gray(gray)),
      DynamicImage::ImageRgb8(rgb) => Ok(ImageFrame::from_rgb(rgb)),
      _ => Err(MarshalError::UnsupportedFormat),
    }
  }

  /// 解码图像文件并封送。
  ///
  /// 与本地库的 `vidi_load_image` 不同，这里完全在调用方一侧解码。
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MarshalError> {
    let image = ImageReader::open(path)?.decode()?;
    ImageFrame::from_dynamic(&image)
  }

  pub fn width(&self) -> u32 {
    self.raw.width
  }

  pub fn height(&self) -> u32 {
    self.raw.height
  }

  pub fn channels(&self) -> u32 {
    self.raw.channels
  }

  pub fn channel_depth(&self) -> u32 {
    self.raw.channel_depth
  }

  pub fn step(&self) -> u32 {
    self.raw.step
  }

  /// 封送后的像素字节（灰度原序，彩色为 BGR）。
  pub fn bytes(&self) -> &[u8] {
    &self.data
  }

  /// 还原为灰度图。
  pub fn to_gray(&self) -> Result<GrayImage, MarshalError> {
    if self.raw.channels != GRAY_CHANNELS {
      return Err(MarshalError::ChannelMismatch {
        expected: GRAY_CHANNELS,
        found: self.raw.channels,
      });
    }
    GrayImage::from_raw(self.raw.width, self.raw.height, self.data.clone())
      .ok_or(MarshalError::SizeMismatch)
  }

  /// 还原为 RGB 图，通道从 BGR 换回 RGB。
  pub fn to_rgb(&self) -> Result<RgbImage, MarshalError> {
    if self.raw.channels != BGR_CHANNELS {
      return Err(MarshalError::ChannelMismatch {
        expected: BGR_CHANNELS,
        found: self.raw.channels,
      });
    }
    let mut data = Vec::with_capacity(self.data.len());
    for pixel in self.data.chunks_exact(BGR_CHANNELS as usize) {
      data.push(pixel[2]);
      data.push(pixel[1]);
      data.push(pixel[0]);
    }
    RgbImage::from_raw(self.raw.width, self.raw.height, data).ok_or(MarshalError::SizeMismatch)
  }
}

impl AsVidiImage for ImageFrame {
  fn as_vidi(&mut self) -> *mut VidiImage {
    // 指针在每次取用时刷新，结构体移动后依然有效
    self.raw.data = self.data.as_mut_ptr() as *mut c_char;
    &mut self.raw
  }
}

/// 本地库持有的图像句柄（`vidi_load_image` / `vidi_runtime_get_overlay` 返回）。
///
/// 像素内存由本地库分配，析构时通过 `vidi_free_image` 释放且只释放一次。
pub struct NativeImage<'a> {
  api: &'a Api,
  raw: VidiImage,
}

impl<'a> NativeImage<'a> {
  pub(crate) fn new(api: &'a Api, raw: VidiImage) -> Self {
    NativeImage { api, raw }
  }

  pub fn width(&self) -> u32 {
    self.raw.width
  }

  pub fn height(&self) -> u32 {
    self.raw.height
  }

  pub fn channels(&self) -> u32 {
    self.raw.channels
  }

  pub fn channel_depth(&self) -> u32 {
    self.raw.channel_depth
  }

  /// 行距（字节）。`step = 0` 表示紧凑排列。
  pub fn stride(&self) -> u32 {
    if self.raw.step == 0 {
      self.raw.width * self.raw.channels
    } else {
      self.raw.step
    }
  }

  /// 本地内存中的像素字节视图（8 位通道）。
  pub fn bytes(&self) -> &[u8] {
    if self.raw.data.is_null() {
      return &[];
    }
    let len = self.stride() as usize * self.raw.height as usize;
    unsafe { std::slice::from_raw_parts(self.raw.data as *const u8, len) }
  }

  /// 每行去掉行距填充后的有效字节。
  fn rows(&self) -> impl Iterator<Item = &[u8]> {
    // stride 为 0 时 bytes() 必为空，max(1) 只是避免 chunks_exact(0)
    let stride = (self.stride() as usize).max(1);
    let row_len = (self.raw.width * self.raw.channels) as usize;
    self
      .bytes()
      .chunks_exact(stride)
      .map(move |row| &row[..row_len])
  }

  /// 复制为灰度图。
  pub fn to_gray(&self) -> Result<GrayImage, MarshalError> {
    if self.raw.channels != GRAY_CHANNELS {
      return Err(MarshalError::ChannelMismatch {
        expected: GRAY_CHANNELS,
        found: self.raw.channels,
      });
    }
    let mut data = Vec::with_capacity((self.raw.width * self.raw.height) as usize);
    for row in self.rows() {
      data.extend_from_slice(row);
    }
    GrayImage::from_raw(self.raw.width, self.raw.height, data).ok_or(MarshalError::SizeMismatch)
  }

  /// 复制为 RGB 图，通道从 BGR 换回 RGB。
  pub fn to_rgb(&self) -> Result<RgbImage, MarshalError> {
    if self.raw.channels != BGR_CHANNELS {
      return Err(MarshalError::ChannelMismatch {
        expected: BGR_CHANNELS,
        found: self.raw.channels,
      });
    }
    let mut data =
      Vec::with_capacity((self.raw.width * self.raw.height * BGR_CHANNELS) as usize);
    for row in self.rows() {
      for pixel in row.chunks_exact(BGR_CHANNELS as usize) {
        data.push(pixel[2]);
        data.push(pixel[1]);
        data.push(pixel[0]);
      }
    }
    RgbImage::from_raw(self.raw.width, self.raw.height, data).ok_or(MarshalError::SizeMismatch)
  }
}

impl AsVidiImage for NativeImage<'_> {
  fn as_vidi(&mut self) -> *mut VidiImage {
    &mut self.raw
  }
}

impl Drop for NativeImage<'_> {
  fn drop(&mut self) {
    let code = unsafe { (self.api.free_image)(&mut self.raw) };
    if code != 0 {
      warn!("释放本地图像失败: 错误码 {}", code);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gray_round_trip_preserves_bytes() {
    let source = GrayImage::from_raw(2, 2, vec![10, 20, 30, 40]).unwrap();
    let frame = ImageFrame::from_gray(&source);

    assert_eq!(frame.width(), 2);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.channels(), 1);
    assert_eq!(frame.bytes(), &[10, 20, 30, 40]);
    assert_eq!(frame.to_gray().unwrap(), source);
  }

  #[test]
  fn rgb_is_reordered_to_bgr() {
    let source = RgbImage::from_raw(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let frame = ImageFrame::from_rgb(&source);

    assert_eq!(frame.channels(), 3);
    assert_eq!(frame.bytes(), &[3, 2, 1, 6, 5, 4]);
    // 往返换回 RGB
    assert_eq!(frame.to_rgb().unwrap(), source);
  }

  #[test]
  fn depth_and_step_keep_library_defaults() {
    let source = GrayImage::from_raw(1, 1, vec![0]).unwrap();
    let frame = ImageFrame::from_gray(&source);
    assert_eq!(frame.channel_depth(), 0);
    assert_eq!(frame.step(), 0);
  }

  #[test]
  fn unsupported_format_is_rejected() {
    let rgba = DynamicImage::new_rgba8(2, 2);
    assert!(matches!(
      ImageFrame::from_dynamic(&rgba),
      Err(MarshalError::UnsupportedFormat)
    ));
  }

  #[test]
  fn channel_mismatch_is_reported() {
    let source = RgbImage::from_raw(1, 1, vec![9, 9, 9]).unwrap();
    let frame = ImageFrame::from_rgb(&source);
    assert!(matches!(
      frame.to_gray(),
      Err(MarshalError::ChannelMismatch {
        expected: 1,
        found: 3
      })
    ));
  }
}
