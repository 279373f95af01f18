// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/ffi.rs - 本地库 ABI 定义与符号表
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

use std::ffi::{OsStr, c_char, c_int};
use std::ptr;

use libloading::{Library, Symbol};

/// 各平台默认的本地库文件名
#[cfg(windows)]
pub const DEFAULT_LIBRARY_NAME: &str = "vidi_20.dll";
#[cfg(not(windows))]
pub const DEFAULT_LIBRARY_NAME: &str = "libvidi.so";

/// 本地库持有的文本缓冲区。
///
/// `data` 指向的内存完全由本地库分配和释放（`vidi_init_buffer` /
/// `vidi_free_buffer`），本结构体只是调用方栈上的描述符。
/// 字段顺序属于 ABI 约定，不可调整。
#[repr(C)]
#[derive(Debug)]
pub struct VidiBuffer {
  pub size: c_int,
  pub data: *mut c_char,
}

impl VidiBuffer {
  pub const fn empty() -> Self {
    VidiBuffer {
      size: 0,
      data: ptr::null_mut(),
    }
  }
}

/// 本地库的图像结构。
///
/// 字段顺序与宽度属于 ABI 约定：
/// `{width, height, channels, data, channel_depth, step}`。
/// `channel_depth = 0` 表示 8 位通道，`step = 0` 表示由库计算默认行距。
#[repr(C)]
#[derive(Debug)]
pub struct VidiImage {
  pub width: u32,
  pub height: u32,
  pub channels: u32,
  pub data: *mut c_char,
  pub channel_depth: u32,
  pub step: u32,
}

impl VidiImage {
  pub const fn zeroed() -> Self {
    VidiImage {
      width: 0,
      height: 0,
      channels: 0,
      data: ptr::null_mut(),
      channel_depth: 0,
      step: 0,
    }
  }
}

pub type InitializeFn = unsafe extern "C" fn(c_int, *const c_char) -> c_int;
pub type DeinitializeFn = unsafe extern "C" fn() -> c_int;
pub type GetErrorMessageFn = unsafe extern "C" fn(c_int, *mut VidiBuffer) -> c_int;
pub type DebugInfosFn = unsafe extern "C" fn(c_int, *const c_char) -> c_int;
pub type VersionFn = unsafe extern "C" fn(*mut VidiBuffer) -> c_int;
pub type InitBufferFn = unsafe extern "C" fn(*mut VidiBuffer) -> c_int;
pub type FreeBufferFn = unsafe extern "C" fn(*mut VidiBuffer) -> c_int;
pub type ListComputeDevicesFn = unsafe extern "C" fn(*mut VidiBuffer) -> c_int;
pub type OpenWorkspaceFromFileFn = unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;
pub type CloseWorkspaceFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type ListWorkspacesFn = unsafe extern "C" fn(*mut VidiBuffer) -> c_int;
pub type ListStreamsFn = unsafe extern "C" fn(*const c_char, *mut VidiBuffer) -> c_int;
pub type ListToolsFn =
  unsafe extern "C" fn(*const c_char, *const c_char, *mut VidiBuffer) -> c_int;
pub type InitImageFn = unsafe extern "C" fn(*mut VidiImage) -> c_int;
pub type FreeImageFn = unsafe extern "C" fn(*mut VidiImage) -> c_int;
pub type LoadImageFn = unsafe extern "C" fn(*const c_char, *mut VidiImage) -> c_int;
pub type SaveImageFn = unsafe extern "C" fn(*const c_char, *mut VidiImage) -> c_int;
pub type ProcessFn = unsafe extern "C" fn(
  *mut VidiImage,
  *const c_char,
  *const c_char,
  *const c_char,
  *const c_char,
  *const c_char,
  *const c_char,
  *mut VidiBuffer,
) -> c_int;
pub type GetOverlayFn = unsafe extern "C" fn(
  *const c_char,
  *const c_char,
  *const c_char,
  *const c_char,
  c_int,
  *const c_char,
  *mut VidiImage,
) -> c_int;

/// 本地库的完整符号表。
///
/// 所有导出符号在加载时一次性解析并做类型绑定，缺失任何一个符号都会在
/// 构造阶段失败，而不是在首次调用时才暴露出来。
pub struct Api {
  _lib: Library,
  pub initialize: Symbol<'static, InitializeFn>,
  pub deinitialize: Symbol<'static, DeinitializeFn>,
  pub get_error_message: Symbol<'static, GetErrorMessageFn>,
  pub debug_infos: Symbol<'static, DebugInfosFn>,
  pub version: Symbol<'static, VersionFn>,
  pub init_buffer: Symbol<'static, InitBufferFn>,
  pub free_buffer: Symbol<'static, FreeBufferFn>,
  pub list_compute_devices: Symbol<'static, ListComputeDevicesFn>,
  pub open_workspace_from_file: Symbol<'static, OpenWorkspaceFromFileFn>,
  pub close_workspace: Symbol<'static, CloseWorkspaceFn>,
  pub list_workspaces: Symbol<'static, ListWorkspacesFn>,
  pub list_streams: Symbol<'static, ListStreamsFn>,
  pub list_tools: Symbol<'static, ListToolsFn>,
  pub init_image: Symbol<'static, InitImageFn>,
  pub free_image: Symbol<'static, FreeImageFn>,
  pub load_image: Symbol<'static, LoadImageFn>,
  pub save_image: Symbol<'static, SaveImageFn>,
  pub process: Symbol<'static, ProcessFn>,
  pub get_overlay: Symbol<'static, GetOverlayFn>,
}

/// 将符号的生命周期提升到 `'static`。
///
/// 安全性：返回值只能保存在与 `Library` 同生共死的结构体中（见 [`Api`]，
/// `_lib` 字段保证库在所有符号之后卸载）。
unsafe fn bind<T>(lib: &Library, name: &[u8]) -> Result<Symbol<'static, T>, libloading::Error> {
  let symbol: Symbol<T> = unsafe { lib.get(name)? };
  Ok(unsafe { std::mem::transmute::<Symbol<'_, T>, Symbol<'static, T>>(symbol) })
}

impl Api {
  /// 按平台默认名称加载本地库。
  pub fn load_default() -> Result<Self, libloading::Error> {
    Self::load(DEFAULT_LIBRARY_NAME)
  }

  /// 从指定路径加载本地库并解析全部符号。
  pub fn load<P: AsRef<OsStr>>(path: P) -> Result<Self, libloading::Error> {
    let lib = unsafe { Library::new(path.as_ref())? };

    unsafe {
      Ok(Api {
        initialize: bind(&lib, b"vidi_initialize")?,
        deinitialize: bind(&lib, b"vidi_deinitialize")?,
        get_error_message: bind(&lib, b"vidi_get_error_message")?,
        debug_infos: bind(&lib, b"vidi_debug_infos")?,
        version: bind(&lib, b"vidi_version")?,
        init_buffer: bind(&lib, b"vidi_init_buffer")?,
        free_buffer: bind(&lib, b"vidi_free_buffer")?,
        list_compute_devices: bind(&lib, b"vidi_list_compute_devices")?,
        open_workspace_from_file: bind(&lib, b"vidi_runtime_open_workspace_from_file")?,
        close_workspace: bind(&lib, b"vidi_runtime_close_workspace")?,
        list_workspaces: bind(&lib, b"vidi_runtime_list_workspaces")?,
        list_streams: bind(&lib, b"vidi_runtime_list_streams")?,
        list_tools: bind(&lib, b"vidi_runtime_list_tools")?,
        init_image: bind(&lib, b"vidi_init_image")?,
        free_image: bind(&lib, b"vidi_free_image")?,
        load_image: bind(&lib, b"vidi_load_image")?,
        save_image: bind(&lib, b"vidi_save_image")?,
        process: bind(&lib, b"vidi_runtime_process")?,
        get_overlay: bind(&lib, b"vidi_runtime_get_overlay")?,
        _lib: lib,
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn buffer_layout_matches_abi() {
    assert_eq!(
      std::mem::size_of::<VidiBuffer>(),
      std::mem::size_of::<c_int>().max(std::mem::size_of::<*mut c_char>())
        + std::mem::size_of::<*mut c_char>()
    );
    assert_eq!(std::mem::offset_of!(VidiBuffer, size), 0);
  }

  #[test]
  fn image_field_order_matches_abi() {
    // {width, height, channels, data, channel_depth, step}
    assert_eq!(std::mem::offset_of!(VidiImage, width), 0);
    assert_eq!(std::mem::offset_of!(VidiImage, height), 4);
    assert_eq!(std::mem::offset_of!(VidiImage, channels), 8);
    assert!(std::mem::offset_of!(VidiImage, data) >= 12);
    assert!(std::mem::offset_of!(VidiImage, channel_depth) > std::mem::offset_of!(VidiImage, data));
    assert!(std::mem::offset_of!(VidiImage, step) > std::mem::offset_of!(VidiImage, channel_depth));
  }

  #[test]
  fn zeroed_image_has_null_data() {
    let image = VidiImage::zeroed();
    assert!(image.data.is_null());
    assert_eq!(image.width, 0);
    assert_eq!(image.step, 0);
  }
}
