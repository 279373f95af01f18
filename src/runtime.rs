// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// src/runtime.rs - 外部调用门面（Runtime）
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
use std::ffi::{CString, OsStr, c_int};
use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::buffer::TextBuffer;
use crate::error::RuntimeError;
use crate::ffi::{Api, VidiBuffer, VidiImage};
use crate::image::{AsVidiImage, NativeImage};
use crate::response;
use crate::sample::Sample;

/// GPU 使用模式，取值与本地库的 ABI 约定一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuMode {
  Cpu,
  #[default]
  Single,
  Multiple,
}

impl GpuMode {
  pub fn value(self) -> c_int {
    match self {
      GpuMode::Cpu => -1,
      GpuMode::Single => 0,
      GpuMode::Multiple => 1,
    }
  }
}

/// 调试信息的输出目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSink {
  #[default]
  Console,
  File,
  Stop,
}

impl DebugSink {
  pub fn value(self) -> c_int {
    match self {
      DebugSink::Console => 0,
      DebugSink::File => 1,
      DebugSink::Stop => 2,
    }
  }
}

/// `process` 的可选参数，默认值与本地库的约定一致。
#[derive(Debug, Clone)]
pub struct ProcessOptions {
  /// 空串表示按 `parameters` 选择工具
  pub tool: String,
  pub sample: String,
  pub parameters: String,
  pub gpu_list: String,
}

impl Default for ProcessOptions {
  fn default() -> Self {
    ProcessOptions {
      tool: String::new(),
      sample: "0".to_string(),
      parameters: "all_tools".to_string(),
      gpu_list: String::new(),
    }
  }
}

impl ProcessOptions {
  pub fn with_tool(mut self, tool: &str) -> Self {
    self.tool = tool.to_string();
    self
  }

  pub fn with_sample(mut self, sample: &str) -> Self {
    self.sample = sample.to_string();
    self
  }

  pub fn with_parameters(mut self, parameters: &str) -> Self {
    self.parameters = parameters.to_string();
    self
  }

  pub fn with_gpu_list(mut self, gpu_list: &str) -> Self {
    self.gpu_list = gpu_list.to_string();
    self
  }
}

/// 本地推理运行时的门面。
///
/// 一个实例对应一个已加载的本地库句柄，全部领域操作都是实例方法。
/// 调用模型为单线程同步阻塞：本类型不做内部加锁，也不实现
/// `Send` / `Sync`，跨线程共享需由调用方自行串行化到单个实例。
///
/// `initialize` 必须先于工作区/图像/推理操作调用；`deinitialize`
/// 在每次成功初始化后恰好执行一次本地卸载，包括实例析构时。
pub struct Runtime {
  api: Api,
  initialized: bool,
  _not_sync: PhantomData<*const ()>,
}

impl Runtime {
  /// 按平台默认库名（`libvidi.so` / `vidi_20.dll`）加载。
  pub fn new() -> Result<Self, RuntimeError> {
    info!("按默认名称加载本地库");
    Ok(Runtime::from_api(Api::load_default()?))
  }

  /// 从指定路径加载本地库。
  pub fn with_path<P: AsRef<OsStr>>(path: P) -> Result<Self, RuntimeError> {
    info!("加载本地库: {:?}", path.as_ref());
    Ok(Runtime::from_api(Api::load(path)?))
  }

  fn from_api(api: Api) -> Self {
    Runtime {
      api,
      initialized: false,
      _not_sync: PhantomData,
    }
  }

  /// 初始化本地运行时。必须先于其他领域操作调用。
  pub fn initialize(&mut self, gpu_mode: GpuMode, cuda_devices: &str) -> Result<(), RuntimeError> {
    let devices = c_string(cuda_devices)?;
    info!(
      "初始化运行时: gpu_mode={:?}, cuda_devices={:?}",
      gpu_mode, cuda_devices
    );
    let code = unsafe { (self.api.initialize)(gpu_mode.value(), devices.as_ptr()) };
    if code != 0 {
      return Err(RuntimeError::Native {
        code,
        message: "failed to initialize the library".to_string(),
      });
    }
    self.initialized = true;
    Ok(())
  }

  /// 卸载本地运行时。未初始化时为空操作，重复调用安全。
  pub fn deinitialize(&mut self) -> Result<(), RuntimeError> {
    if !self.initialized {
      return Ok(());
    }
    info!("卸载运行时");
    let code = unsafe { (self.api.deinitialize)() };
    if code != 0 {
      return Err(self.native_error(code));
    }
    self.initialized = false;
    Ok(())
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// 从文件打开工作区。
  pub fn open_workspace_from_file(&self, name: &str, path: &str) -> Result<(), RuntimeError> {
    self.ensure_init()?;
    let c_name = c_string(name)?;
    let c_path = c_string(path)?;
    info!("打开工作区 {} ({})", name, path);
    let code = unsafe { (self.api.open_workspace_from_file)(c_name.as_ptr(), c_path.as_ptr()) };
    self.check(code)
  }

  /// 关闭工作区。
  pub fn close_workspace(&self, name: &str) -> Result<(), RuntimeError> {
    self.ensure_init()?;
    let c_name = c_string(name)?;
    info!("关闭工作区 {}", name);
    let code = unsafe { (self.api.close_workspace)(c_name.as_ptr()) };
    self.check(code)
  }

  /// 枚举可用计算设备。初始化之前也可调用，以便选择 `cuda_devices`。
  pub fn list_compute_devices(&self) -> Result<Vec<String>, RuntimeError> {
    let xml = self.call_text(|api, buffer| unsafe { (api.list_compute_devices)(buffer) })?;
    Ok(response::id_list(&xml, "device")?)
  }

  /// 枚举已打开的工作区。
  pub fn list_workspaces(&self) -> Result<Vec<String>, RuntimeError> {
    self.ensure_init()?;
    let xml = self.call_text(|api, buffer| unsafe { (api.list_workspaces)(buffer) })?;
    Ok(response::id_list(&xml, "workspace")?)
  }

  /// 枚举工作区内的流。
  pub fn list_streams(&self, workspace: &str) -> Result<Vec<String>, RuntimeError> {
    self.ensure_init()?;
    let c_workspace = c_string(workspace)?;
    let xml =
      self.call_text(|api, buffer| unsafe { (api.list_streams)(c_workspace.as_ptr(), buffer) })?;
    Ok(response::id_list(&xml, "stream")?)
  }

  /// 枚举流内的工具，递归树展平为 id -> type 映射。
  pub fn list_tools(
    &self,
    workspace: &str,
    stream: &str,
  ) -> Result<HashMap<String, String>, RuntimeError> {
    self.ensure_init()?;
    let c_workspace = c_string(workspace)?;
    let c_stream = c_string(stream)?;
    let xml = self.call_text(|api, buffer| unsafe {
      (api.list_tools)(c_workspace.as_ptr(), c_stream.as_ptr(), buffer)
    })?;
    Ok(response::flatten_tools(&xml)?)
  }

  /// 查询本地错误码对应的可读消息。
  pub fn get_error(&self, code: i32) -> Result<String, RuntimeError> {
    let mut buffer = TextBuffer::acquire(&self.api)?;
    let result = unsafe { (self.api.get_error_message)(code, buffer.as_mut_ptr()) };
    if result != 0 {
      return Err(RuntimeError::ErrorLookup(code));
    }
    let xml = buffer.text()?;
    Ok(response::message_text(&xml)?)
  }

  /// 配置调试信息输出。
  ///
  /// `sink` 为 [`DebugSink::File`] 时必须给出文件路径，校验在进入
  /// 本地库之前完成。
  pub fn debug_infos(&self, sink: DebugSink, file_path: &str) -> Result<(), RuntimeError> {
    check_debug_sink(sink, file_path)?;
    let c_path = c_string(file_path)?;
    debug!("配置调试输出: {:?} {:?}", sink, file_path);
    let code = unsafe { (self.api.debug_infos)(sink.value(), c_path.as_ptr()) };
    self.check(code)
  }

  /// 停止调试信息输出。
  pub fn stop_debug_infos(&self) -> Result<(), RuntimeError> {
    self.debug_infos(DebugSink::Stop, "")
  }

  /// 本地库版本信息（根元素属性包）。
  pub fn version(&self) -> Result<HashMap<String, String>, RuntimeError> {
    let xml = self.call_text(|api, buffer| unsafe { (api.version)(buffer) })?;
    Ok(response::root_attributes(&xml)?)
  }

  /// 由本地库解码图像文件，返回库持有的图像句柄。
  pub fn load_image(&self, path: &str) -> Result<NativeImage<'_>, RuntimeError> {
    self.ensure_init()?;
    let mut image = self.init_image()?;
    let c_path = c_string(path)?;
    debug!("加载图像: {}", path);
    let code = unsafe { (self.api.load_image)(c_path.as_ptr(), image.as_vidi()) };
    self.check(code)?;
    Ok(image)
  }

  /// 由本地库编码并写出图像文件。
  pub fn save_image(&self, path: &str, image: &mut impl AsVidiImage) -> Result<(), RuntimeError> {
    self.ensure_init()?;
    let c_path = c_string(path)?;
    debug!("保存图像: {}", path);
    let code = unsafe { (self.api.save_image)(c_path.as_ptr(), image.as_vidi()) };
    self.check(code)
  }

  /// 对一张图像执行推理，返回解析后的标记结果。
  pub fn process(
    &self,
    image: &mut impl AsVidiImage,
    workspace: &str,
    stream: &str,
    options: &ProcessOptions,
  ) -> Result<Sample, RuntimeError> {
    self.ensure_init()?;
    let c_workspace = c_string(workspace)?;
    let c_stream = c_string(stream)?;
    let c_tool = c_string(&options.tool)?;
    let c_sample = c_string(&options.sample)?;
    let c_parameters = c_string(&options.parameters)?;
    let c_gpu_list = c_string(&options.gpu_list)?;
    let image_ptr = image.as_vidi();

    info!("执行推理: workspace={}, stream={}", workspace, stream);
    let xml = self.call_text(|api, buffer| unsafe {
      (api.process)(
        image_ptr,
        c_workspace.as_ptr(),
        c_stream.as_ptr(),
        c_tool.as_ptr(),
        c_sample.as_ptr(),
        c_parameters.as_ptr(),
        c_gpu_list.as_ptr(),
        buffer,
      )
    })?;
    Ok(Sample::parse(&xml)?)
  }

  /// 渲染指定视图的叠加图。`view_index = -1` 表示全部视图。
  pub fn get_overlay(
    &self,
    workspace: &str,
    stream: &str,
    tool: &str,
    sample: &str,
    view_index: i32,
    options: &str,
  ) -> Result<NativeImage<'_>, RuntimeError> {
    self.ensure_init()?;
    let mut image = self.init_image()?;
    let c_workspace = c_string(workspace)?;
    let c_stream = c_string(stream)?;
    let c_tool = c_string(tool)?;
    let c_sample = c_string(sample)?;
    let c_options = c_string(options)?;

    debug!(
      "获取叠加图: workspace={}, stream={}, tool={}, view={}",
      workspace, stream, tool, view_index
    );
    let code = unsafe {
      (self.api.get_overlay)(
        c_workspace.as_ptr(),
        c_stream.as_ptr(),
        c_tool.as_ptr(),
        c_sample.as_ptr(),
        view_index,
        c_options.as_ptr(),
        image.as_vidi(),
      )
    };
    self.check(code)?;
    Ok(image)
  }

  fn init_image(&self) -> Result<NativeImage<'_>, RuntimeError> {
    let mut raw = VidiImage::zeroed();
    let code = unsafe { (self.api.init_image)(&mut raw) };
    if code != 0 {
      return Err(self.native_error(code));
    }
    Ok(NativeImage::new(&self.api, raw))
  }

  /// 申请缓冲区、执行本地调用、复制出文本、释放缓冲区。
  ///
  /// 复制严格先于释放；解析阶段出错时缓冲区同样由守卫释放。
  fn call_text<F>(&self, call: F) -> Result<String, RuntimeError>
  where
    F: FnOnce(&Api, *mut VidiBuffer) -> c_int,
  {
    let mut buffer = TextBuffer::acquire(&self.api)?;
    let code = call(&self.api, buffer.as_mut_ptr());
    if code != 0 {
      return Err(self.native_error(code));
    }
    buffer.text()
  }

  fn ensure_init(&self) -> Result<(), RuntimeError> {
    if self.initialized {
      Ok(())
    } else {
      Err(RuntimeError::NotInitialized)
    }
  }

  fn check(&self, code: c_int) -> Result<(), RuntimeError> {
    if code == 0 {
      Ok(())
    } else {
      Err(self.native_error(code))
    }
  }

  /// 把非零结果码翻译为带可读消息的错误。
  ///
  /// 消息查询本身失败时退化为 `ErrorLookup`，不会递归。
  fn native_error(&self, code: c_int) -> RuntimeError {
    match self.get_error(code) {
      Ok(message) => RuntimeError::Native { code, message },
      Err(_) => RuntimeError::ErrorLookup(code),
    }
  }
}

impl Drop for Runtime {
  fn drop(&mut self) {
    if self.initialized {
      let code = unsafe { (self.api.deinitialize)() };
      if code != 0 {
        warn!("析构时卸载运行时失败: 错误码 {}", code);
      }
      self.initialized = false;
    }
  }
}

fn c_string(value: &str) -> Result<CString, RuntimeError> {
  Ok(CString::new(value)?)
}

fn check_debug_sink(sink: DebugSink, file_path: &str) -> Result<(), RuntimeError> {
  if sink == DebugSink::File && file_path.is_empty() {
    return Err(RuntimeError::MissingDebugFile);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gpu_mode_abi_values() {
    assert_eq!(GpuMode::Cpu.value(), -1);
    assert_eq!(GpuMode::Single.value(), 0);
    assert_eq!(GpuMode::Multiple.value(), 1);
    assert_eq!(GpuMode::default(), GpuMode::Single);
  }

  #[test]
  fn debug_sink_abi_values() {
    assert_eq!(DebugSink::Console.value(), 0);
    assert_eq!(DebugSink::File.value(), 1);
    assert_eq!(DebugSink::Stop.value(), 2);
  }

  #[test]
  fn file_sink_without_path_is_rejected_before_any_native_call() {
    assert!(matches!(
      check_debug_sink(DebugSink::File, ""),
      Err(RuntimeError::MissingDebugFile)
    ));
    assert!(check_debug_sink(DebugSink::File, "/tmp/vidi.log").is_ok());
    assert!(check_debug_sink(DebugSink::Console, "").is_ok());
    assert!(check_debug_sink(DebugSink::Stop, "").is_ok());
  }

  #[test]
  fn process_options_defaults_match_library_convention() {
    let options = ProcessOptions::default();
    assert_eq!(options.tool, "");
    assert_eq!(options.sample, "0");
    assert_eq!(options.parameters, "all_tools");
    assert_eq!(options.gpu_list, "");
  }

  #[test]
  fn process_options_builder() {
    let options = ProcessOptions::default()
      .with_tool("analyze")
      .with_sample("7")
      .with_gpu_list("0,1");
    assert_eq!(options.tool, "analyze");
    assert_eq!(options.sample, "7");
    assert_eq!(options.parameters, "all_tools");
    assert_eq!(options.gpu_list, "0,1");
  }
}
