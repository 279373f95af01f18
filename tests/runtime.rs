// 该文件是 vidi-rs （ViDi 运行时 Rust 绑定） 项目的一部分。
// tests/runtime.rs - 需要真实本地库的端到端测试
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

//! 默认被忽略：只有装有 `libvidi.so` / `vidi_20.dll` 的机器才能跑，
//! 用 `cargo test -- --ignored` 执行。

use anyhow::Result;
use vidi::{GpuMode, Runtime};

fn runtime() -> Result<Runtime> {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
  Ok(Runtime::new()?)
}

#[test]
#[ignore = "需要真实的本地库"]
fn initialize_then_deinitialize_is_repeatable() -> Result<()> {
  let mut runtime = runtime()?;
  for _ in 0..3 {
    runtime.initialize(GpuMode::Cpu, "")?;
    assert!(runtime.is_initialized());
    runtime.deinitialize()?;
    assert!(!runtime.is_initialized());
  }
  Ok(())
}

#[test]
#[ignore = "需要真实的本地库"]
fn double_deinitialize_is_a_noop() -> Result<()> {
  let mut runtime = runtime()?;
  runtime.initialize(GpuMode::Cpu, "")?;
  runtime.deinitialize()?;
  // 第二次不应再进入本地卸载
  runtime.deinitialize()?;
  Ok(())
}

#[test]
#[ignore = "需要真实的本地库"]
fn version_returns_attributes() -> Result<()> {
  let runtime = runtime()?;
  let version = runtime.version()?;
  assert!(version.contains_key("version"));
  Ok(())
}

#[test]
#[ignore = "需要真实的本地库"]
fn compute_devices_can_be_listed_before_initialize() -> Result<()> {
  let runtime = runtime()?;
  let devices = runtime.list_compute_devices()?;
  // 至少应能在无 GPU 的机器上返回空列表而不是出错
  println!("计算设备: {:?}", devices);
  Ok(())
}
