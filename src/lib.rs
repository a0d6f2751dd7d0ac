//! # dovi
//!
//! 纯 Rust 实现的 Dolby Vision RPU 元数据处理库.
//!
//! - **解析/写回**: HEVC UNSPEC62 NAL, AV1 ITU-T T.35 负载与 metadata OBU, 逐位无损
//! - **profile 转换**: 7 → MEL, 5/7/8 → 8.1, 5/7/8 → 8.4
//! - **修改**: Level 5 活动区域偏移, mapping 移除
//! - **列表解析**: 从 RPU 二进制文件并行解析
//!
//! # 快速开始
//!
//! ```rust
//! use dovi::rpu::{ConversionMode, DoviRpu};
//!
//! let nal = DoviRpu::profile81_default().write_unspec62_nalu().unwrap();
//! let mut rpu = DoviRpu::parse_unspec62_nalu(&nal).unwrap();
//!
//! rpu.set_active_area_offsets(0, 0, 276, 276).unwrap();
//! rpu.convert_with_mode(ConversionMode::To84).unwrap();
//! println!("profile {}", rpu.guessed_profile());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `dovi-core` | 比特读写, CRC32, 错误类型 |
//! | `dovi-rpu` | RPU 语法, 封装, 转换与列表解析 |
//! | `dovi-ffi` | C FFI 导出层 |

/// 位流基础设施
pub use dovi_core as core;

/// RPU 解析, 写回与转换
pub use dovi_rpu as rpu;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
