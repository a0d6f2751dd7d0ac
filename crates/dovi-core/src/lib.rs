//! # dovi-core
//!
//! Dolby Vision RPU 位流基础设施, 提供比特读写, CRC 计算与统一错误类型.
//!
//! 上层的 `dovi-rpu` 在此基础上实现 RPU 语法的解析与写回.

pub mod bitreader;
pub mod bitwriter;
pub mod crc;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use crc::crc32_mpeg2;
pub use error::{DoviError, DoviResult};
