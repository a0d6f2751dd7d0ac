//! # dovi-rpu
//!
//! Dolby Vision RPU 解析, 写回与 profile 转换.
//!
//! 解析树由头部 ([`RpuDataHeader`]), reshaping mapping ([`RpuDataMapping`],
//! 可含 [`RpuDataNlq`]) 与显示管理数据 ([`VdrDmData`], 含扩展块) 组成,
//! 写回时逐位还原, 包括保留位与未知的尾随数据.
//!
//! ## 使用示例
//!
//! ```rust
//! use dovi_rpu::{ConversionMode, DoviRpu};
//!
//! let rpu = DoviRpu::profile81_default();
//! let nal = rpu.write_unspec62_nalu().unwrap();
//!
//! let mut parsed = DoviRpu::parse_unspec62_nalu(&nal).unwrap();
//! assert_eq!(parsed.guessed_profile(), 8);
//!
//! parsed.convert_with_mode(ConversionMode::ToMel).unwrap();
//! assert_eq!(parsed.guessed_profile(), 7);
//! ```

pub mod convert;
pub mod extension;
pub mod framing;
pub mod handle;
pub mod header;
pub mod mapping;
pub mod mutate;
pub mod nlq;
pub mod preset;
pub mod rpu;
pub mod vdr_dm;

/// Y, Cb, Cr 三个分量
pub const NUM_COMPONENTS: usize = 3;

// 重导出常用类型
pub use convert::{ConversionMode, convert_rpu};
pub use dovi_core::{DoviError, DoviResult};
pub use extension::{CmVersion, ExtBlockRecord, ExtBlockSection, ExtMetadataBlock};
pub use handle::{ListParseConfig, RpuHandle, RpuList};
pub use header::{ElType, ProfileSignals, RpuDataHeader, guess_profile};
pub use mapping::{CurvePayload, MmrPiece, PolynomialPiece, ReshapingCurve, RpuDataMapping};
pub use nlq::RpuDataNlq;
pub use rpu::DoviRpu;
pub use vdr_dm::VdrDmData;
