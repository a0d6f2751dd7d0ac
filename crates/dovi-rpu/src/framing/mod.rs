//! RPU 容器封装.
//!
//! - [`hevc`]: HEVC UNSPEC62 NAL 单元 (`7C 01` 头, 仿真防止字节, Annex B 分割)
//! - [`av1`]: AV1 ITU-T T.35 元数据 (EMDF 容器, metadata OBU)

pub mod av1;
pub mod hevc;
