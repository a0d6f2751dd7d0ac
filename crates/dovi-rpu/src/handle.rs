//! RPU 句柄与 RPU 列表.
//!
//! 句柄把解析树与最近一次错误放在一起: 操作失败时返回 `None`/`false`,
//! 错误信息可通过 [`RpuHandle::last_error`] 取回. 失败的操作不会修改已有的解析树.
//!
//! 列表从仅包含 UNSPEC62 NAL 的 Annex B 二进制文件逐个解析 RPU.

use std::fs;
use std::path::Path;

use dovi_core::{DoviError, DoviResult};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::convert::ConversionMode;
use crate::framing::hevc;
use crate::header::{ElType, RpuDataHeader};
use crate::mapping::RpuDataMapping;
use crate::rpu::DoviRpu;
use crate::vdr_dm::VdrDmData;

/// 默认的文件大小上限 (250 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 250_000_000;

// ============================================================
// RpuHandle
// ============================================================

/// 解析树 + 最近一次错误
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpuHandle {
    /// 解析成功时存在
    pub rpu: Option<DoviRpu>,
    /// 最近一次失败操作的错误信息, 成功操作不会清除
    pub error: Option<String>,
}

impl From<DoviResult<DoviRpu>> for RpuHandle {
    fn from(result: DoviResult<DoviRpu>) -> Self {
        match result {
            Ok(rpu) => Self {
                rpu: Some(rpu),
                error: None,
            },
            Err(e) => Self {
                rpu: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl RpuHandle {
    /// 解析以 0x19 开头的 RPU 负载
    pub fn parse(data: &[u8]) -> Self {
        DoviRpu::parse_rpu(data).into()
    }

    /// 解析 HEVC UNSPEC62 NAL
    pub fn parse_unspec62_nalu(data: &[u8]) -> Self {
        DoviRpu::parse_unspec62_nalu(data).into()
    }

    /// 解析 AV1 ITU-T T.35 负载
    pub fn parse_av1_t35_payload(data: &[u8]) -> Self {
        DoviRpu::parse_av1_t35_payload(data).into()
    }

    /// 解析完整的 AV1 metadata OBU
    pub fn parse_av1_t35_obu(data: &[u8]) -> Self {
        DoviRpu::parse_av1_t35_obu(data).into()
    }

    pub fn rpu(&self) -> Option<&DoviRpu> {
        self.rpu.as_ref()
    }

    pub fn header(&self) -> Option<&RpuDataHeader> {
        self.rpu().map(|r| &r.header)
    }

    pub fn mapping(&self) -> Option<&RpuDataMapping> {
        self.rpu()?.rpu_data_mapping.as_ref()
    }

    pub fn vdr_dm_data(&self) -> Option<&VdrDmData> {
        self.rpu()?.vdr_dm_data.as_ref()
    }

    pub fn el_type(&self) -> Option<ElType> {
        self.rpu()?.el_type()
    }

    /// 最近一次错误
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 是否持有解析树
    pub fn is_ok(&self) -> bool {
        self.rpu.is_some()
    }

    /// 在解析树上执行操作, 失败时记录错误
    fn apply<T>(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut DoviRpu) -> DoviResult<T>,
    ) -> Option<T> {
        let result = match self.rpu.as_mut() {
            Some(rpu) => f(rpu),
            None => Err(DoviError::InvalidArgument("句柄不含解析树".into())),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("{}: {}", op, e);
                self.error = Some(e.to_string());
                None
            }
        }
    }

    /// 写出 RPU 负载 (0x19 开头)
    pub fn write(&mut self) -> Option<Vec<u8>> {
        self.apply("write", |rpu| rpu.write_rpu())
    }

    /// 写出 UNSPEC62 NAL
    pub fn write_unspec62_nalu(&mut self) -> Option<Vec<u8>> {
        self.apply("write_unspec62_nalu", |rpu| rpu.write_unspec62_nalu())
    }

    /// 写出 AV1 T.35 负载
    pub fn write_av1_t35_payload(&mut self) -> Option<Vec<u8>> {
        self.apply("write_av1_t35_payload", |rpu| rpu.write_av1_t35_payload())
    }

    /// 写出完整的 AV1 metadata OBU
    pub fn write_av1_t35_obu(&mut self) -> Option<Vec<u8>> {
        self.apply("write_av1_t35_obu", |rpu| rpu.write_av1_t35_obu())
    }

    /// 按模式编号转换
    pub fn convert(&mut self, mode: u8) -> bool {
        self.apply("convert", |rpu| {
            let mode = ConversionMode::try_from(mode)?;
            rpu.convert_with_mode(mode)
        })
        .is_some()
    }

    pub fn set_active_area_offsets(&mut self, left: u16, right: u16, top: u16, bottom: u16) -> bool {
        self.apply("set_active_area_offsets", |rpu| {
            rpu.set_active_area_offsets(left, right, top, bottom)
        })
        .is_some()
    }

    pub fn remove_mapping(&mut self) -> bool {
        self.apply("remove_mapping", DoviRpu::remove_mapping)
            .is_some()
    }
}

// ============================================================
// RpuList
// ============================================================

/// 列表解析配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ListParseConfig {
    /// 文件大小上限 (字节)
    pub max_file_size: u64,
    /// 是否使用 rayon 并行解析各个 NAL
    pub parallel: bool,
}

impl Default for ListParseConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            parallel: true,
        }
    }
}

/// RPU 列表
///
/// 单个 RPU 的失败记录在各自的句柄上; 列表错误只用于文件读取与切分失败.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpuList {
    pub rpus: Vec<RpuHandle>,
    pub error: Option<String>,
}

impl RpuList {
    /// 用默认配置解析 RPU 二进制文件
    pub fn parse_file(path: impl AsRef<Path>) -> Self {
        Self::parse_file_with_config(path, &ListParseConfig::default())
    }

    pub fn parse_file_with_config(path: impl AsRef<Path>, config: &ListParseConfig) -> Self {
        match read_limited(path.as_ref(), config.max_file_size) {
            Ok(data) => Self::parse_annex_b(&data, config),
            Err(e) => Self::failed(e),
        }
    }

    /// 按 Annex B 起始码切分并逐个解析
    pub fn parse_annex_b(data: &[u8], config: &ListParseConfig) -> Self {
        let nalus = hevc::split_annex_b(data);
        if nalus.is_empty() {
            return Self::failed(DoviError::InvalidData(
                "RPU 列表: 未找到 Annex B 起始码".into(),
            ));
        }

        let rpus: Vec<RpuHandle> = if config.parallel {
            nalus
                .par_iter()
                .map(|nal| RpuHandle::parse_unspec62_nalu(nal))
                .collect()
        } else {
            nalus
                .iter()
                .map(|nal| RpuHandle::parse_unspec62_nalu(nal))
                .collect()
        };

        let failed = rpus.iter().filter(|h| !h.is_ok()).count();
        if failed > 0 {
            warn!("RPU 列表: {}/{} 个 RPU 解析失败", failed, rpus.len());
        }
        info!("RPU 列表: 解析 {} 个 RPU", rpus.len());

        Self { rpus, error: None }
    }

    fn failed(e: DoviError) -> Self {
        warn!("RPU 列表: {}", e);
        Self {
            rpus: Vec::new(),
            error: Some(e.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.rpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rpus.is_empty()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// 读取文件, 超过大小上限时报错
fn read_limited(path: &Path, max_size: u64) -> DoviResult<Vec<u8>> {
    let size = fs::metadata(path)?.len();
    if size > max_size {
        return Err(DoviError::InvalidArgument(format!(
            "文件 {} 大小 {} 超过上限 {}",
            path.display(),
            size,
            max_size,
        )));
    }
    Ok(fs::read(path)?)
}
