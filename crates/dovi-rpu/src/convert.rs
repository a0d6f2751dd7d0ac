//! Profile 转换.
//!
//! 按转换模式改写头部标志, reshaping 曲线, NLQ 与 DM 数据.
//! 源 profile 由 [`RpuDataHeader::guessed_profile`](crate::header::RpuDataHeader::guessed_profile) 推测.

use std::fmt;

use dovi_core::{DoviError, DoviResult};
use log::debug;

use crate::extension::ExtMetadataBlock;
use crate::nlq::RpuDataNlq;
use crate::rpu::DoviRpu;

/// 转换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConversionMode {
    /// 仅校验, 不修改
    #[default]
    Lossless = 0,
    /// 转为 MEL 兼容 (profile 7 MEL)
    ToMel = 1,
    /// 转为 profile 8.1, 曲线替换为恒等映射
    To81 = 2,
    /// 转为静态 profile 8.4, 仅保留静态 DM 块
    To84 = 3,
    /// 转为 profile 8.1, 保留原有曲线
    To81MappingPreserved = 4,
}

impl ConversionMode {
    /// 该模式接受的源 profile
    pub fn source_profiles(self) -> &'static [u8] {
        match self {
            Self::Lossless => &[0, 4, 5, 7, 8],
            Self::ToMel | Self::To81MappingPreserved => &[7, 8],
            Self::To81 | Self::To84 => &[5, 7, 8],
        }
    }

    /// 源 profile 是否可用该模式转换
    pub fn supports(self, profile: u8) -> bool {
        self.source_profiles().contains(&profile)
    }
}

impl TryFrom<u8> for ConversionMode {
    type Error = DoviError;

    fn try_from(mode: u8) -> DoviResult<Self> {
        match mode {
            0 => Ok(Self::Lossless),
            1 => Ok(Self::ToMel),
            2 => Ok(Self::To81),
            3 => Ok(Self::To84),
            4 => Ok(Self::To81MappingPreserved),
            _ => Err(DoviError::InvalidArgument(format!(
                "转换模式 {mode} 超出范围 [0, 4]"
            ))),
        }
    }
}

impl From<ConversionMode> for u8 {
    fn from(mode: ConversionMode) -> Self {
        mode as u8
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lossless => "lossless",
            Self::ToMel => "to-mel",
            Self::To81 => "to-8.1",
            Self::To84 => "to-8.4",
            Self::To81MappingPreserved => "to-8.1-mapping-preserved",
        };
        f.write_str(name)
    }
}

/// 返回转换后的新 RPU, 输入保持不变
pub fn convert_rpu(rpu: &DoviRpu, mode: ConversionMode) -> DoviResult<DoviRpu> {
    rpu.validate()?;

    let profile = rpu.guessed_profile();
    if !mode.supports(profile) {
        return Err(DoviError::UnsupportedSourceProfile {
            profile,
            mode: mode.into(),
        });
    }

    let mut out = rpu.clone();
    match mode {
        ConversionMode::Lossless => return Ok(out),
        ConversionMode::ToMel => to_mel(&mut out),
        ConversionMode::To81 => to_81(&mut out),
        ConversionMode::To84 => {
            to_81(&mut out);
            if let Some(dm) = out.vdr_dm_data.as_mut() {
                let removed = dm.remove_blocks(ExtMetadataBlock::is_dynamic);
                debug!("转换: 移除 {} 个动态扩展块", removed);
            }
        }
        ConversionMode::To81MappingPreserved => to_81_mapping_preserved(&mut out),
    }

    out.validate()?;
    debug!(
        "转换: profile {} -> {} (模式 {})",
        profile,
        out.guessed_profile(),
        mode,
    );
    Ok(out)
}

fn to_mel(rpu: &mut DoviRpu) {
    let header = &mut rpu.header;
    header.el_spatial_resampling_filter_flag = true;
    header.disable_residual_flag = false;
    header.vdr_bit_depth_minus8 = 4;

    let nlq_signalled = header.nlq_signalled();
    let bl_bit_depth = header.bl_bit_depth();
    if let Some(mapping) = rpu.rpu_data_mapping.as_mut() {
        match (nlq_signalled, mapping.nlq.as_mut()) {
            (true, Some(nlq)) => nlq.set_mel_identity(),
            (true, None) => mapping.nlq = Some(RpuDataNlq::mel_identity(bl_bit_depth)),
            (false, _) => mapping.nlq = None,
        }
    }
}

/// 关闭增强层标志; 之后头部不再声明 NLQ
fn disable_el(rpu: &mut DoviRpu) {
    rpu.header.el_spatial_resampling_filter_flag = false;
    rpu.header.disable_residual_flag = true;
    if let Some(mapping) = rpu.rpu_data_mapping.as_mut() {
        mapping.nlq = None;
    }
}

fn to_81(rpu: &mut DoviRpu) {
    rpu.header.vdr_rpu_profile = 1;
    rpu.header.bl_video_full_range_flag = false;
    disable_el(rpu);

    let bl_bit_depth = rpu.header.bl_bit_depth();
    if let Some(mapping) = rpu.rpu_data_mapping.as_mut() {
        mapping.set_identity_curves(bl_bit_depth);
    }
    if let Some(dm) = rpu.vdr_dm_data.as_mut() {
        dm.set_p81_coefficients();
        dm.signal_color_space = 0;
    }
}

fn to_81_mapping_preserved(rpu: &mut DoviRpu) {
    disable_el(rpu);
    if let Some(dm) = rpu.vdr_dm_data.as_mut() {
        dm.set_p81_coefficients();
    }
}

impl DoviRpu {
    /// 原地转换, 失败时保持不变
    pub fn convert_with_mode(&mut self, mode: ConversionMode) -> DoviResult<()> {
        *self = convert_rpu(self, mode)?;
        Ok(())
    }
}
