//! RPU 头部 (rpu_data_header) 解析与写回.
//!
//! 头部为定长字段序列, 决定后续 mapping / NLQ / DM 负载的位宽与是否存在.
//! 同时提供 profile 推测逻辑, 它是整个 RPU 语法中唯一的启发式部分.

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult};

/// RPU 类型, Dolby Vision 固定为 2
pub const RPU_TYPE_DOVI: u8 = 2;

/// rpu_format 中用于判断序列信息扩展字段是否存在的掩码
const RPU_FORMAT_EXT_MASK: u16 = 0x700;

/// 基础层/增强层位深 minus8 的上限 (即最大 16 位)
const MAX_BIT_DEPTH_MINUS8: u64 = 8;

/// VDR 位深 minus8 的上限 (即最大 14 位)
const MAX_VDR_BIT_DEPTH_MINUS8: u64 = 6;

/// 增强层类型 (仅 profile 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElType {
    /// Full Enhancement Layer
    Fel,
    /// Minimal Enhancement Layer
    Mel,
}

impl ElType {
    /// 获取类型名称 ("FEL" / "MEL")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fel => "FEL",
            Self::Mel => "MEL",
        }
    }
}

impl std::fmt::Display for ElType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// profile 推测的输入信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileSignals {
    /// vdr_rpu_profile
    pub vdr_rpu_profile: u8,
    /// 增强层是否存在 (el_spatial_resampling_filter_flag && !disable_residual_flag)
    pub el_present: bool,
    /// bl_video_full_range_flag
    pub bl_full_range: bool,
    /// vdr_bit_depth_minus8
    pub vdr_bit_depth_minus8: u64,
}

/// 根据头部信号推测 Dolby Vision profile
///
/// 返回 4, 5, 7, 8, 或 0 (无法识别).
pub fn guess_profile(signals: ProfileSignals) -> u8 {
    match signals.vdr_rpu_profile {
        0 if signals.bl_full_range => 5,
        1 if signals.el_present => {
            if signals.vdr_bit_depth_minus8 == 4 {
                7
            } else {
                4
            }
        }
        1 => 8,
        _ => 0,
    }
}

/// RPU 头部
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpuDataHeader {
    /// rpu_type (6 位, 必须为 2)
    pub rpu_type: u8,
    /// rpu_format (11 位)
    pub rpu_format: u16,
    /// vdr_rpu_profile (4 位)
    pub vdr_rpu_profile: u8,
    /// vdr_rpu_level (4 位)
    pub vdr_rpu_level: u8,
    /// 序列信息是否存在
    pub vdr_seq_info_present_flag: bool,
    pub chroma_resampling_explicit_filter_flag: bool,
    /// 系数类型: 0 = 定点 (整数 + 分数), 1 = 32 位浮点位型
    pub coefficient_data_type: u8,
    /// 定点系数分母的 log2
    pub coefficient_log2_denom: u64,
    pub vdr_rpu_normalized_idc: u8,
    /// 基础层是否为全范围
    pub bl_video_full_range_flag: bool,
    pub bl_bit_depth_minus8: u64,
    /// 低 8 位为位深, 高位保留原始值以便无损写回
    pub el_bit_depth_minus8: u64,
    pub vdr_bit_depth_minus8: u64,
    pub spatial_resampling_filter_flag: bool,
    /// 保留位, 值为 1 时表示 DM 数据为压缩形式
    pub reserved_zero_3bits: u8,
    pub el_spatial_resampling_filter_flag: bool,
    /// 为 true 时不存在残差 (NLQ) 数据
    pub disable_residual_flag: bool,
    /// DM 元数据是否存在
    pub vdr_dm_metadata_present_flag: bool,
    /// 复用前一个 RPU 的 mapping
    pub use_prev_vdr_rpu_flag: bool,
    pub prev_vdr_rpu_id: u64,
}

impl RpuDataHeader {
    /// 从比特流解析头部
    pub fn parse(br: &mut BitReader) -> DoviResult<Self> {
        let mut header = Self {
            rpu_type: br.read_bits(6)? as u8,
            rpu_format: br.read_bits(11)? as u16,
            ..Default::default()
        };

        if header.rpu_type != RPU_TYPE_DOVI {
            return Err(DoviError::InvalidData(format!(
                "RPU 头部: rpu_type={} 不是 Dolby Vision (2)",
                header.rpu_type,
            )));
        }

        header.vdr_rpu_profile = br.read_bits(4)? as u8;
        header.vdr_rpu_level = br.read_bits(4)? as u8;
        header.vdr_seq_info_present_flag = br.read_flag()?;

        if header.vdr_seq_info_present_flag {
            header.chroma_resampling_explicit_filter_flag = br.read_flag()?;
            header.coefficient_data_type = br.read_bits(2)? as u8;

            if header.coefficient_data_type == 0 {
                header.coefficient_log2_denom = br.read_ue()?;
            }

            header.vdr_rpu_normalized_idc = br.read_bits(2)? as u8;
            header.bl_video_full_range_flag = br.read_flag()?;

            if header.has_bit_depth_info() {
                header.bl_bit_depth_minus8 = br.read_ue()?;
                header.el_bit_depth_minus8 = br.read_ue()?;
                header.vdr_bit_depth_minus8 = br.read_ue()?;
                header.spatial_resampling_filter_flag = br.read_flag()?;
                header.reserved_zero_3bits = br.read_bits(3)? as u8;
                header.el_spatial_resampling_filter_flag = br.read_flag()?;
                header.disable_residual_flag = br.read_flag()?;
            }
        }

        header.vdr_dm_metadata_present_flag = br.read_flag()?;
        header.use_prev_vdr_rpu_flag = br.read_flag()?;

        if header.use_prev_vdr_rpu_flag {
            header.prev_vdr_rpu_id = br.read_ue()?;
        }

        header.validate()?;
        Ok(header)
    }

    /// 写入头部
    pub fn write(&self, bw: &mut BitWriter) -> DoviResult<()> {
        self.validate()?;

        bw.write_bits(u64::from(self.rpu_type), 6);
        bw.write_bits(u64::from(self.rpu_format), 11);
        bw.write_bits(u64::from(self.vdr_rpu_profile), 4);
        bw.write_bits(u64::from(self.vdr_rpu_level), 4);
        bw.write_flag(self.vdr_seq_info_present_flag);

        if self.vdr_seq_info_present_flag {
            bw.write_flag(self.chroma_resampling_explicit_filter_flag);
            bw.write_bits(u64::from(self.coefficient_data_type), 2);

            if self.coefficient_data_type == 0 {
                bw.write_ue(self.coefficient_log2_denom);
            }

            bw.write_bits(u64::from(self.vdr_rpu_normalized_idc), 2);
            bw.write_flag(self.bl_video_full_range_flag);

            if self.has_bit_depth_info() {
                bw.write_ue(self.bl_bit_depth_minus8);
                bw.write_ue(self.el_bit_depth_minus8);
                bw.write_ue(self.vdr_bit_depth_minus8);
                bw.write_flag(self.spatial_resampling_filter_flag);
                bw.write_bits(u64::from(self.reserved_zero_3bits), 3);
                bw.write_flag(self.el_spatial_resampling_filter_flag);
                bw.write_flag(self.disable_residual_flag);
            }
        }

        bw.write_flag(self.vdr_dm_metadata_present_flag);
        bw.write_flag(self.use_prev_vdr_rpu_flag);

        if self.use_prev_vdr_rpu_flag {
            bw.write_ue(self.prev_vdr_rpu_id);
        }

        Ok(())
    }

    /// 检查字段取值范围
    pub fn validate(&self) -> DoviResult<()> {
        if self.rpu_type != RPU_TYPE_DOVI {
            return Err(DoviError::InvalidData(format!(
                "RPU 头部: rpu_type={} 不是 Dolby Vision (2)",
                self.rpu_type,
            )));
        }
        if self.coefficient_data_type > 1 {
            return Err(DoviError::InvalidData(format!(
                "RPU 头部: 不支持的 coefficient_data_type={}",
                self.coefficient_data_type,
            )));
        }
        if self.coefficient_data_type == 0 && self.coefficient_log2_denom > 32 {
            return Err(DoviError::InvalidData(format!(
                "RPU 头部: coefficient_log2_denom={} 超过 32",
                self.coefficient_log2_denom,
            )));
        }
        let depths = [
            ("bl", self.bl_bit_depth_minus8, MAX_BIT_DEPTH_MINUS8),
            ("el", self.el_bit_depth_minus8 & 0xFF, MAX_BIT_DEPTH_MINUS8),
            ("vdr", self.vdr_bit_depth_minus8, MAX_VDR_BIT_DEPTH_MINUS8),
        ];
        for (name, minus8, max) in depths {
            if minus8 > max {
                return Err(DoviError::InvalidData(format!(
                    "RPU 头部: {}_bit_depth_minus8={} 超出范围",
                    name, minus8,
                )));
            }
        }
        Ok(())
    }

    /// 序列信息中是否携带位深与残差相关字段
    pub fn has_bit_depth_info(&self) -> bool {
        self.rpu_format & RPU_FORMAT_EXT_MASK == 0
    }

    /// 基础层位深
    pub fn bl_bit_depth(&self) -> u32 {
        self.bl_bit_depth_minus8 as u32 + 8
    }

    /// 增强层位深
    pub fn el_bit_depth(&self) -> u32 {
        (self.el_bit_depth_minus8 & 0xFF) as u32 + 8
    }

    /// 定点/浮点系数的分数部分位宽
    pub fn coef_bit_len(&self) -> u32 {
        if self.coefficient_data_type == 0 {
            self.coefficient_log2_denom as u32
        } else {
            32
        }
    }

    /// 系数是否带有独立编码的整数部分
    pub fn has_integer_coefs(&self) -> bool {
        self.coefficient_data_type == 0
    }

    /// mapping 中是否携带 NLQ (残差) 数据
    pub fn nlq_signalled(&self) -> bool {
        self.has_bit_depth_info() && !self.disable_residual_flag
    }

    /// 增强层是否存在
    pub fn el_present(&self) -> bool {
        self.el_spatial_resampling_filter_flag && !self.disable_residual_flag
    }

    /// DM 数据是否为压缩形式
    pub fn dm_compressed(&self) -> bool {
        self.reserved_zero_3bits == 1
    }

    /// profile 推测所需的信号
    pub fn profile_signals(&self) -> ProfileSignals {
        ProfileSignals {
            vdr_rpu_profile: self.vdr_rpu_profile,
            el_present: self.el_present(),
            bl_full_range: self.bl_video_full_range_flag,
            vdr_bit_depth_minus8: self.vdr_bit_depth_minus8,
        }
    }

    /// 推测的 Dolby Vision profile
    pub fn guessed_profile(&self) -> u8 {
        guess_profile(self.profile_signals())
    }
}
