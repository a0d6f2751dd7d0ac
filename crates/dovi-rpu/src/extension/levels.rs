//! 各级别扩展元数据块的字段定义与编解码.
//!
//! 每个级别实现 [`ExtBlockPayload`], 描述合法长度, 有效负载位数与字段读写顺序.
//! 负载位数不足声明长度的部分为对齐位, 由上层记录原值.
//!
//! 字段结构体均为 `#[repr(C)]`, C ABI 直接导出其副本.

use dovi_core::{BitReader, BitWriter, DoviResult};

/// 扩展块负载 trait
///
/// 字段读写由具体级别实现, 长度校验与对齐由
/// [`ExtBlockRecord`](super::ExtBlockRecord) 统一处理.
pub trait ExtBlockPayload: Sized {
    /// 级别编号
    const LEVEL: u8;

    /// 合法的 ext_block_length 取值
    const VALID_LENGTHS: &'static [u64];

    /// 当前块的 ext_block_length
    fn length(&self) -> u64 {
        Self::VALID_LENGTHS[0]
    }

    /// 按当前长度实际编码的字段位数
    fn payload_bits(&self) -> u64;

    /// 按声明长度读取字段
    fn parse(br: &mut BitReader, length: u64) -> DoviResult<Self>;

    /// 写入字段 (不含长度, 级别与对齐位)
    fn write(&self, bw: &mut BitWriter);
}

fn read_u16(br: &mut BitReader, n: u32) -> DoviResult<u16> {
    Ok(br.read_bits(n)? as u16)
}

fn read_u8(br: &mut BitReader, n: u32) -> DoviResult<u8> {
    Ok(br.read_bits(n)? as u8)
}

/// Level 1: 帧内 PQ 统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel1 {
    pub min_pq: u16,
    pub max_pq: u16,
    pub avg_pq: u16,
}

impl ExtBlockPayload for ExtMetadataBlockLevel1 {
    const LEVEL: u8 = 1;
    const VALID_LENGTHS: &'static [u64] = &[5];

    fn payload_bits(&self) -> u64 {
        36
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            min_pq: read_u16(br, 12)?,
            max_pq: read_u16(br, 12)?,
            avg_pq: read_u16(br, 12)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.min_pq), 12);
        bw.write_bits(u64::from(self.max_pq), 12);
        bw.write_bits(u64::from(self.avg_pq), 12);
    }
}

/// Level 2: 目标显示器 trim (CM v2.9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel2 {
    pub target_max_pq: u16,
    pub trim_slope: u16,
    pub trim_offset: u16,
    pub trim_power: u16,
    pub trim_chroma_weight: u16,
    pub trim_saturation_gain: u16,
    /// 13 位有符号
    pub ms_weight: i16,
}

impl ExtBlockPayload for ExtMetadataBlockLevel2 {
    const LEVEL: u8 = 2;
    const VALID_LENGTHS: &'static [u64] = &[11];

    fn payload_bits(&self) -> u64 {
        85
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            target_max_pq: read_u16(br, 12)?,
            trim_slope: read_u16(br, 12)?,
            trim_offset: read_u16(br, 12)?,
            trim_power: read_u16(br, 12)?,
            trim_chroma_weight: read_u16(br, 12)?,
            trim_saturation_gain: read_u16(br, 12)?,
            ms_weight: br.read_signed(13)? as i16,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.target_max_pq), 12);
        bw.write_bits(u64::from(self.trim_slope), 12);
        bw.write_bits(u64::from(self.trim_offset), 12);
        bw.write_bits(u64::from(self.trim_power), 12);
        bw.write_bits(u64::from(self.trim_chroma_weight), 12);
        bw.write_bits(u64::from(self.trim_saturation_gain), 12);
        bw.write_signed(i64::from(self.ms_weight), 13);
    }
}

/// Level 3: Level 1 统计的偏移量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel3 {
    pub min_pq_offset: u16,
    pub max_pq_offset: u16,
    pub avg_pq_offset: u16,
}

impl ExtBlockPayload for ExtMetadataBlockLevel3 {
    const LEVEL: u8 = 3;
    const VALID_LENGTHS: &'static [u64] = &[5];

    fn payload_bits(&self) -> u64 {
        36
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            min_pq_offset: read_u16(br, 12)?,
            max_pq_offset: read_u16(br, 12)?,
            avg_pq_offset: read_u16(br, 12)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.min_pq_offset), 12);
        bw.write_bits(u64::from(self.max_pq_offset), 12);
        bw.write_bits(u64::from(self.avg_pq_offset), 12);
    }
}

/// Level 4: 时域滤波锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel4 {
    pub anchor_pq: u16,
    pub anchor_power: u16,
}

impl ExtBlockPayload for ExtMetadataBlockLevel4 {
    const LEVEL: u8 = 4;
    const VALID_LENGTHS: &'static [u64] = &[3];

    fn payload_bits(&self) -> u64 {
        24
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            anchor_pq: read_u16(br, 12)?,
            anchor_power: read_u16(br, 12)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.anchor_pq), 12);
        bw.write_bits(u64::from(self.anchor_power), 12);
    }
}

/// Level 5: 有效画面区域偏移 (letterbox)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel5 {
    pub active_area_left_offset: u16,
    pub active_area_right_offset: u16,
    pub active_area_top_offset: u16,
    pub active_area_bottom_offset: u16,
}

impl ExtMetadataBlockLevel5 {
    /// 偏移字段的最大值 (13 位)
    pub const MAX_OFFSET: u16 = 8191;

    /// 从四个偏移创建
    pub fn from_offsets(left: u16, right: u16, top: u16, bottom: u16) -> Self {
        Self {
            active_area_left_offset: left,
            active_area_right_offset: right,
            active_area_top_offset: top,
            active_area_bottom_offset: bottom,
        }
    }

    /// 按左, 右, 上, 下顺序返回偏移
    pub fn offsets(&self) -> [u16; 4] {
        [
            self.active_area_left_offset,
            self.active_area_right_offset,
            self.active_area_top_offset,
            self.active_area_bottom_offset,
        ]
    }
}

impl ExtBlockPayload for ExtMetadataBlockLevel5 {
    const LEVEL: u8 = 5;
    const VALID_LENGTHS: &'static [u64] = &[7];

    fn payload_bits(&self) -> u64 {
        52
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            active_area_left_offset: read_u16(br, 13)?,
            active_area_right_offset: read_u16(br, 13)?,
            active_area_top_offset: read_u16(br, 13)?,
            active_area_bottom_offset: read_u16(br, 13)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        for offset in self.offsets() {
            bw.write_bits(u64::from(offset), 13);
        }
    }
}

/// Level 6: ST 2086 母版信息与 CLL/FALL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel6 {
    pub max_display_mastering_luminance: u16,
    pub min_display_mastering_luminance: u16,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

impl ExtBlockPayload for ExtMetadataBlockLevel6 {
    const LEVEL: u8 = 6;
    const VALID_LENGTHS: &'static [u64] = &[8];

    fn payload_bits(&self) -> u64 {
        64
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            max_display_mastering_luminance: read_u16(br, 16)?,
            min_display_mastering_luminance: read_u16(br, 16)?,
            max_content_light_level: read_u16(br, 16)?,
            max_frame_average_light_level: read_u16(br, 16)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.max_display_mastering_luminance), 16);
        bw.write_bits(u64::from(self.min_display_mastering_luminance), 16);
        bw.write_bits(u64::from(self.max_content_light_level), 16);
        bw.write_bits(u64::from(self.max_frame_average_light_level), 16);
    }
}

/// Level 8: 目标显示器 trim (CM v4.0), 变长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel8 {
    /// 码流中声明的 ext_block_length
    pub length: u64,
    pub target_display_index: u8,
    pub trim_slope: u16,
    pub trim_offset: u16,
    pub trim_power: u16,
    pub trim_chroma_weight: u16,
    pub trim_saturation_gain: u16,
    pub ms_weight: u16,
    /// length >= 12
    pub target_mid_contrast: u16,
    /// length >= 13
    pub clip_trim: u16,
    /// length >= 19
    pub saturation_vector_field: [u8; 6],
    /// length >= 25
    pub hue_vector_field: [u8; 6],
}

impl Default for ExtMetadataBlockLevel8 {
    fn default() -> Self {
        Self {
            length: 10,
            target_display_index: 0,
            trim_slope: 2048,
            trim_offset: 2048,
            trim_power: 2048,
            trim_chroma_weight: 2048,
            trim_saturation_gain: 2048,
            ms_weight: 2048,
            target_mid_contrast: 0,
            clip_trim: 0,
            saturation_vector_field: [0; 6],
            hue_vector_field: [0; 6],
        }
    }
}

impl ExtMetadataBlockLevel8 {
    pub fn has_target_mid_contrast(&self) -> bool {
        self.length >= 12
    }

    pub fn has_clip_trim(&self) -> bool {
        self.length >= 13
    }

    pub fn has_saturation_vectors(&self) -> bool {
        self.length >= 19
    }

    pub fn has_hue_vectors(&self) -> bool {
        self.length >= 25
    }
}

impl ExtBlockPayload for ExtMetadataBlockLevel8 {
    const LEVEL: u8 = 8;
    const VALID_LENGTHS: &'static [u64] = &[10, 12, 13, 19, 25];

    fn length(&self) -> u64 {
        self.length
    }

    fn payload_bits(&self) -> u64 {
        let mut bits = 80;
        if self.has_target_mid_contrast() {
            bits += 12;
        }
        if self.has_clip_trim() {
            bits += 12;
        }
        if self.has_saturation_vectors() {
            bits += 48;
        }
        if self.has_hue_vectors() {
            bits += 48;
        }
        bits
    }

    fn parse(br: &mut BitReader, length: u64) -> DoviResult<Self> {
        let mut block = Self {
            length,
            target_display_index: read_u8(br, 8)?,
            trim_slope: read_u16(br, 12)?,
            trim_offset: read_u16(br, 12)?,
            trim_power: read_u16(br, 12)?,
            trim_chroma_weight: read_u16(br, 12)?,
            trim_saturation_gain: read_u16(br, 12)?,
            ms_weight: read_u16(br, 12)?,
            target_mid_contrast: 0,
            clip_trim: 0,
            saturation_vector_field: [0; 6],
            hue_vector_field: [0; 6],
        };

        if block.has_target_mid_contrast() {
            block.target_mid_contrast = read_u16(br, 12)?;
        }
        if block.has_clip_trim() {
            block.clip_trim = read_u16(br, 12)?;
        }
        if block.has_saturation_vectors() {
            for v in block.saturation_vector_field.iter_mut() {
                *v = read_u8(br, 8)?;
            }
        }
        if block.has_hue_vectors() {
            for v in block.hue_vector_field.iter_mut() {
                *v = read_u8(br, 8)?;
            }
        }

        Ok(block)
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.target_display_index), 8);
        bw.write_bits(u64::from(self.trim_slope), 12);
        bw.write_bits(u64::from(self.trim_offset), 12);
        bw.write_bits(u64::from(self.trim_power), 12);
        bw.write_bits(u64::from(self.trim_chroma_weight), 12);
        bw.write_bits(u64::from(self.trim_saturation_gain), 12);
        bw.write_bits(u64::from(self.ms_weight), 12);

        if self.has_target_mid_contrast() {
            bw.write_bits(u64::from(self.target_mid_contrast), 12);
        }
        if self.has_clip_trim() {
            bw.write_bits(u64::from(self.clip_trim), 12);
        }
        if self.has_saturation_vectors() {
            for &v in &self.saturation_vector_field {
                bw.write_bits(u64::from(v), 8);
            }
        }
        if self.has_hue_vectors() {
            for &v in &self.hue_vector_field {
                bw.write_bits(u64::from(v), 8);
            }
        }
    }
}

/// 色度坐标 (红, 绿, 蓝, 白点的 x/y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Primaries {
    pub red_x: u16,
    pub red_y: u16,
    pub green_x: u16,
    pub green_y: u16,
    pub blue_x: u16,
    pub blue_y: u16,
    pub white_x: u16,
    pub white_y: u16,
}

impl Primaries {
    fn parse(br: &mut BitReader) -> DoviResult<Self> {
        Ok(Self {
            red_x: read_u16(br, 16)?,
            red_y: read_u16(br, 16)?,
            green_x: read_u16(br, 16)?,
            green_y: read_u16(br, 16)?,
            blue_x: read_u16(br, 16)?,
            blue_y: read_u16(br, 16)?,
            white_x: read_u16(br, 16)?,
            white_y: read_u16(br, 16)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        for v in [
            self.red_x,
            self.red_y,
            self.green_x,
            self.green_y,
            self.blue_x,
            self.blue_y,
            self.white_x,
            self.white_y,
        ] {
            bw.write_bits(u64::from(v), 16);
        }
    }
}

/// Level 9: 源显示器色域, 变长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel9 {
    pub length: u64,
    pub source_primary_index: u8,
    /// length == 17 时存在
    pub source_primaries: Primaries,
}

impl Default for ExtMetadataBlockLevel9 {
    fn default() -> Self {
        Self {
            length: 1,
            source_primary_index: 0,
            source_primaries: Primaries::default(),
        }
    }
}

impl ExtMetadataBlockLevel9 {
    pub fn has_primaries(&self) -> bool {
        self.length >= 17
    }
}

impl ExtBlockPayload for ExtMetadataBlockLevel9 {
    const LEVEL: u8 = 9;
    const VALID_LENGTHS: &'static [u64] = &[1, 17];

    fn length(&self) -> u64 {
        self.length
    }

    fn payload_bits(&self) -> u64 {
        if self.has_primaries() { 136 } else { 8 }
    }

    fn parse(br: &mut BitReader, length: u64) -> DoviResult<Self> {
        let mut block = Self {
            length,
            source_primary_index: read_u8(br, 8)?,
            source_primaries: Primaries::default(),
        };
        if block.has_primaries() {
            block.source_primaries = Primaries::parse(br)?;
        }
        Ok(block)
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.source_primary_index), 8);
        if self.has_primaries() {
            self.source_primaries.write(bw);
        }
    }
}

/// Level 10: 自定义目标显示器, 变长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel10 {
    pub length: u64,
    pub target_display_index: u8,
    pub target_max_pq: u16,
    pub target_min_pq: u16,
    pub target_primary_index: u8,
    /// length == 21 时存在
    pub target_primaries: Primaries,
}

impl Default for ExtMetadataBlockLevel10 {
    fn default() -> Self {
        Self {
            length: 5,
            target_display_index: 0,
            target_max_pq: 0,
            target_min_pq: 0,
            target_primary_index: 0,
            target_primaries: Primaries::default(),
        }
    }
}

impl ExtMetadataBlockLevel10 {
    pub fn has_primaries(&self) -> bool {
        self.length >= 21
    }
}

impl ExtBlockPayload for ExtMetadataBlockLevel10 {
    const LEVEL: u8 = 10;
    const VALID_LENGTHS: &'static [u64] = &[5, 21];

    fn length(&self) -> u64 {
        self.length
    }

    fn payload_bits(&self) -> u64 {
        if self.has_primaries() { 168 } else { 40 }
    }

    fn parse(br: &mut BitReader, length: u64) -> DoviResult<Self> {
        let mut block = Self {
            length,
            target_display_index: read_u8(br, 8)?,
            target_max_pq: read_u16(br, 12)?,
            target_min_pq: read_u16(br, 12)?,
            target_primary_index: read_u8(br, 8)?,
            target_primaries: Primaries::default(),
        };
        if block.has_primaries() {
            block.target_primaries = Primaries::parse(br)?;
        }
        Ok(block)
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.target_display_index), 8);
        bw.write_bits(u64::from(self.target_max_pq), 12);
        bw.write_bits(u64::from(self.target_min_pq), 12);
        bw.write_bits(u64::from(self.target_primary_index), 8);
        if self.has_primaries() {
            self.target_primaries.write(bw);
        }
    }
}

/// Level 11: 内容类型与参考模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel11 {
    pub content_type: u8,
    /// 7 位
    pub whitepoint: u8,
    pub reference_mode_flag: bool,
    pub reserved_byte2: u8,
    pub reserved_byte3: u8,
}

impl ExtBlockPayload for ExtMetadataBlockLevel11 {
    const LEVEL: u8 = 11;
    const VALID_LENGTHS: &'static [u64] = &[4];

    fn payload_bits(&self) -> u64 {
        32
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            content_type: read_u8(br, 8)?,
            whitepoint: read_u8(br, 7)?,
            reference_mode_flag: br.read_flag()?,
            reserved_byte2: read_u8(br, 8)?,
            reserved_byte3: read_u8(br, 8)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.content_type), 8);
        bw.write_bits(u64::from(self.whitepoint), 7);
        bw.write_flag(self.reference_mode_flag);
        bw.write_bits(u64::from(self.reserved_byte2), 8);
        bw.write_bits(u64::from(self.reserved_byte3), 8);
    }
}

/// Level 254: CM v4.0 模式与版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel254 {
    pub dm_mode: u8,
    pub dm_version_index: u8,
}

impl ExtBlockPayload for ExtMetadataBlockLevel254 {
    const LEVEL: u8 = 254;
    const VALID_LENGTHS: &'static [u64] = &[2];

    fn payload_bits(&self) -> u64 {
        16
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        Ok(Self {
            dm_mode: read_u8(br, 8)?,
            dm_version_index: read_u8(br, 8)?,
        })
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.dm_mode), 8);
        bw.write_bits(u64::from(self.dm_version_index), 8);
    }
}

/// Level 255: DM 调试信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ExtMetadataBlockLevel255 {
    pub dm_run_mode: u8,
    pub dm_run_version: u8,
    pub dm_debug_value: [u8; 4],
}

impl ExtBlockPayload for ExtMetadataBlockLevel255 {
    const LEVEL: u8 = 255;
    const VALID_LENGTHS: &'static [u64] = &[6];

    fn payload_bits(&self) -> u64 {
        48
    }

    fn parse(br: &mut BitReader, _length: u64) -> DoviResult<Self> {
        let mut block = Self {
            dm_run_mode: read_u8(br, 8)?,
            dm_run_version: read_u8(br, 8)?,
            dm_debug_value: [0; 4],
        };
        for v in block.dm_debug_value.iter_mut() {
            *v = read_u8(br, 8)?;
        }
        Ok(block)
    }

    fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(u64::from(self.dm_run_mode), 8);
        bw.write_bits(u64::from(self.dm_run_version), 8);
        for &v in &self.dm_debug_value {
            bw.write_bits(u64::from(v), 8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 写入后检查实际位数与 payload_bits 一致
    fn assert_bits<T: ExtBlockPayload>(block: &T) {
        let mut bw = BitWriter::new();
        block.write(&mut bw);
        assert_eq!(bw.bits_written() as u64, block.payload_bits());
        assert!(block.payload_bits() <= block.length() * 8);
        assert!(block.length() * 8 - block.payload_bits() < 8);
    }

    #[test]
    fn test_payload_bits_match_writer() {
        assert_bits(&ExtMetadataBlockLevel1::default());
        assert_bits(&ExtMetadataBlockLevel2::default());
        assert_bits(&ExtMetadataBlockLevel3::default());
        assert_bits(&ExtMetadataBlockLevel4::default());
        assert_bits(&ExtMetadataBlockLevel5::default());
        assert_bits(&ExtMetadataBlockLevel6::default());
        for length in ExtMetadataBlockLevel8::VALID_LENGTHS {
            assert_bits(&ExtMetadataBlockLevel8 {
                length: *length,
                ..Default::default()
            });
        }
        for length in ExtMetadataBlockLevel9::VALID_LENGTHS {
            assert_bits(&ExtMetadataBlockLevel9 {
                length: *length,
                ..Default::default()
            });
        }
        for length in ExtMetadataBlockLevel10::VALID_LENGTHS {
            assert_bits(&ExtMetadataBlockLevel10 {
                length: *length,
                ..Default::default()
            });
        }
        assert_bits(&ExtMetadataBlockLevel11::default());
        assert_bits(&ExtMetadataBlockLevel254::default());
        assert_bits(&ExtMetadataBlockLevel255::default());
    }

    #[test]
    fn test_level2_negative_ms_weight() {
        let block = ExtMetadataBlockLevel2 {
            target_max_pq: 2851,
            ms_weight: -1,
            ..Default::default()
        };
        let mut bw = BitWriter::new();
        block.write(&mut bw);
        let data = bw.finish();
        let parsed = ExtMetadataBlockLevel2::parse(&mut BitReader::new(&data), 11).unwrap();
        assert_eq!(parsed.ms_weight, -1);
        assert_eq!(parsed.target_max_pq, 2851);
    }

    #[test]
    fn test_level8_short_length_defaults() {
        // 长度 10 只编码到 ms_weight, 后续字段读回为 0
        let data = [0xFFu8; 16];
        let block = ExtMetadataBlockLevel8::parse(&mut BitReader::new(&data), 10).unwrap();
        assert_eq!(block.ms_weight, 0xFFF);
        assert_eq!(block.target_mid_contrast, 0);
        assert_eq!(block.clip_trim, 0);
        assert_eq!(block.saturation_vector_field, [0; 6]);
        assert_eq!(block.hue_vector_field, [0; 6]);
        assert!(!block.has_target_mid_contrast());
        assert!(!block.has_hue_vectors());
    }

    #[test]
    fn test_level10_primaries_presence() {
        let short = ExtMetadataBlockLevel10::default();
        assert!(!short.has_primaries());
        let full = ExtMetadataBlockLevel10 {
            length: 21,
            ..Default::default()
        };
        assert!(full.has_primaries());
        assert_eq!(full.payload_bits(), 168);
    }
}
