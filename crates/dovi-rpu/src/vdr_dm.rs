//! 显示管理 (vdr_dm_data) 负载.
//!
//! 包含色彩转换矩阵, 信号描述, 源显示器 PQ 范围以及两段扩展块.
//! 压缩形式的 DM 只编码 id 与扩展块, 其余字段取参考默认值.

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult};
use log::warn;

use crate::extension::{
    CmVersion, ExtBlockRecord, ExtBlockSection, ExtMetadataBlock, ExtMetadataBlockLevel1,
    ExtMetadataBlockLevel10, ExtMetadataBlockLevel11, ExtMetadataBlockLevel2,
    ExtMetadataBlockLevel254, ExtMetadataBlockLevel255, ExtMetadataBlockLevel3,
    ExtMetadataBlockLevel4, ExtMetadataBlockLevel5, ExtMetadataBlockLevel6,
    ExtMetadataBlockLevel8, ExtMetadataBlockLevel9,
};

/// profile 8.1 / 压缩 DM 使用的 YCbCr -> RGB 矩阵
pub const P81_YCC_TO_RGB_COEF: [i16; 9] = [9574, 0, 13802, 9574, -1540, -5348, 9574, 17610, 0];
/// profile 8.1 / 压缩 DM 使用的 YCbCr -> RGB 偏移
pub const P81_YCC_TO_RGB_OFFSET: [u32; 3] = [16_777_216, 134_217_728, 134_217_728];
/// profile 8.1 / 压缩 DM 使用的 RGB -> LMS 矩阵
pub const P81_RGB_TO_LMS_COEF: [i16; 9] = [7222, 8771, 390, 2654, 12430, 1300, 0, 422, 15962];

/// DM 负载
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VdrDmData {
    /// 为 true 时矩阵与信号字段不在码流中
    pub compressed: bool,

    pub affected_dm_metadata_id: u64,
    pub current_dm_metadata_id: u64,
    pub scene_refresh_flag: u64,

    pub ycc_to_rgb_coef: [i16; 9],
    pub ycc_to_rgb_offset: [u32; 3],
    pub rgb_to_lms_coef: [i16; 9],

    pub signal_eotf: u16,
    pub signal_eotf_param0: u16,
    pub signal_eotf_param1: u16,
    pub signal_eotf_param2: u32,
    pub signal_bit_depth: u8,
    pub signal_color_space: u8,
    pub signal_chroma_format: u8,
    pub signal_full_range_flag: u8,
    pub source_min_pq: u16,
    pub source_max_pq: u16,
    pub source_diagonal: u16,

    pub cmv29_metadata: ExtBlockSection,
    pub cmv40_metadata: Option<ExtBlockSection>,
}

/// 返回首个满足条件的块
macro_rules! first_block {
    ($self:expr, $variant:ident) => {
        $self.blocks().find_map(|b| match b {
            ExtMetadataBlock::$variant(inner) => Some(inner),
            _ => None,
        })
    };
}

impl VdrDmData {
    /// 压缩 DM 与新建 RPU 使用的参考默认值 (PQ, 12 位, 1000 nit 母版)
    pub fn default_pq() -> Self {
        Self {
            compressed: false,
            affected_dm_metadata_id: 0,
            current_dm_metadata_id: 0,
            scene_refresh_flag: 0,
            ycc_to_rgb_coef: P81_YCC_TO_RGB_COEF,
            ycc_to_rgb_offset: P81_YCC_TO_RGB_OFFSET,
            rgb_to_lms_coef: P81_RGB_TO_LMS_COEF,
            signal_eotf: 65535,
            signal_eotf_param0: 0,
            signal_eotf_param1: 0,
            signal_eotf_param2: 0,
            signal_bit_depth: 12,
            signal_color_space: 0,
            signal_chroma_format: 0,
            signal_full_range_flag: 1,
            source_min_pq: 62,
            source_max_pq: 3696,
            source_diagonal: 42,
            cmv29_metadata: ExtBlockSection::new(CmVersion::V29),
            cmv40_metadata: None,
        }
    }

    /// 将矩阵替换为 profile 8.1 参考值
    pub fn set_p81_coefficients(&mut self) {
        self.ycc_to_rgb_coef = P81_YCC_TO_RGB_COEF;
        self.ycc_to_rgb_offset = P81_YCC_TO_RGB_OFFSET;
        self.rgb_to_lms_coef = P81_RGB_TO_LMS_COEF;
    }

    /// 从比特流解析
    pub fn parse(br: &mut BitReader, compressed: bool) -> DoviResult<Self> {
        let mut dm = Self {
            compressed,
            affected_dm_metadata_id: br.read_ue()?,
            current_dm_metadata_id: br.read_ue()?,
            scene_refresh_flag: br.read_ue()?,
            ..Self::default_pq()
        };

        if !compressed {
            for c in dm.ycc_to_rgb_coef.iter_mut() {
                *c = br.read_signed(16)? as i16;
            }
            for o in dm.ycc_to_rgb_offset.iter_mut() {
                *o = br.read_bits(32)? as u32;
            }
            for c in dm.rgb_to_lms_coef.iter_mut() {
                *c = br.read_signed(16)? as i16;
            }

            dm.signal_eotf = br.read_bits(16)? as u16;
            dm.signal_eotf_param0 = br.read_bits(16)? as u16;
            dm.signal_eotf_param1 = br.read_bits(16)? as u16;
            dm.signal_eotf_param2 = br.read_bits(32)? as u32;
            dm.signal_bit_depth = br.read_bits(5)? as u8;
            dm.signal_color_space = br.read_bits(2)? as u8;
            dm.signal_chroma_format = br.read_bits(2)? as u8;
            dm.signal_full_range_flag = br.read_bits(2)? as u8;
            dm.source_min_pq = br.read_bits(12)? as u16;
            dm.source_max_pq = br.read_bits(12)? as u16;
            dm.source_diagonal = br.read_bits(10)? as u16;
        }

        dm.cmv29_metadata = ExtBlockSection::parse(br, CmVersion::V29)?;
        if br.bits_left() >= 8 {
            dm.cmv40_metadata = Self::probe_cmv40(br);
        }

        Ok(dm)
    }

    /// 尝试解析 CM v4.0 段
    ///
    /// 解析失败或段后对齐位非零时视为 CRC 之前的尾随数据, 读取位置不变.
    fn probe_cmv40(br: &mut BitReader) -> Option<ExtBlockSection> {
        let mut probe = br.clone();
        match ExtBlockSection::parse(&mut probe, CmVersion::V40) {
            Ok(section) => {
                let mut check = probe.clone();
                if matches!(check.read_alignment_bits(), Ok(0)) {
                    *br = probe;
                    Some(section)
                } else {
                    warn!("DM: CM v4.0 段后对齐位非零, 按尾随数据保留");
                    None
                }
            }
            Err(err) => {
                warn!("DM: 无法解析 CM v4.0 段 ({}), 按尾随数据保留", err);
                None
            }
        }
    }

    /// 写入 DM 负载
    pub fn write(&self, bw: &mut BitWriter) -> DoviResult<()> {
        bw.write_ue(self.affected_dm_metadata_id);
        bw.write_ue(self.current_dm_metadata_id);
        bw.write_ue(self.scene_refresh_flag);

        if !self.compressed {
            for &c in &self.ycc_to_rgb_coef {
                bw.write_signed(i64::from(c), 16);
            }
            for &o in &self.ycc_to_rgb_offset {
                bw.write_bits(u64::from(o), 32);
            }
            for &c in &self.rgb_to_lms_coef {
                bw.write_signed(i64::from(c), 16);
            }

            bw.write_bits(u64::from(self.signal_eotf), 16);
            bw.write_bits(u64::from(self.signal_eotf_param0), 16);
            bw.write_bits(u64::from(self.signal_eotf_param1), 16);
            bw.write_bits(u64::from(self.signal_eotf_param2), 32);
            bw.write_bits(u64::from(self.signal_bit_depth), 5);
            bw.write_bits(u64::from(self.signal_color_space), 2);
            bw.write_bits(u64::from(self.signal_chroma_format), 2);
            bw.write_bits(u64::from(self.signal_full_range_flag), 2);
            bw.write_bits(u64::from(self.source_min_pq), 12);
            bw.write_bits(u64::from(self.source_max_pq), 12);
            bw.write_bits(u64::from(self.source_diagonal), 10);
        }

        if self.cmv29_metadata.version != CmVersion::V29 {
            return Err(DoviError::InvalidData("DM: cmv29 段版本错误".into()));
        }
        self.cmv29_metadata.write(bw)?;

        if let Some(cmv40) = &self.cmv40_metadata {
            if cmv40.version != CmVersion::V40 {
                return Err(DoviError::InvalidData("DM: cmv40 段版本错误".into()));
            }
            cmv40.write(bw)?;
        }

        Ok(())
    }

    /// 按出现顺序遍历两个段中的所有块
    pub fn blocks(&self) -> impl Iterator<Item = &ExtMetadataBlock> {
        self.cmv29_metadata
            .blocks()
            .chain(self.cmv40_metadata.iter().flat_map(ExtBlockSection::blocks))
    }

    /// 扩展块总数
    pub fn num_ext_blocks(&self) -> usize {
        self.cmv29_metadata.num_ext_blocks()
            + self
                .cmv40_metadata
                .as_ref()
                .map_or(0, ExtBlockSection::num_ext_blocks)
    }

    /// 按级别查找首个块
    pub fn get_block(&self, level: u8) -> Option<&ExtMetadataBlock> {
        self.blocks().find(|b| b.level() == level)
    }

    pub fn level1(&self) -> Option<&ExtMetadataBlockLevel1> {
        first_block!(self, Level1)
    }

    /// 所有 Level 2 trim, 按出现顺序
    pub fn level2(&self) -> impl Iterator<Item = &ExtMetadataBlockLevel2> {
        self.blocks().filter_map(|b| match b {
            ExtMetadataBlock::Level2(inner) => Some(inner),
            _ => None,
        })
    }

    pub fn level3(&self) -> Option<&ExtMetadataBlockLevel3> {
        first_block!(self, Level3)
    }

    pub fn level4(&self) -> Option<&ExtMetadataBlockLevel4> {
        first_block!(self, Level4)
    }

    pub fn level5(&self) -> Option<&ExtMetadataBlockLevel5> {
        first_block!(self, Level5)
    }

    pub fn level6(&self) -> Option<&ExtMetadataBlockLevel6> {
        first_block!(self, Level6)
    }

    /// 所有 Level 8 trim, 按出现顺序
    pub fn level8(&self) -> impl Iterator<Item = &ExtMetadataBlockLevel8> {
        self.blocks().filter_map(|b| match b {
            ExtMetadataBlock::Level8(inner) => Some(inner),
            _ => None,
        })
    }

    pub fn level9(&self) -> Option<&ExtMetadataBlockLevel9> {
        first_block!(self, Level9)
    }

    /// 所有 Level 10 目标显示器, 按出现顺序
    pub fn level10(&self) -> impl Iterator<Item = &ExtMetadataBlockLevel10> {
        self.blocks().filter_map(|b| match b {
            ExtMetadataBlock::Level10(inner) => Some(inner),
            _ => None,
        })
    }

    pub fn level11(&self) -> Option<&ExtMetadataBlockLevel11> {
        first_block!(self, Level11)
    }

    pub fn level254(&self) -> Option<&ExtMetadataBlockLevel254> {
        first_block!(self, Level254)
    }

    pub fn level255(&self) -> Option<&ExtMetadataBlockLevel255> {
        first_block!(self, Level255)
    }

    /// 追加一个块到其所属段的末尾, 必要时创建 v4.0 段
    pub fn push_block(&mut self, block: ExtMetadataBlock) -> DoviResult<()> {
        block.validate()?;
        let section = match block.cm_version() {
            CmVersion::V29 => &mut self.cmv29_metadata,
            CmVersion::V40 => self
                .cmv40_metadata
                .get_or_insert_with(|| ExtBlockSection::new(CmVersion::V40)),
        };
        section.records.push(ExtBlockRecord::new(block));
        Ok(())
    }

    /// 删除满足条件的块, 返回删除数量
    pub fn remove_blocks<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&ExtMetadataBlock) -> bool,
    {
        let mut removed = 0;
        let sections = std::iter::once(&mut self.cmv29_metadata).chain(self.cmv40_metadata.as_mut());
        for section in sections {
            let before = section.records.len();
            section.records.retain(|r| !pred(&r.block));
            removed += before - section.records.len();
        }
        removed
    }

    /// 插入或更新首个 Level 5 块
    pub fn upsert_level5(&mut self, level5: ExtMetadataBlockLevel5) {
        let existing = self
            .cmv29_metadata
            .records
            .iter_mut()
            .find(|r| matches!(r.block, ExtMetadataBlock::Level5(_)));

        match existing {
            Some(record) => record.block = ExtMetadataBlock::Level5(level5),
            None => self
                .cmv29_metadata
                .records
                .push(ExtBlockRecord::new(ExtMetadataBlock::Level5(level5))),
        }
    }
}
