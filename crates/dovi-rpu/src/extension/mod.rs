//! 扩展元数据块 (ext_metadata_block) 集合.
//!
//! DM 负载中有两个扩展块段:
//! - CM v2.9 段: 级别 1, 2, 4, 5, 6, 255, 始终存在
//! - CM v4.0 段: 级别 3, 8, 9, 10, 11, 254, 仅在 v2.9 段之后仍有数据时存在
//!
//! 每个块记录按出现顺序保存 (包括重复的单例级别), 以保证逐位写回.
//! 单例级别的查询返回首次出现的块.

pub mod levels;

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult};
use log::{trace, warn};

pub use levels::*;

/// 扩展块段版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmVersion {
    /// Content Mapping v2.9
    V29,
    /// Content Mapping v4.0
    V40,
}

impl CmVersion {
    /// 段内允许的级别
    pub fn allowed_levels(&self) -> &'static [u8] {
        match self {
            Self::V29 => &[1, 2, 4, 5, 6, 255],
            Self::V40 => &[3, 8, 9, 10, 11, 254],
        }
    }

    /// 级别所属的段
    pub fn for_level(level: u8) -> Option<Self> {
        if Self::V29.allowed_levels().contains(&level) {
            Some(Self::V29)
        } else if Self::V40.allowed_levels().contains(&level) {
            Some(Self::V40)
        } else {
            None
        }
    }
}

/// 扩展元数据块, 以级别区分
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtMetadataBlock {
    Level1(ExtMetadataBlockLevel1),
    Level2(ExtMetadataBlockLevel2),
    Level3(ExtMetadataBlockLevel3),
    Level4(ExtMetadataBlockLevel4),
    Level5(ExtMetadataBlockLevel5),
    Level6(ExtMetadataBlockLevel6),
    Level8(ExtMetadataBlockLevel8),
    Level9(ExtMetadataBlockLevel9),
    Level10(ExtMetadataBlockLevel10),
    Level11(ExtMetadataBlockLevel11),
    Level254(ExtMetadataBlockLevel254),
    Level255(ExtMetadataBlockLevel255),
}

/// 对每个变体执行同一表达式
macro_rules! with_block {
    ($block:expr, $b:ident => $body:expr) => {
        match $block {
            ExtMetadataBlock::Level1($b) => $body,
            ExtMetadataBlock::Level2($b) => $body,
            ExtMetadataBlock::Level3($b) => $body,
            ExtMetadataBlock::Level4($b) => $body,
            ExtMetadataBlock::Level5($b) => $body,
            ExtMetadataBlock::Level6($b) => $body,
            ExtMetadataBlock::Level8($b) => $body,
            ExtMetadataBlock::Level9($b) => $body,
            ExtMetadataBlock::Level10($b) => $body,
            ExtMetadataBlock::Level11($b) => $body,
            ExtMetadataBlock::Level254($b) => $body,
            ExtMetadataBlock::Level255($b) => $body,
        }
    };
}

/// 读取指定级别的负载
fn parse_payload<T: ExtBlockPayload>(br: &mut BitReader, length: u64) -> DoviResult<T> {
    if !T::VALID_LENGTHS.contains(&length) {
        return Err(DoviError::InvalidExtBlockLength {
            level: T::LEVEL,
            length,
        });
    }
    T::parse(br, length)
}

fn level_of<T: ExtBlockPayload>(_: &T) -> u8 {
    T::LEVEL
}

fn valid_lengths_of<T: ExtBlockPayload>(_: &T) -> &'static [u64] {
    T::VALID_LENGTHS
}

impl ExtMetadataBlock {
    /// 级别编号
    pub fn level(&self) -> u8 {
        with_block!(self, b => level_of(b))
    }

    /// ext_block_length (字节)
    pub fn length(&self) -> u64 {
        with_block!(self, b => b.length())
    }

    /// 字段实际占用的位数
    pub fn payload_bits(&self) -> u64 {
        with_block!(self, b => b.payload_bits())
    }

    /// 级别是否允许在一个 RPU 中出现多次
    pub fn is_list_level(&self) -> bool {
        matches!(self.level(), 2 | 8 | 10)
    }

    /// 逐场景变化的动态块 (1, 2, 3, 4, 8)
    pub fn is_dynamic(&self) -> bool {
        matches!(self.level(), 1 | 2 | 3 | 4 | 8)
    }

    /// 块所属的段
    pub fn cm_version(&self) -> CmVersion {
        if CmVersion::V29.allowed_levels().contains(&self.level()) {
            CmVersion::V29
        } else {
            CmVersion::V40
        }
    }

    /// 检查长度合法
    pub fn validate(&self) -> DoviResult<()> {
        let length = self.length();
        if !with_block!(self, b => valid_lengths_of(b)).contains(&length) {
            return Err(DoviError::InvalidExtBlockLength {
                level: self.level(),
                length,
            });
        }
        Ok(())
    }

    fn parse_level(br: &mut BitReader, level: u8, length: u64) -> DoviResult<Self> {
        Ok(match level {
            1 => Self::Level1(parse_payload(br, length)?),
            2 => Self::Level2(parse_payload(br, length)?),
            3 => Self::Level3(parse_payload(br, length)?),
            4 => Self::Level4(parse_payload(br, length)?),
            5 => Self::Level5(parse_payload(br, length)?),
            6 => Self::Level6(parse_payload(br, length)?),
            8 => Self::Level8(parse_payload(br, length)?),
            9 => Self::Level9(parse_payload(br, length)?),
            10 => Self::Level10(parse_payload(br, length)?),
            11 => Self::Level11(parse_payload(br, length)?),
            254 => Self::Level254(parse_payload(br, length)?),
            255 => Self::Level255(parse_payload(br, length)?),
            _ => return Err(DoviError::InvalidExtBlockLevel(level)),
        })
    }

    fn write_payload(&self, bw: &mut BitWriter) {
        with_block!(self, b => b.write(bw))
    }
}

/// 一个扩展块及其尾部对齐位
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtBlockRecord {
    pub block: ExtMetadataBlock,
    /// ext_dm_alignment 位的原始值 (位数为 length * 8 - payload_bits)
    pub alignment_bits: u8,
}

impl ExtBlockRecord {
    /// 以全零对齐位包装块
    pub fn new(block: ExtMetadataBlock) -> Self {
        Self {
            block,
            alignment_bits: 0,
        }
    }

    fn alignment_len(&self) -> u32 {
        (self.block.length() * 8).saturating_sub(self.block.payload_bits()) as u32
    }

    fn parse(br: &mut BitReader, section: CmVersion) -> DoviResult<Self> {
        let length = br.read_ue()?;
        let level = br.read_bits(8)? as u8;

        if !section.allowed_levels().contains(&level) {
            return Err(DoviError::InvalidExtBlockLevel(level));
        }

        let start = br.bits_read();
        let block = ExtMetadataBlock::parse_level(br, level, length)?;
        let used = (br.bits_read() - start) as u64;
        let remaining = length * 8 - used;
        let alignment_bits = br.read_bits(remaining as u32)? as u8;

        trace!("扩展块: level={} length={} 对齐位={}", level, length, remaining);
        Ok(Self {
            block,
            alignment_bits,
        })
    }

    fn write(&self, bw: &mut BitWriter) -> DoviResult<()> {
        self.block.validate()?;
        bw.write_ue(self.block.length());
        bw.write_bits(u64::from(self.block.level()), 8);
        self.block.write_payload(bw);
        bw.write_bits(u64::from(self.alignment_bits), self.alignment_len());
        Ok(())
    }
}

/// 一个 CM 段内的扩展块列表
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtBlockSection {
    pub version: CmVersion,
    pub records: Vec<ExtBlockRecord>,
}

impl ExtBlockSection {
    /// 创建空段
    pub fn new(version: CmVersion) -> Self {
        Self {
            version,
            records: Vec::new(),
        }
    }

    /// num_ext_blocks
    pub fn num_ext_blocks(&self) -> usize {
        self.records.len()
    }

    /// 段内所有块
    pub fn blocks(&self) -> impl Iterator<Item = &ExtMetadataBlock> {
        self.records.iter().map(|r| &r.block)
    }

    /// 从比特流解析一个段
    pub fn parse(br: &mut BitReader, version: CmVersion) -> DoviResult<Self> {
        let num_ext_blocks = br.read_ue()?;
        let mut section = Self::new(version);

        if num_ext_blocks > 0 {
            if br.read_alignment_bits()? != 0 {
                return Err(DoviError::InvalidData(
                    "扩展块: dm_alignment_zero_bit 非零".into(),
                ));
            }

            // 每个块至少 2 字节, 避免被伪造的数量撑大预分配
            let cap = (num_ext_blocks as usize).min(br.bits_left() / 16);
            section.records.reserve(cap);

            for _ in 0..num_ext_blocks {
                let record = ExtBlockRecord::parse(br, version)?;
                let level = record.block.level();
                if !record.block.is_list_level() && section.blocks().any(|b| b.level() == level)
                {
                    warn!("扩展块: 单例级别 {} 重复出现, 仅首个生效", level);
                }
                section.records.push(record);
            }
        }

        Ok(section)
    }

    /// 写入段
    pub fn write(&self, bw: &mut BitWriter) -> DoviResult<()> {
        bw.write_ue(self.records.len() as u64);

        if !self.records.is_empty() {
            bw.align_to_byte();
            for record in &self.records {
                if record.block.cm_version() != self.version {
                    return Err(DoviError::InvalidExtBlockLevel(record.block.level()));
                }
                record.write(bw)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_roundtrip_with_alignment_bits() {
        let mut section = ExtBlockSection::new(CmVersion::V29);
        section.records.push(ExtBlockRecord {
            block: ExtMetadataBlock::Level1(ExtMetadataBlockLevel1 {
                min_pq: 0,
                max_pq: 2081,
                avg_pq: 819,
            }),
            alignment_bits: 0b1010,
        });
        section
            .records
            .push(ExtBlockRecord::new(ExtMetadataBlock::Level5(
                ExtMetadataBlockLevel5::from_offsets(0, 0, 280, 280),
            )));

        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        section.write(&mut bw).unwrap();
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        br.read_bits(3).unwrap();
        let parsed = ExtBlockSection::parse(&mut br, CmVersion::V29).unwrap();
        assert_eq!(parsed, section);
        assert_eq!(parsed.num_ext_blocks(), 2);
    }

    #[test]
    fn test_level_in_wrong_section() {
        let mut bw = BitWriter::new();
        bw.write_ue(1);
        bw.align_to_byte();
        bw.write_ue(5);
        bw.write_bits(3, 8); // L3 出现在 v2.9 段
        bw.write_bits(0, 40);
        let data = bw.finish();

        let err = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V29).unwrap_err();
        assert!(matches!(err, DoviError::InvalidExtBlockLevel(3)));
    }

    #[test]
    fn test_unknown_level() {
        let mut bw = BitWriter::new();
        bw.write_ue(1);
        bw.align_to_byte();
        bw.write_ue(2);
        bw.write_bits(7, 8);
        bw.write_bits(0, 16);
        let data = bw.finish();

        let err = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V40).unwrap_err();
        assert!(matches!(err, DoviError::InvalidExtBlockLevel(7)));
    }

    #[test]
    fn test_invalid_level8_length() {
        let mut bw = BitWriter::new();
        bw.write_ue(1);
        bw.align_to_byte();
        bw.write_ue(11);
        bw.write_bits(8, 8);
        bw.write_bits(0, 64);
        bw.write_bits(0, 64);
        let data = bw.finish();

        let err = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V40).unwrap_err();
        assert!(matches!(
            err,
            DoviError::InvalidExtBlockLength {
                level: 8,
                length: 11
            }
        ));
    }

    #[test]
    fn test_fixed_length_must_be_exact() {
        let mut bw = BitWriter::new();
        bw.write_ue(1);
        bw.align_to_byte();
        bw.write_ue(6);
        bw.write_bits(1, 8);
        bw.write_bits(0, 48);
        let data = bw.finish();

        let err = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V29).unwrap_err();
        assert!(matches!(err, DoviError::InvalidExtBlockLength { level: 1, .. }));
    }

    #[test]
    fn test_nonzero_dm_alignment_rejected() {
        let mut bw = BitWriter::new();
        bw.write_ue(1); // "010"
        bw.write_bits(0b11111, 5);
        bw.write_bits(0, 64);
        let data = bw.finish();

        let err = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V29).unwrap_err();
        assert!(matches!(err, DoviError::InvalidData(_)));
    }

    #[test]
    fn test_duplicate_singleton_preserved() {
        let mut section = ExtBlockSection::new(CmVersion::V29);
        for max_pq in [100, 200] {
            section
                .records
                .push(ExtBlockRecord::new(ExtMetadataBlock::Level1(
                    ExtMetadataBlockLevel1 {
                        max_pq,
                        ..Default::default()
                    },
                )));
        }
        let mut bw = BitWriter::new();
        section.write(&mut bw).unwrap();
        let data = bw.finish();

        let parsed = ExtBlockSection::parse(&mut BitReader::new(&data), CmVersion::V29).unwrap();
        assert_eq!(parsed.num_ext_blocks(), 2);
        assert_eq!(parsed, section);
    }

    #[test]
    fn test_write_rejects_block_in_wrong_section() {
        let mut section = ExtBlockSection::new(CmVersion::V29);
        section
            .records
            .push(ExtBlockRecord::new(ExtMetadataBlock::Level11(
                ExtMetadataBlockLevel11::default(),
            )));
        let mut bw = BitWriter::new();
        assert!(matches!(
            section.write(&mut bw),
            Err(DoviError::InvalidExtBlockLevel(11))
        ));
    }

    #[test]
    fn test_block_classification() {
        let l8 = ExtMetadataBlock::Level8(ExtMetadataBlockLevel8::default());
        assert!(l8.is_list_level());
        assert!(l8.is_dynamic());
        assert_eq!(l8.cm_version(), CmVersion::V40);

        let l6 = ExtMetadataBlock::Level6(ExtMetadataBlockLevel6::default());
        assert!(!l6.is_list_level());
        assert!(!l6.is_dynamic());
        assert_eq!(CmVersion::for_level(6), Some(CmVersion::V29));
        assert_eq!(CmVersion::for_level(7), None);
    }
}
