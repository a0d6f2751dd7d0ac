//! 完整 RPU 解析树 (头部 + mapping + DM) 的解析与写回.
//!
//! 去除仿真防止字节后的 RPU 布局:
//!
//! ```text
//! 0x19 | header | [mapping] | [vdr_dm_data] | 对齐零位 | [尾随字节] | crc32 | 0x80
//! ```
//!
//! CRC32 (MPEG-2) 覆盖前缀之后, CRC 之前的所有字节. 输入末尾多余的 0x00 会被裁掉.

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult, crc32_mpeg2};
use log::{debug, warn};

use crate::framing::{av1, hevc};
use crate::header::{ElType, RpuDataHeader};
use crate::mapping::RpuDataMapping;
use crate::vdr_dm::VdrDmData;

/// RPU 负载前缀
pub const RPU_PREFIX: u8 = 0x19;

/// RBSP 尾部字节 (停止位 + 零填充)
pub const FINAL_BYTE: u8 = 0x80;

/// 前缀 + 最短头部 + CRC + 尾字节
const MIN_RPU_LEN: usize = 6;

/// 一个 Dolby Vision RPU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoviRpu {
    pub header: RpuDataHeader,
    /// use_prev_vdr_rpu_flag 为 false 时存在
    pub rpu_data_mapping: Option<RpuDataMapping>,
    /// vdr_dm_metadata_present_flag 为 true 时存在
    pub vdr_dm_data: Option<VdrDmData>,
    /// DM 之后, CRC 之前的未知数据, 原样保留
    pub trailing_bytes: Vec<u8>,
    /// 码流中记录的 CRC32, 写回时重新计算
    pub rpu_data_crc32: u32,
}

impl DoviRpu {
    /// 解析去除仿真防止字节, 以 0x19 开头的 RPU 负载
    pub fn parse_rpu(data: &[u8]) -> DoviResult<Self> {
        if data.len() < MIN_RPU_LEN {
            return Err(DoviError::TruncatedFrame(format!(
                "RPU: 长度 {} 不足 {} 字节",
                data.len(),
                MIN_RPU_LEN,
            )));
        }
        if data[0] != RPU_PREFIX {
            return Err(DoviError::InvalidPrefix(format!(
                "RPU: 前缀 0x{:02X} 不是 0x19",
                data[0],
            )));
        }

        // 裁掉末尾多余的 0x00
        let mut end = data.len();
        while end > 0 && data[end - 1] == 0 {
            end -= 1;
        }
        if end < MIN_RPU_LEN || data[end - 1] != FINAL_BYTE {
            return Err(DoviError::TruncatedFrame("RPU: 缺少 0x80 尾字节".into()));
        }

        let crc_pos = end - 5;
        let expected = u32::from_be_bytes([
            data[crc_pos],
            data[crc_pos + 1],
            data[crc_pos + 2],
            data[crc_pos + 3],
        ]);
        let payload = &data[1..crc_pos];
        let actual = crc32_mpeg2(payload);
        if expected != actual {
            return Err(DoviError::Crc32Mismatch { expected, actual });
        }

        let mut rpu = Self::parse_payload(payload)?;
        rpu.rpu_data_crc32 = expected;

        debug!(
            "RPU: profile={} el={:?} 扩展块={}",
            rpu.guessed_profile(),
            rpu.el_type(),
            rpu.vdr_dm_data.as_ref().map_or(0, VdrDmData::num_ext_blocks),
        );
        Ok(rpu)
    }

    /// 解析 CRC 之前的语法部分
    fn parse_payload(payload: &[u8]) -> DoviResult<Self> {
        let mut br = BitReader::new(payload);
        let header = RpuDataHeader::parse(&mut br)?;

        let rpu_data_mapping = if header.use_prev_vdr_rpu_flag {
            None
        } else {
            Some(RpuDataMapping::parse(&mut br, &header)?)
        };

        let vdr_dm_data = if header.vdr_dm_metadata_present_flag {
            Some(VdrDmData::parse(&mut br, header.dm_compressed())?)
        } else {
            None
        };

        if br.read_alignment_bits()? != 0 {
            return Err(DoviError::InvalidData(
                "RPU: rpu_alignment_zero_bit 非零".into(),
            ));
        }

        let trailing_bytes = br.read_bytes(br.bits_left() / 8)?.to_vec();
        if !trailing_bytes.is_empty() {
            warn!("RPU: CRC 之前有 {} 字节未知数据", trailing_bytes.len());
        }

        Ok(Self {
            header,
            rpu_data_mapping,
            vdr_dm_data,
            trailing_bytes,
            rpu_data_crc32: 0,
        })
    }

    /// 解析 HEVC UNSPEC62 NAL (可带 Annex-B 起始码, 必须带 0x7C01 头)
    pub fn parse_unspec62_nalu(data: &[u8]) -> DoviResult<Self> {
        let rpu = hevc::unwrap_unspec62_nalu(data)?;
        Self::parse_rpu(&rpu)
    }

    /// 解析 AV1 ITU-T T.35 负载 (可带或不带 0xB5 国家码)
    pub fn parse_av1_t35_payload(data: &[u8]) -> DoviResult<Self> {
        let rpu = av1::unwrap_t35_payload(data)?;
        Self::parse_rpu(&rpu)
    }

    /// 解析完整的 AV1 metadata OBU
    pub fn parse_av1_t35_obu(data: &[u8]) -> DoviResult<Self> {
        let payload = av1::unwrap_metadata_obu(data)?;
        Self::parse_av1_t35_payload(payload)
    }

    /// 检查解析树各部分与头部标志一致
    pub fn validate(&self) -> DoviResult<()> {
        self.header.validate()?;

        match (&self.rpu_data_mapping, self.header.use_prev_vdr_rpu_flag) {
            (Some(mapping), false) => mapping.validate(&self.header)?,
            (None, true) => {}
            (Some(_), true) => {
                return Err(DoviError::InvalidData(
                    "RPU: use_prev_vdr_rpu_flag 置位但存在 mapping".into(),
                ));
            }
            (None, false) => {
                return Err(DoviError::InvalidData("RPU: 缺少 mapping".into()));
            }
        }

        match (&self.vdr_dm_data, self.header.vdr_dm_metadata_present_flag) {
            (Some(dm), true) if dm.compressed != self.header.dm_compressed() => {
                Err(DoviError::InvalidData(
                    "RPU: DM 压缩标志与头部保留位不一致".into(),
                ))
            }
            (Some(_), true) | (None, false) => Ok(()),
            (Some(_), false) => Err(DoviError::InvalidData(
                "RPU: 存在 DM 数据但头部未声明".into(),
            )),
            (None, true) => Err(DoviError::InvalidData("RPU: 缺少 DM 数据".into())),
        }
    }

    /// 写出去除仿真防止字节, 以 0x19 开头的 RPU 负载
    pub fn write_rpu(&self) -> DoviResult<Vec<u8>> {
        self.validate()?;

        let mut bw = BitWriter::with_capacity(512);
        bw.write_bits(u64::from(RPU_PREFIX), 8);
        self.header.write(&mut bw)?;

        if let Some(mapping) = &self.rpu_data_mapping {
            mapping.write(&mut bw, &self.header)?;
        }
        if let Some(dm) = &self.vdr_dm_data {
            dm.write(&mut bw)?;
        }

        bw.align_to_byte();
        bw.write_bytes(&self.trailing_bytes);

        let crc = crc32_mpeg2(&bw.data()[1..]);
        bw.write_bits(u64::from(crc), 32);

        Ok(bw.finish_rbsp())
    }

    /// 写出 HEVC UNSPEC62 NAL (0x7C01 头, 含仿真防止字节, 不含起始码)
    pub fn write_unspec62_nalu(&self) -> DoviResult<Vec<u8>> {
        Ok(hevc::wrap_unspec62_nalu(&self.write_rpu()?))
    }

    /// 写出 AV1 itu_t_t35_payload_bytes (从 provider_code 开始, 不含国家码)
    pub fn write_av1_t35_payload(&self) -> DoviResult<Vec<u8>> {
        av1::wrap_t35_payload(&self.write_rpu()?)
    }

    /// 写出完整的 AV1 metadata_itut_t35 OBU (含 0xB5 国家码)
    pub fn write_av1_t35_obu(&self) -> DoviResult<Vec<u8>> {
        Ok(av1::wrap_metadata_obu(&self.write_av1_t35_payload()?))
    }

    /// 推测的 Dolby Vision profile
    pub fn guessed_profile(&self) -> u8 {
        self.header.guessed_profile()
    }

    /// profile 7 的增强层类型
    pub fn el_type(&self) -> Option<ElType> {
        if self.guessed_profile() != 7 {
            return None;
        }
        let nlq = self.rpu_data_mapping.as_ref()?.nlq.as_ref()?;
        Some(if nlq.is_mel_identity() {
            ElType::Mel
        } else {
            ElType::Fel
        })
    }
}
