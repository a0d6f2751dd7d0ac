//! 预置 RPU: 最小可用的 profile 8.1 解析树.

use crate::extension::{
    CmVersion, ExtBlockRecord, ExtBlockSection, ExtMetadataBlock, ExtMetadataBlockLevel254,
    ExtMetadataBlockLevel5, ExtMetadataBlockLevel6,
};
use crate::header::{RPU_TYPE_DOVI, RpuDataHeader};
use crate::mapping::RpuDataMapping;
use crate::rpu::DoviRpu;
use crate::vdr_dm::VdrDmData;

impl RpuDataHeader {
    /// profile 8 头部: 10 位基础层, 12 位 VDR, 无残差
    pub fn profile8_default() -> Self {
        Self {
            rpu_type: RPU_TYPE_DOVI,
            rpu_format: 18,
            vdr_rpu_profile: 1,
            vdr_rpu_level: 0,
            vdr_seq_info_present_flag: true,
            coefficient_data_type: 0,
            coefficient_log2_denom: 23,
            vdr_rpu_normalized_idc: 1,
            bl_bit_depth_minus8: 2,
            el_bit_depth_minus8: 2,
            vdr_bit_depth_minus8: 4,
            disable_residual_flag: true,
            vdr_dm_metadata_present_flag: true,
            ..Default::default()
        }
    }
}

impl DoviRpu {
    /// 恒等 mapping, PQ 参考 DM, L5 零偏移, L6 1000 nit 母版与 1000/400 CLL/FALL
    pub fn profile81_default() -> Self {
        let header = RpuDataHeader::profile8_default();
        let mapping = RpuDataMapping::identity(header.bl_bit_depth());

        let mut dm = VdrDmData::default_pq();
        dm.cmv29_metadata.records = vec![
            ExtBlockRecord::new(ExtMetadataBlock::Level5(ExtMetadataBlockLevel5::default())),
            ExtBlockRecord::new(ExtMetadataBlock::Level6(ExtMetadataBlockLevel6 {
                max_display_mastering_luminance: 1000,
                min_display_mastering_luminance: 1,
                max_content_light_level: 1000,
                max_frame_average_light_level: 400,
            })),
        ];
        let mut cmv40 = ExtBlockSection::new(CmVersion::V40);
        cmv40.records.push(ExtBlockRecord::new(ExtMetadataBlock::Level254(
            ExtMetadataBlockLevel254 {
                dm_mode: 0,
                dm_version_index: 2,
            },
        )));
        dm.cmv40_metadata = Some(cmv40);

        Self {
            header,
            rpu_data_mapping: Some(mapping),
            vdr_dm_data: Some(dm),
            trailing_bytes: Vec::new(),
            rpu_data_crc32: 0,
        }
    }
}
