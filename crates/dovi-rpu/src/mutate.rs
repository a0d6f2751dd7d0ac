//! 解析树的原地修改: 活动区域偏移与 mapping 移除.

use dovi_core::{DoviError, DoviResult};
use log::debug;

use crate::extension::ExtMetadataBlockLevel5;
use crate::rpu::DoviRpu;

impl DoviRpu {
    /// 设置 Level 5 活动区域偏移, 不存在时创建
    ///
    /// 每个偏移必须能用 13 位表示. 其他扩展块不受影响.
    pub fn set_active_area_offsets(
        &mut self,
        left: u16,
        right: u16,
        top: u16,
        bottom: u16,
    ) -> DoviResult<()> {
        let level5 = ExtMetadataBlockLevel5::from_offsets(left, right, top, bottom);
        if let Some(max) = level5
            .offsets()
            .into_iter()
            .find(|&o| o > ExtMetadataBlockLevel5::MAX_OFFSET)
        {
            return Err(DoviError::InvalidArgument(format!(
                "活动区域偏移 {max} 超过 {}",
                ExtMetadataBlockLevel5::MAX_OFFSET,
            )));
        }

        let dm = self
            .vdr_dm_data
            .as_mut()
            .ok_or_else(|| DoviError::InvalidData("RPU 不含 DM 数据, 无法设置 L5".into()))?;
        dm.upsert_level5(level5);
        Ok(())
    }

    /// 将三条曲线重写为恒等映射并移除 NLQ, 同时关闭增强层标志
    ///
    /// 幂等. 没有 mapping 时不做任何修改. 头部非法 (如基础层位深越界)
    /// 时返回错误, 解析树保持不变.
    pub fn remove_mapping(&mut self) -> DoviResult<()> {
        self.header.validate()?;
        let bl_bit_depth = self.header.bl_bit_depth();
        let Some(mapping) = self.rpu_data_mapping.as_mut() else {
            debug!("remove_mapping: use_prev_vdr_rpu_flag 置位, 跳过");
            return Ok(());
        };
        mapping.set_identity_curves(bl_bit_depth);
        self.header.el_spatial_resampling_filter_flag = false;
        self.header.disable_residual_flag = true;
        Ok(())
    }
}
