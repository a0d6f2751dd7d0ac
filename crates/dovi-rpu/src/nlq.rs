//! 双层 profile (4 / 7) 的非线性量化 (NLQ) 参数.
//!
//! NLQ 的方法与预测 pivot 位于 mapping 中部, 逐分量参数则跟在三条整形曲线之后,
//! 因此解析被拆为两步, 由 [`RpuDataMapping`](crate::mapping::RpuDataMapping) 调度.

use dovi_core::{BitReader, BitWriter, DoviResult};

use crate::NUM_COMPONENTS;
use crate::header::RpuDataHeader;

/// 线性死区 (linear dead zone) 量化方法
pub const NLQ_METHOD_LINEAR_DEAD_ZONE: u8 = 0;

/// NLQ 负载
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpuDataNlq {
    /// nlq_method_idc (3 位)
    pub nlq_method_idc: u8,
    /// 固定为 0 (单区间)
    pub nlq_num_pivots_minus2: u8,
    /// NLQ 区间的两个预测 pivot
    pub nlq_pred_pivot_value: [u16; 2],

    /// 每分量增强层偏移 (el_bit_depth 位)
    pub nlq_offset: [u16; NUM_COMPONENTS],
    pub vdr_in_max_int: [u64; NUM_COMPONENTS],
    pub vdr_in_max: [u64; NUM_COMPONENTS],

    /// 以下四组仅在线性死区方法下存在
    pub linear_deadzone_slope_int: [u64; NUM_COMPONENTS],
    pub linear_deadzone_slope: [u64; NUM_COMPONENTS],
    pub linear_deadzone_threshold_int: [u64; NUM_COMPONENTS],
    pub linear_deadzone_threshold: [u64; NUM_COMPONENTS],
}

impl RpuDataNlq {
    /// MEL 的恒等 NLQ: 偏移为 0, vdr_in_max 为 1.0, 死区参数为 0
    pub fn mel_identity(bl_bit_depth: u32) -> Self {
        Self {
            nlq_method_idc: NLQ_METHOD_LINEAR_DEAD_ZONE,
            nlq_num_pivots_minus2: 0,
            nlq_pred_pivot_value: [0, ((1u32 << bl_bit_depth) - 1) as u16],
            vdr_in_max_int: [1; NUM_COMPONENTS],
            ..Default::default()
        }
    }

    /// 将参数重置为 MEL 恒等值, 保留方法与 pivot
    pub fn set_mel_identity(&mut self) {
        self.nlq_offset = [0; NUM_COMPONENTS];
        self.vdr_in_max_int = [1; NUM_COMPONENTS];
        self.vdr_in_max = [0; NUM_COMPONENTS];
        self.linear_deadzone_slope_int = [0; NUM_COMPONENTS];
        self.linear_deadzone_slope = [0; NUM_COMPONENTS];
        self.linear_deadzone_threshold_int = [0; NUM_COMPONENTS];
        self.linear_deadzone_threshold = [0; NUM_COMPONENTS];
    }

    /// 参数是否为 MEL 恒等值
    pub fn is_mel_identity(&self) -> bool {
        self.nlq_offset == [0; NUM_COMPONENTS]
            && self.vdr_in_max_int == [1; NUM_COMPONENTS]
            && self.vdr_in_max == [0; NUM_COMPONENTS]
            && self.linear_deadzone_slope_int == [0; NUM_COMPONENTS]
            && self.linear_deadzone_slope == [0; NUM_COMPONENTS]
            && self.linear_deadzone_threshold_int == [0; NUM_COMPONENTS]
            && self.linear_deadzone_threshold == [0; NUM_COMPONENTS]
    }

    /// 是否使用线性死区方法
    pub fn is_linear_dead_zone(&self) -> bool {
        self.nlq_method_idc == NLQ_METHOD_LINEAR_DEAD_ZONE
    }

    /// 读取 mapping 中部的 NLQ 方法与预测 pivot
    pub(crate) fn parse_method(br: &mut BitReader, header: &RpuDataHeader) -> DoviResult<Self> {
        let bl_bits = header.bl_bit_depth();
        let nlq_method_idc = br.read_bits(3)? as u8;
        let pivot0 = br.read_bits(bl_bits)? as u16;
        let pivot1 = br.read_bits(bl_bits)? as u16;

        Ok(Self {
            nlq_method_idc,
            nlq_pred_pivot_value: [pivot0, pivot1],
            ..Default::default()
        })
    }

    pub(crate) fn write_method(&self, bw: &mut BitWriter, header: &RpuDataHeader) {
        let bl_bits = header.bl_bit_depth();
        bw.write_bits(u64::from(self.nlq_method_idc), 3);
        for pivot in self.nlq_pred_pivot_value {
            bw.write_bits(u64::from(pivot), bl_bits);
        }
    }

    /// 读取曲线之后的逐分量参数
    pub(crate) fn parse_params(
        &mut self,
        br: &mut BitReader,
        header: &RpuDataHeader,
    ) -> DoviResult<()> {
        let el_bits = header.el_bit_depth();
        let coef_bits = header.coef_bit_len();
        let has_int = header.has_integer_coefs();

        for cmp in 0..NUM_COMPONENTS {
            self.nlq_offset[cmp] = br.read_bits(el_bits)? as u16;
            if has_int {
                self.vdr_in_max_int[cmp] = br.read_ue()?;
            }
            self.vdr_in_max[cmp] = br.read_bits(coef_bits)?;

            if self.is_linear_dead_zone() {
                if has_int {
                    self.linear_deadzone_slope_int[cmp] = br.read_ue()?;
                }
                self.linear_deadzone_slope[cmp] = br.read_bits(coef_bits)?;
                if has_int {
                    self.linear_deadzone_threshold_int[cmp] = br.read_ue()?;
                }
                self.linear_deadzone_threshold[cmp] = br.read_bits(coef_bits)?;
            }
        }

        Ok(())
    }

    pub(crate) fn write_params(&self, bw: &mut BitWriter, header: &RpuDataHeader) {
        let el_bits = header.el_bit_depth();
        let coef_bits = header.coef_bit_len();
        let has_int = header.has_integer_coefs();

        for cmp in 0..NUM_COMPONENTS {
            bw.write_bits(u64::from(self.nlq_offset[cmp]), el_bits);
            if has_int {
                bw.write_ue(self.vdr_in_max_int[cmp]);
            }
            bw.write_bits(self.vdr_in_max[cmp], coef_bits);

            if self.is_linear_dead_zone() {
                if has_int {
                    bw.write_ue(self.linear_deadzone_slope_int[cmp]);
                }
                bw.write_bits(self.linear_deadzone_slope[cmp], coef_bits);
                if has_int {
                    bw.write_ue(self.linear_deadzone_threshold_int[cmp]);
                }
                bw.write_bits(self.linear_deadzone_threshold[cmp], coef_bits);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p7_header() -> RpuDataHeader {
        RpuDataHeader {
            rpu_type: 2,
            rpu_format: 18,
            vdr_rpu_profile: 1,
            vdr_seq_info_present_flag: true,
            coefficient_log2_denom: 23,
            bl_bit_depth_minus8: 2,
            el_bit_depth_minus8: 2,
            vdr_bit_depth_minus8: 4,
            el_spatial_resampling_filter_flag: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_mel_identity() {
        let nlq = RpuDataNlq::mel_identity(10);
        assert_eq!(nlq.nlq_pred_pivot_value, [0, 1023]);
        assert!(nlq.is_mel_identity());
        assert!(nlq.is_linear_dead_zone());
    }

    #[test]
    fn test_fel_is_not_identity() {
        let mut nlq = RpuDataNlq::mel_identity(10);
        nlq.nlq_offset = [512, 512, 512];
        nlq.linear_deadzone_slope = [2048, 0, 0];
        assert!(!nlq.is_mel_identity());

        nlq.set_mel_identity();
        assert!(nlq.is_mel_identity());
        assert_eq!(nlq.nlq_pred_pivot_value, [0, 1023]);
    }

    #[test]
    fn test_nlq_params_roundtrip() {
        let header = p7_header();
        let mut nlq = RpuDataNlq::mel_identity(10);
        nlq.nlq_offset = [512, 511, 510];
        nlq.vdr_in_max = [0x7F_FFFF, 1, 2];
        nlq.linear_deadzone_slope_int = [0, 1, 2];
        nlq.linear_deadzone_threshold = [3, 4, 5];

        let mut bw = BitWriter::new();
        nlq.write_method(&mut bw, &header);
        nlq.write_params(&mut bw, &header);
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        let mut parsed = RpuDataNlq::parse_method(&mut br, &header).unwrap();
        parsed.parse_params(&mut br, &header).unwrap();
        assert_eq!(parsed, nlq);
    }
}
