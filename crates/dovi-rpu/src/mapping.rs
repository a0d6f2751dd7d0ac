//! 整形曲线 (rpu_data_mapping) 解析与写回.
//!
//! 每个颜色分量 (Y, Cb, Cr) 对应一条分段曲线, 每段为多项式或 MMR 预测.
//! 语法顺序:
//! - 头部 id 与三条曲线的 pivot
//! - NLQ 方法与预测 pivot (若存在)
//! - 分区数 (仅支持 1x1)
//! - 三条曲线的分段负载
//! - NLQ 逐分量参数 (若存在)

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult};
use log::trace;

use crate::NUM_COMPONENTS;
use crate::header::RpuDataHeader;
use crate::nlq::RpuDataNlq;

/// num_pivots_minus2 的上限
pub const MAX_PIVOTS_MINUS2: u64 = 7;

/// mapping_idc: 多项式
pub const MAPPING_IDC_POLYNOMIAL: u64 = 0;
/// mapping_idc: 多元多重回归
pub const MAPPING_IDC_MMR: u64 = 1;

/// 多项式阶数 minus1 的上限 (二次)
const MAX_POLY_ORDER_MINUS1: u64 = 1;
/// MMR 阶数 minus1 的上限 (三阶)
const MAX_MMR_ORDER_MINUS1: u64 = 2;
/// 每阶 MMR 系数个数
pub const MMR_COEFS_PER_ORDER: usize = 7;

/// 多项式分段
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolynomialPiece {
    /// 0 = 一次, 1 = 二次
    pub poly_order_minus1: u8,
    /// 仅在一次多项式时编码
    pub linear_interp_flag: bool,
    /// 系数整数部分, 长度为 poly_order_minus1 + 2
    pub poly_coef_int: Vec<i64>,
    /// 系数分数部分
    pub poly_coef: Vec<u64>,
}

impl PolynomialPiece {
    /// 恒等映射 y = x
    pub fn identity() -> Self {
        Self {
            poly_order_minus1: 0,
            linear_interp_flag: false,
            poly_coef_int: vec![0, 1],
            poly_coef: vec![0, 0],
        }
    }

    fn parse(br: &mut BitReader, header: &RpuDataHeader) -> DoviResult<Self> {
        let order_minus1 = br.read_ue()?;
        if order_minus1 > MAX_POLY_ORDER_MINUS1 {
            return Err(DoviError::InvalidData(format!(
                "mapping: poly_order_minus1={} 超出范围",
                order_minus1,
            )));
        }

        let mut piece = Self {
            poly_order_minus1: order_minus1 as u8,
            ..Default::default()
        };
        if order_minus1 == 0 {
            piece.linear_interp_flag = br.read_flag()?;
            if piece.linear_interp_flag {
                return Err(DoviError::InvalidData(
                    "mapping: 不支持线性插值分段".into(),
                ));
            }
        }

        let coef_bits = header.coef_bit_len();
        let count = order_minus1 as usize + 2;
        piece.poly_coef_int = Vec::with_capacity(count);
        piece.poly_coef = Vec::with_capacity(count);
        for _ in 0..count {
            let int = if header.has_integer_coefs() {
                br.read_se()?
            } else {
                0
            };
            piece.poly_coef_int.push(int);
            piece.poly_coef.push(br.read_bits(coef_bits)?);
        }

        Ok(piece)
    }

    fn write(&self, bw: &mut BitWriter, header: &RpuDataHeader) -> DoviResult<()> {
        let count = self.poly_order_minus1 as usize + 2;
        if u64::from(self.poly_order_minus1) > MAX_POLY_ORDER_MINUS1
            || self.poly_coef_int.len() != count
            || self.poly_coef.len() != count
        {
            return Err(DoviError::InvalidData(format!(
                "mapping: 多项式阶数 {} 与系数个数不一致",
                self.poly_order_minus1,
            )));
        }

        bw.write_ue(u64::from(self.poly_order_minus1));
        if self.poly_order_minus1 == 0 {
            bw.write_flag(self.linear_interp_flag);
        }

        let coef_bits = header.coef_bit_len();
        for (&int, &frac) in self.poly_coef_int.iter().zip(&self.poly_coef) {
            if header.has_integer_coefs() {
                bw.write_se(int);
            }
            bw.write_bits(frac, coef_bits);
        }
        Ok(())
    }
}

/// MMR 分段
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MmrPiece {
    /// 0..=2, 对应 1..=3 阶
    pub mmr_order_minus1: u8,
    pub mmr_constant_int: i64,
    pub mmr_constant: u64,
    /// 每阶一行, 每行 7 个系数
    pub mmr_coef_int: Vec<[i64; MMR_COEFS_PER_ORDER]>,
    pub mmr_coef: Vec<[u64; MMR_COEFS_PER_ORDER]>,
}

impl MmrPiece {
    fn parse(br: &mut BitReader, header: &RpuDataHeader) -> DoviResult<Self> {
        let order_minus1 = br.read_bits(2)?;
        if order_minus1 > MAX_MMR_ORDER_MINUS1 {
            return Err(DoviError::InvalidData(format!(
                "mapping: mmr_order_minus1={} 超出范围",
                order_minus1,
            )));
        }

        let coef_bits = header.coef_bit_len();
        let has_int = header.has_integer_coefs();

        let mut piece = Self {
            mmr_order_minus1: order_minus1 as u8,
            ..Default::default()
        };
        if has_int {
            piece.mmr_constant_int = br.read_se()?;
        }
        piece.mmr_constant = br.read_bits(coef_bits)?;

        for _ in 0..=order_minus1 {
            let mut ints = [0i64; MMR_COEFS_PER_ORDER];
            let mut fracs = [0u64; MMR_COEFS_PER_ORDER];
            for j in 0..MMR_COEFS_PER_ORDER {
                if has_int {
                    ints[j] = br.read_se()?;
                }
                fracs[j] = br.read_bits(coef_bits)?;
            }
            piece.mmr_coef_int.push(ints);
            piece.mmr_coef.push(fracs);
        }

        Ok(piece)
    }

    fn write(&self, bw: &mut BitWriter, header: &RpuDataHeader) -> DoviResult<()> {
        let rows = self.mmr_order_minus1 as usize + 1;
        if u64::from(self.mmr_order_minus1) > MAX_MMR_ORDER_MINUS1
            || self.mmr_coef_int.len() != rows
            || self.mmr_coef.len() != rows
        {
            return Err(DoviError::InvalidData(format!(
                "mapping: MMR 阶数 {} 与系数矩阵不一致",
                self.mmr_order_minus1,
            )));
        }

        let coef_bits = header.coef_bit_len();
        let has_int = header.has_integer_coefs();

        bw.write_bits(u64::from(self.mmr_order_minus1), 2);
        if has_int {
            bw.write_se(self.mmr_constant_int);
        }
        bw.write_bits(self.mmr_constant, coef_bits);

        for (ints, fracs) in self.mmr_coef_int.iter().zip(&self.mmr_coef) {
            for j in 0..MMR_COEFS_PER_ORDER {
                if has_int {
                    bw.write_se(ints[j]);
                }
                bw.write_bits(fracs[j], coef_bits);
            }
        }
        Ok(())
    }
}

/// 曲线负载, 由 mapping_idc 选择
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CurvePayload {
    /// mapping_idc = 0
    Polynomial(Vec<PolynomialPiece>),
    /// mapping_idc = 1
    Mmr(Vec<MmrPiece>),
}

impl CurvePayload {
    /// 分段数量
    pub fn num_pieces(&self) -> usize {
        match self {
            Self::Polynomial(pieces) => pieces.len(),
            Self::Mmr(pieces) => pieces.len(),
        }
    }
}

/// 单个分量的整形曲线
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReshapingCurve {
    /// pivot 数量 minus2, 取值 0..=7
    pub num_pivots_minus2: u8,
    /// 按码流记录的 pivot: 首个为绝对值, 其余为增量
    pub pred_pivot_value: Vec<u16>,
    pub payload: CurvePayload,
}

impl ReshapingCurve {
    /// 覆盖整个基础层范围的单段恒等多项式曲线
    pub fn identity(bl_bit_depth: u32) -> Self {
        Self {
            num_pivots_minus2: 0,
            pred_pivot_value: vec![0, ((1u32 << bl_bit_depth) - 1) as u16],
            payload: CurvePayload::Polynomial(vec![PolynomialPiece::identity()]),
        }
    }

    /// 曲线的 mapping_idc
    pub fn mapping_idc(&self) -> u64 {
        match self.payload {
            CurvePayload::Polynomial(_) => MAPPING_IDC_POLYNOMIAL,
            CurvePayload::Mmr(_) => MAPPING_IDC_MMR,
        }
    }

    /// pivot 数量
    pub fn num_pivots(&self) -> usize {
        self.num_pivots_minus2 as usize + 2
    }

    /// 累加得到的绝对 pivot 值
    pub fn absolute_pivots(&self) -> Vec<u32> {
        self.pred_pivot_value
            .iter()
            .scan(0u32, |acc, &v| {
                *acc += u32::from(v);
                Some(*acc)
            })
            .collect()
    }

    /// 是否为单段恒等多项式
    pub fn is_identity(&self) -> bool {
        self.num_pivots_minus2 == 0
            && matches!(
                &self.payload,
                CurvePayload::Polynomial(pieces)
                    if pieces.len() == 1 && pieces[0] == PolynomialPiece::identity()
            )
    }

    /// 检查 pivot 与分段数量一致
    pub fn validate(&self) -> DoviResult<()> {
        if u64::from(self.num_pivots_minus2) > MAX_PIVOTS_MINUS2 {
            return Err(DoviError::InvalidPivotCount(u64::from(self.num_pivots_minus2)));
        }
        if self.pred_pivot_value.len() != self.num_pivots() {
            return Err(DoviError::InvalidData(format!(
                "mapping: pivot 数量 {} 与 num_pivots_minus2={} 不一致",
                self.pred_pivot_value.len(),
                self.num_pivots_minus2,
            )));
        }
        if self.payload.num_pieces() != self.num_pivots() - 1 {
            return Err(DoviError::InvalidData(format!(
                "mapping: 分段数量 {} 与 pivot 数量 {} 不匹配",
                self.payload.num_pieces(),
                self.num_pivots(),
            )));
        }
        Ok(())
    }

    fn parse_pivots(br: &mut BitReader, bl_bits: u32) -> DoviResult<(u8, Vec<u16>)> {
        let num_pivots_minus2 = br.read_ue()?;
        if num_pivots_minus2 > MAX_PIVOTS_MINUS2 {
            return Err(DoviError::InvalidPivotCount(num_pivots_minus2));
        }

        let count = num_pivots_minus2 as usize + 2;
        let mut pivots = Vec::with_capacity(count);
        for _ in 0..count {
            pivots.push(br.read_bits(bl_bits)? as u16);
        }
        Ok((num_pivots_minus2 as u8, pivots))
    }

    fn parse_payload(
        br: &mut BitReader,
        header: &RpuDataHeader,
        cmp: usize,
        num_pieces: usize,
    ) -> DoviResult<CurvePayload> {
        let mut poly = Vec::new();
        let mut mmr = Vec::new();
        let mut curve_idc = None;

        for _ in 0..num_pieces {
            let idc = br.read_ue()?;
            match curve_idc {
                None => curve_idc = Some(idc),
                Some(prev) if prev != idc => return Err(DoviError::InvalidMappingIdc(idc)),
                Some(_) => {}
            }

            match idc {
                MAPPING_IDC_POLYNOMIAL => poly.push(PolynomialPiece::parse(br, header)?),
                // 亮度分量只允许多项式
                MAPPING_IDC_MMR if cmp > 0 => mmr.push(MmrPiece::parse(br, header)?),
                _ => return Err(DoviError::InvalidMappingIdc(idc)),
            }
        }

        Ok(match curve_idc {
            Some(MAPPING_IDC_MMR) => CurvePayload::Mmr(mmr),
            _ => CurvePayload::Polynomial(poly),
        })
    }

    fn write_pivots(&self, bw: &mut BitWriter, bl_bits: u32) {
        bw.write_ue(u64::from(self.num_pivots_minus2));
        for &pivot in &self.pred_pivot_value {
            bw.write_bits(u64::from(pivot), bl_bits);
        }
    }

    fn write_payload(&self, bw: &mut BitWriter, header: &RpuDataHeader) -> DoviResult<()> {
        let idc = self.mapping_idc();
        match &self.payload {
            CurvePayload::Polynomial(pieces) => {
                for piece in pieces {
                    bw.write_ue(idc);
                    piece.write(bw, header)?;
                }
            }
            CurvePayload::Mmr(pieces) => {
                for piece in pieces {
                    bw.write_ue(idc);
                    piece.write(bw, header)?;
                }
            }
        }
        Ok(())
    }
}

/// mapping 负载: 三条曲线 + 可选 NLQ
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpuDataMapping {
    pub vdr_rpu_id: u64,
    pub mapping_color_space: u64,
    pub mapping_chroma_format_idc: u64,
    /// 按 Y, Cb, Cr 顺序
    pub curves: [ReshapingCurve; NUM_COMPONENTS],
    pub num_x_partitions_minus1: u64,
    pub num_y_partitions_minus1: u64,
    /// 仅双层 profile 存在
    pub nlq: Option<RpuDataNlq>,
}

impl RpuDataMapping {
    /// 三个分量均为恒等曲线, 无 NLQ
    pub fn identity(bl_bit_depth: u32) -> Self {
        Self {
            vdr_rpu_id: 0,
            mapping_color_space: 0,
            mapping_chroma_format_idc: 0,
            curves: std::array::from_fn(|_| ReshapingCurve::identity(bl_bit_depth)),
            num_x_partitions_minus1: 0,
            num_y_partitions_minus1: 0,
            nlq: None,
        }
    }

    /// 将三条曲线替换为恒等曲线并移除 NLQ
    pub fn set_identity_curves(&mut self, bl_bit_depth: u32) {
        self.curves = std::array::from_fn(|_| ReshapingCurve::identity(bl_bit_depth));
        self.nlq = None;
    }

    /// 所有曲线是否均为恒等映射
    pub fn is_identity(&self) -> bool {
        self.curves.iter().all(ReshapingCurve::is_identity)
    }

    /// 从比特流解析 mapping
    pub fn parse(br: &mut BitReader, header: &RpuDataHeader) -> DoviResult<Self> {
        let bl_bits = header.bl_bit_depth();

        let vdr_rpu_id = br.read_ue()?;
        let mapping_color_space = br.read_ue()?;
        let mapping_chroma_format_idc = br.read_ue()?;

        let mut pivots = Vec::with_capacity(NUM_COMPONENTS);
        for _ in 0..NUM_COMPONENTS {
            pivots.push(ReshapingCurve::parse_pivots(br, bl_bits)?);
        }

        let mut nlq = if header.nlq_signalled() {
            Some(RpuDataNlq::parse_method(br, header)?)
        } else {
            None
        };

        let num_x_partitions_minus1 = br.read_ue()?;
        let num_y_partitions_minus1 = br.read_ue()?;
        if num_x_partitions_minus1 != 0 || num_y_partitions_minus1 != 0 {
            return Err(DoviError::InvalidData(format!(
                "mapping: 不支持的分区 {}x{}",
                num_x_partitions_minus1 + 1,
                num_y_partitions_minus1 + 1,
            )));
        }

        let mut curves = Vec::with_capacity(NUM_COMPONENTS);
        for (cmp, (num_pivots_minus2, pred_pivot_value)) in pivots.into_iter().enumerate() {
            let num_pieces = num_pivots_minus2 as usize + 1;
            let payload = ReshapingCurve::parse_payload(br, header, cmp, num_pieces)?;
            trace!(
                "mapping: 分量 {} pivots={} idc={}",
                cmp,
                num_pivots_minus2 as usize + 2,
                match payload {
                    CurvePayload::Polynomial(_) => "poly",
                    CurvePayload::Mmr(_) => "mmr",
                },
            );
            curves.push(ReshapingCurve {
                num_pivots_minus2,
                pred_pivot_value,
                payload,
            });
        }

        if let Some(nlq) = nlq.as_mut() {
            nlq.parse_params(br, header)?;
        }

        let curves: [ReshapingCurve; NUM_COMPONENTS] = curves
            .try_into()
            .map_err(|_| DoviError::InvalidData("mapping: 分量数量错误".into()))?;

        Ok(Self {
            vdr_rpu_id,
            mapping_color_space,
            mapping_chroma_format_idc,
            curves,
            num_x_partitions_minus1,
            num_y_partitions_minus1,
            nlq,
        })
    }

    /// 检查 mapping 与头部一致
    pub fn validate(&self, header: &RpuDataHeader) -> DoviResult<()> {
        for curve in &self.curves {
            curve.validate()?;
        }
        if self.curves[0].mapping_idc() != MAPPING_IDC_POLYNOMIAL {
            return Err(DoviError::InvalidMappingIdc(self.curves[0].mapping_idc()));
        }
        if self.num_x_partitions_minus1 != 0 || self.num_y_partitions_minus1 != 0 {
            return Err(DoviError::InvalidData("mapping: 仅支持单分区".into()));
        }
        if header.nlq_signalled() != self.nlq.is_some() {
            return Err(DoviError::InvalidData(format!(
                "mapping: NLQ 存在性 ({}) 与头部残差标志不一致",
                self.nlq.is_some(),
            )));
        }
        Ok(())
    }

    /// 写入 mapping
    pub fn write(&self, bw: &mut BitWriter, header: &RpuDataHeader) -> DoviResult<()> {
        self.validate(header)?;
        let bl_bits = header.bl_bit_depth();

        bw.write_ue(self.vdr_rpu_id);
        bw.write_ue(self.mapping_color_space);
        bw.write_ue(self.mapping_chroma_format_idc);

        for curve in &self.curves {
            curve.write_pivots(bw, bl_bits);
        }

        if let Some(nlq) = &self.nlq {
            nlq.write_method(bw, header);
        }

        bw.write_ue(self.num_x_partitions_minus1);
        bw.write_ue(self.num_y_partitions_minus1);

        for curve in &self.curves {
            curve.write_payload(bw, header)?;
        }

        if let Some(nlq) = &self.nlq {
            nlq.write_params(bw, header);
        }

        Ok(())
    }
}
