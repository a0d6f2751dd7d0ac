//! 集成测试共用的 RPU 样本.

#![allow(dead_code)]

use dovi::rpu::extension::*;
use dovi::rpu::{
    CurvePayload, DoviRpu, MmrPiece, PolynomialPiece, ReshapingCurve, RpuDataMapping, RpuDataNlq,
};

/// 安装测试日志 (可重复调用)
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 两段多项式亮度曲线
pub fn two_piece_luma() -> ReshapingCurve {
    ReshapingCurve {
        num_pivots_minus2: 1,
        pred_pivot_value: vec![63, 500, 460],
        payload: CurvePayload::Polynomial(vec![
            PolynomialPiece {
                poly_order_minus1: 1,
                linear_interp_flag: false,
                poly_coef_int: vec![0, 1, -1],
                poly_coef: vec![8_000, 4_194_304, 6_291_456],
            },
            PolynomialPiece {
                poly_order_minus1: 0,
                linear_interp_flag: false,
                poly_coef_int: vec![0, 1],
                poly_coef: vec![123_456, 1_048_576],
            },
        ]),
    }
}

/// 单段二阶 MMR 色度曲线
pub fn mmr_chroma(seed: u64) -> ReshapingCurve {
    ReshapingCurve {
        num_pivots_minus2: 0,
        pred_pivot_value: vec![0, 1023],
        payload: CurvePayload::Mmr(vec![MmrPiece {
            mmr_order_minus1: 1,
            mmr_constant_int: -1,
            mmr_constant: 7_000_000 + seed,
            mmr_coef_int: vec![[0, 1, -1, 0, 0, 2, -2]; 2],
            mmr_coef: vec![[seed, 11, 22, 33, 44, 55, 66], [1, 2, 3, 4, 5, 6, seed]],
        }]),
    }
}

/// 非恒等的 NLQ (FEL)
pub fn fel_nlq() -> RpuDataNlq {
    let mut nlq = RpuDataNlq::mel_identity(10);
    nlq.nlq_offset = [512, 512, 512];
    nlq.vdr_in_max_int = [1, 0, 0];
    nlq.vdr_in_max = [0, 6_000_000, 6_000_000];
    nlq.linear_deadzone_slope = [2_097_152; 3];
    nlq.linear_deadzone_threshold = [0, 1, 2];
    nlq
}

/// 覆盖所有级别的 DM 扩展块
pub fn push_all_blocks(rpu: &mut DoviRpu) {
    let dm = rpu.vdr_dm_data.as_mut().expect("DM");
    let blocks = [
        ExtMetadataBlock::Level1(ExtMetadataBlockLevel1 {
            min_pq: 0,
            max_pq: 2828,
            avg_pq: 1229,
        }),
        ExtMetadataBlock::Level2(ExtMetadataBlockLevel2 {
            target_max_pq: 2081,
            trim_slope: 2048,
            trim_offset: 2048,
            trim_power: 2048,
            trim_chroma_weight: 2048,
            trim_saturation_gain: 2048,
            ms_weight: -1,
        }),
        ExtMetadataBlock::Level2(ExtMetadataBlockLevel2 {
            target_max_pq: 2851,
            trim_slope: 2100,
            trim_offset: 1990,
            trim_power: 2048,
            trim_chroma_weight: 2048,
            trim_saturation_gain: 2048,
            ms_weight: 2048,
        }),
        ExtMetadataBlock::Level4(ExtMetadataBlockLevel4 {
            anchor_pq: 1000,
            anchor_power: 2200,
        }),
        ExtMetadataBlock::Level255(ExtMetadataBlockLevel255 {
            dm_run_mode: 1,
            dm_run_version: 2,
            dm_debug_value: [3, 4, 5, 6],
        }),
        ExtMetadataBlock::Level3(ExtMetadataBlockLevel3 {
            min_pq_offset: 2048,
            max_pq_offset: 2040,
            avg_pq_offset: 2060,
        }),
        ExtMetadataBlock::Level8(ExtMetadataBlockLevel8 {
            length: 25,
            target_display_index: 1,
            target_mid_contrast: 2100,
            clip_trim: 2000,
            saturation_vector_field: [128, 129, 130, 131, 132, 133],
            hue_vector_field: [127, 126, 125, 124, 123, 122],
            ..Default::default()
        }),
        ExtMetadataBlock::Level8(ExtMetadataBlockLevel8 {
            length: 12,
            target_display_index: 48,
            target_mid_contrast: 1900,
            ..Default::default()
        }),
        ExtMetadataBlock::Level9(ExtMetadataBlockLevel9 {
            length: 17,
            source_primary_index: 255,
            source_primaries: Primaries {
                red_x: 22_282,
                red_y: 10_486,
                green_x: 8_683,
                green_y: 22_610,
                blue_x: 4_915,
                blue_y: 1_638,
                white_x: 10_255,
                white_y: 10_787,
            },
        }),
        ExtMetadataBlock::Level10(ExtMetadataBlockLevel10 {
            length: 5,
            target_display_index: 48,
            target_max_pq: 2851,
            target_min_pq: 0,
            target_primary_index: 2,
            ..Default::default()
        }),
        ExtMetadataBlock::Level11(ExtMetadataBlockLevel11 {
            content_type: 1,
            whitepoint: 0,
            reference_mode_flag: true,
            reserved_byte2: 0,
            reserved_byte3: 0,
        }),
    ];
    for block in blocks {
        dm.push_block(block).expect("合法扩展块");
    }
}

/// profile 8.1
pub fn profile81() -> DoviRpu {
    DoviRpu::profile81_default()
}

/// profile 8.4 风格: 恒等 mapping, 所有级别的扩展块
pub fn profile84() -> DoviRpu {
    let mut rpu = DoviRpu::profile81_default();
    push_all_blocks(&mut rpu);
    rpu
}

/// profile 7 FEL: 多段亮度, MMR 色度, 非恒等 NLQ
pub fn profile7_fel() -> DoviRpu {
    let mut rpu = DoviRpu::profile81_default();
    rpu.header.el_spatial_resampling_filter_flag = true;
    rpu.header.disable_residual_flag = false;
    rpu.rpu_data_mapping = Some(RpuDataMapping {
        curves: [two_piece_luma(), mmr_chroma(5), mmr_chroma(9)],
        nlq: Some(fel_nlq()),
        ..RpuDataMapping::identity(10)
    });
    push_all_blocks(&mut rpu);
    rpu
}

/// profile 7 MEL
pub fn profile7_mel() -> DoviRpu {
    let mut rpu = profile7_fel();
    if let Some(nlq) = rpu
        .rpu_data_mapping
        .as_mut()
        .and_then(|m| m.nlq.as_mut())
    {
        nlq.set_mel_identity();
    }
    rpu
}

/// profile 4: 带增强层, VDR 位深不是 12
pub fn profile4() -> DoviRpu {
    let mut rpu = profile7_fel();
    rpu.header.vdr_bit_depth_minus8 = 2;
    rpu
}

/// profile 5: 全范围 IPT, MMR 色度
pub fn profile5() -> DoviRpu {
    let mut rpu = DoviRpu::profile81_default();
    rpu.header.vdr_rpu_profile = 0;
    rpu.header.bl_video_full_range_flag = true;
    rpu.rpu_data_mapping = Some(RpuDataMapping {
        curves: [two_piece_luma(), mmr_chroma(1), mmr_chroma(2)],
        ..RpuDataMapping::identity(10)
    });
    if let Some(dm) = rpu.vdr_dm_data.as_mut() {
        dm.signal_color_space = 2;
        dm.ycc_to_rgb_coef = [8192, 799, 1681, 8192, -933, 1091, 8192, 267, -5545];
        dm.ycc_to_rgb_offset = [0, 134_217_728, 134_217_728];
        dm.rgb_to_lms_coef = [17081, -349, -349, -349, 17081, -349, -349, -349, 17081];
    }
    rpu
}

/// 全部样本及其期望的 profile
pub fn all_samples() -> Vec<(&'static str, DoviRpu, u8)> {
    vec![
        ("4", profile4(), 4),
        ("5", profile5(), 5),
        ("7 FEL", profile7_fel(), 7),
        ("7 MEL", profile7_mel(), 7),
        ("8.1", profile81(), 8),
        ("8.4", profile84(), 8),
    ]
}
