//! 端到端集成测试: RPU 的解析与逐位写回.
//!
//! 覆盖 profile 4/5/7/8.1/8.4 样本在裸 RPU, HEVC UNSPEC62, AV1 T.35 三种封装下的往返,
//! 以及截断, 前缀, CRC 等错误输入.

mod common;

use dovi::rpu::extension::ExtMetadataBlockLevel8;
use dovi::rpu::header::ElType;
use dovi::rpu::{DoviError, DoviRpu, RpuHandle};

#[test]
fn test_guessed_profiles() {
    common::init_logger();
    for (name, rpu, profile) in common::all_samples() {
        assert_eq!(rpu.guessed_profile(), profile, "样本 {name}");
    }
    assert_eq!(common::profile7_fel().el_type(), Some(ElType::Fel));
    assert_eq!(common::profile7_mel().el_type(), Some(ElType::Mel));
    assert_eq!(common::profile81().el_type(), None);
}

#[test]
fn test_raw_rpu_roundtrip() {
    common::init_logger();
    for (name, rpu, profile) in common::all_samples() {
        let data = rpu.write_rpu().unwrap();
        let parsed = DoviRpu::parse_rpu(&data).unwrap();
        assert_eq!(parsed.guessed_profile(), profile, "样本 {name}");
        assert_eq!(parsed.write_rpu().unwrap(), data, "样本 {name}");
    }
}

#[test]
fn test_hevc_roundtrip() {
    for (name, rpu, _) in common::all_samples() {
        let nal = rpu.write_unspec62_nalu().unwrap();
        assert_eq!(&nal[..2], &[0x7C, 0x01]);
        // 负载中不应出现未转义的 00 00 0x (x <= 3)
        assert!(
            nal.windows(3).all(|w| !(w[0] == 0 && w[1] == 0 && w[2] <= 3) || w[2] == 3),
            "样本 {name}"
        );

        let parsed = DoviRpu::parse_unspec62_nalu(&nal).unwrap();
        assert_eq!(parsed.write_unspec62_nalu().unwrap(), nal, "样本 {name}");

        let mut with_start_code = vec![0, 0, 0, 1];
        with_start_code.extend_from_slice(&nal);
        let parsed2 = DoviRpu::parse_unspec62_nalu(&with_start_code).unwrap();
        assert_eq!(parsed2, parsed);
    }
}

#[test]
fn test_av1_roundtrip() {
    for (name, rpu, _) in common::all_samples() {
        let payload = rpu.write_av1_t35_payload().unwrap();
        assert_eq!(&payload[..2], &[0x00, 0x3B]);
        let parsed = DoviRpu::parse_av1_t35_payload(&payload).unwrap();
        assert_eq!(parsed.write_av1_t35_payload().unwrap(), payload, "样本 {name}");

        let mut with_country = vec![0xB5];
        with_country.extend_from_slice(&payload);
        assert_eq!(DoviRpu::parse_av1_t35_payload(&with_country).unwrap(), parsed);

        // 国家码只出现在 OBU 中: header | size | metadata_type | B5 | 负载
        let obu = rpu.write_av1_t35_obu().unwrap();
        let size_len = obu[1..].iter().position(|b| b & 0x80 == 0).unwrap() + 1;
        assert_eq!(obu[1 + size_len + 1], 0xB5);
        assert_eq!(&obu[3 + size_len..3 + size_len + payload.len()], &payload[..]);
        let parsed = DoviRpu::parse_av1_t35_obu(&obu).unwrap();
        assert_eq!(parsed.write_av1_t35_obu().unwrap(), obu, "样本 {name}");
    }
}

#[test]
fn test_cross_container_identity() {
    for (name, rpu, _) in common::all_samples() {
        let raw = rpu.write_rpu().unwrap();
        let from_hevc = DoviRpu::parse_unspec62_nalu(&rpu.write_unspec62_nalu().unwrap()).unwrap();
        let from_av1 = DoviRpu::parse_av1_t35_obu(&rpu.write_av1_t35_obu().unwrap()).unwrap();
        assert_eq!(from_hevc.write_rpu().unwrap(), raw, "样本 {name}");
        assert_eq!(from_av1.write_rpu().unwrap(), raw, "样本 {name}");
    }
}

#[test]
fn test_level8_length10_defaults() {
    let mut rpu = common::profile81();
    rpu.vdr_dm_data
        .as_mut()
        .unwrap()
        .push_block(dovi::rpu::ExtMetadataBlock::Level8(ExtMetadataBlockLevel8 {
            target_mid_contrast: 999,
            clip_trim: 999,
            saturation_vector_field: [9; 6],
            hue_vector_field: [9; 6],
            ..Default::default()
        }))
        .unwrap();

    // 长度 10 时可选字段不会被写出
    let parsed = DoviRpu::parse_rpu(&rpu.write_rpu().unwrap()).unwrap();
    let l8 = parsed.vdr_dm_data.as_ref().unwrap().level8().next().unwrap();
    assert_eq!(l8.length, 10);
    assert_eq!(l8.target_mid_contrast, 0);
    assert_eq!(l8.clip_trim, 0);
    assert_eq!(l8.saturation_vector_field, [0; 6]);
    assert_eq!(l8.hue_vector_field, [0; 6]);
}

#[test]
fn test_trailing_bytes_preserved() {
    let mut rpu = common::profile84();
    rpu.trailing_bytes = vec![0xAB, 0xCD, 0x00, 0x01];
    let data = rpu.write_rpu().unwrap();
    let parsed = DoviRpu::parse_rpu(&data).unwrap();
    assert_eq!(parsed.trailing_bytes, vec![0xAB, 0xCD, 0x00, 0x01]);
    assert_eq!(parsed.write_rpu().unwrap(), data);
}

#[test]
fn test_truncated_input_yields_error_handle() {
    let data = common::profile7_fel().write_rpu().unwrap();
    for len in [1, 3, 5, 8, data.len() / 2, data.len() - 1] {
        let handle = RpuHandle::parse(&data[..len]);
        assert!(handle.rpu().is_none(), "长度 {len}");
        assert!(!handle.last_error().unwrap_or_default().is_empty(), "长度 {len}");
    }
}

#[test]
fn test_missing_nal_prefix_rejected() {
    let nal = common::profile81().write_unspec62_nalu().unwrap();
    let err = DoviRpu::parse_unspec62_nalu(&nal[2..]).unwrap_err();
    assert!(matches!(err, DoviError::InvalidPrefix(_)));

    let err = DoviRpu::parse_rpu(&nal).unwrap_err();
    assert!(matches!(err, DoviError::InvalidPrefix(_)));
}

#[test]
fn test_crc_mismatch_rejected() {
    let mut data = common::profile81().write_rpu().unwrap();
    data[4] ^= 0x10;
    let err = DoviRpu::parse_rpu(&data).unwrap_err();
    assert!(matches!(err, DoviError::Crc32Mismatch { .. }));
}

#[test]
fn test_serde_json_tree() {
    let rpu = common::profile7_fel();
    let json = serde_json::to_string(&rpu).unwrap();
    let back: DoviRpu = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rpu);
    assert_eq!(back.write_rpu().unwrap(), rpu.write_rpu().unwrap());
}
