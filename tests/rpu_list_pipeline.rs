//! 端到端集成测试: RPU 二进制文件的列表解析.
//!
//! 测试流程: 写出多个 UNSPEC62 NAL → 拼接为 Annex B 文件 → 列表解析 → 逐个验证

mod common;

use std::fs;

use dovi::rpu::{ConversionMode, DoviRpu, ListParseConfig, RpuList};

/// 把样本写成 Annex B 字节流
fn annex_b(rpus: &[DoviRpu]) -> Vec<u8> {
    let mut out = Vec::new();
    for rpu in rpus {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(&rpu.write_unspec62_nalu().unwrap());
    }
    out
}

fn samples() -> Vec<DoviRpu> {
    common::all_samples().into_iter().map(|(_, rpu, _)| rpu).collect()
}

#[test]
fn test_parse_file_preserves_order() -> anyhow::Result<()> {
    common::init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("RPU.bin");

    let mut rpus = Vec::new();
    for _ in 0..20 {
        rpus.extend(samples());
    }
    fs::write(&path, annex_b(&rpus))?;

    let list = RpuList::parse_file(&path);
    assert!(list.last_error().is_none());
    assert_eq!(list.len(), rpus.len());
    for (handle, expected) in list.rpus.iter().zip(&rpus) {
        let parsed = handle.rpu().expect("解析成功");
        assert_eq!(parsed.write_rpu()?, expected.write_rpu()?);
    }
    Ok(())
}

#[test]
fn test_parallel_matches_sequential() -> anyhow::Result<()> {
    let data = annex_b(&samples());
    let sequential = RpuList::parse_annex_b(
        &data,
        &ListParseConfig {
            parallel: false,
            ..Default::default()
        },
    );
    let parallel = RpuList::parse_annex_b(&data, &ListParseConfig::default());
    assert_eq!(sequential, parallel);
    Ok(())
}

#[test]
fn test_item_failure_stays_on_item() -> anyhow::Result<()> {
    let mut data = annex_b(&[common::profile81()]);
    // 前缀错误的 NAL
    data.extend_from_slice(&[0, 0, 1, 0x7E, 0x01, 0x19, 0x80]);
    data.extend_from_slice(&annex_b(&[common::profile84()]));

    let mut list = RpuList::parse_annex_b(&data, &ListParseConfig::default());
    assert!(list.last_error().is_none());
    assert_eq!(list.len(), 3);
    assert!(list.rpus[1].rpu().is_none());
    assert!(list.rpus[1].last_error().is_some());

    // 其余句柄仍可转换与写出
    for i in [0, 2] {
        assert!(list.rpus[i].convert(u8::from(ConversionMode::To84)));
        assert!(list.rpus[i].write_unspec62_nalu().is_some());
    }
    Ok(())
}

#[test]
fn test_file_errors_on_list() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let missing = RpuList::parse_file(dir.path().join("missing.bin"));
    assert!(missing.is_empty());
    assert!(missing.last_error().is_some());

    let path = dir.path().join("big.bin");
    fs::write(&path, annex_b(&samples()))?;
    let config = ListParseConfig {
        max_file_size: 16,
        ..Default::default()
    };
    let too_large = RpuList::parse_file_with_config(&path, &config);
    assert!(too_large.is_empty());
    assert!(too_large.last_error().is_some());

    let raw = dir.path().join("raw.bin");
    fs::write(&raw, common::profile81().write_unspec62_nalu()?)?;
    let no_start_code = RpuList::parse_file(&raw);
    assert!(no_start_code.is_empty());
    assert!(no_start_code.last_error().is_some());
    Ok(())
}

#[test]
fn test_config_from_json() -> anyhow::Result<()> {
    let config: ListParseConfig = serde_json::from_str(r#"{ "parallel": false }"#)?;
    assert_eq!(config.max_file_size, 250_000_000);
    assert!(!config.parallel);

    let json = serde_json::to_string(&ListParseConfig::default())?;
    let back: ListParseConfig = serde_json::from_str(&json)?;
    assert_eq!(back, ListParseConfig::default());
    Ok(())
}
