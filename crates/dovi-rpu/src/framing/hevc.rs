//! HEVC UNSPEC62 NAL 单元封装.
//!
//! Dolby Vision RPU 以 nal_unit_type = 62 的 NAL 单元承载, NAL 头固定为 `7C 01`
//! (forbidden_zero_bit = 0, nuh_layer_id = 0, nuh_temporal_id_plus1 = 1).
//! NAL 负载需要插入/去除仿真防止字节 (`00 00 03`).

use dovi_core::{DoviError, DoviResult};

/// UNSPEC62 NAL 头
pub const UNSPEC62_NAL_HEADER: [u8; 2] = [0x7C, 0x01];

/// UNSPEC62 的 nal_unit_type
pub const NAL_UNSPEC62: u8 = 62;

// ============================================================
// Annex B 起始码
// ============================================================

/// 查找所有起始码位置 (3 字节或 4 字节)
fn find_start_codes(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                positions.push(i);
                i += 3;
                continue;
            }
            if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                positions.push(i);
                i += 4;
                continue;
            }
        }
        i += 1;
    }
    positions
}

/// 返回起始码之后的位置
fn skip_start_code(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(&[0, 0, 0, 1]) {
        pos + 4
    } else {
        pos + 3
    }
}

/// 数据开头的起始码长度, 没有起始码时为 0
fn leading_start_code_len(data: &[u8]) -> usize {
    if data.starts_with(&[0, 0, 0, 1]) {
        4
    } else if data.starts_with(&[0, 0, 1]) {
        3
    } else {
        0
    }
}

/// 按 Annex B 起始码切分, 返回不含起始码的 NAL 单元
///
/// 每个 NAL 末尾的 0x00 (trailing_zero_8bits) 被裁掉, 空单元被丢弃.
/// 第一个起始码之前的数据被忽略.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let offsets = find_start_codes(data);
    let mut nalus = Vec::with_capacity(offsets.len());

    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        let nal_start = skip_start_code(data, start);
        let mut nal_end = end;
        while nal_end > nal_start && data[nal_end - 1] == 0x00 {
            nal_end -= 1;
        }
        if nal_start < nal_end {
            nalus.push(&data[nal_start..nal_end]);
        }
    }
    nalus
}

// ============================================================
// 仿真防止字节
// ============================================================

/// 去除仿真防止字节 (00 00 03 -> 00 00)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// 插入仿真防止字节: 连续两个 0x00 之后若下一字节 <= 0x03, 先写 0x03
pub fn insert_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 1);
    let mut zeros = 0usize;
    for &b in data {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

// ============================================================
// UNSPEC62 封装
// ============================================================

/// 解开 UNSPEC62 NAL 单元, 返回以 0x19 开头的 RPU 负载
///
/// 允许带 Annex B 起始码. NAL 头必须为 `7C 01`.
pub fn unwrap_unspec62_nalu(data: &[u8]) -> DoviResult<Vec<u8>> {
    let body = &data[leading_start_code_len(data)..];
    if body.len() < UNSPEC62_NAL_HEADER.len() {
        return Err(DoviError::TruncatedFrame(format!(
            "UNSPEC62: 长度 {} 不足以容纳 NAL 头",
            body.len(),
        )));
    }
    if body[..2] != UNSPEC62_NAL_HEADER {
        return Err(DoviError::InvalidPrefix(format!(
            "UNSPEC62: NAL 头 {:02X} {:02X} 不是 7C 01 (nal_unit_type={})",
            body[0],
            body[1],
            (body[0] >> 1) & 0x3F,
        )));
    }
    Ok(remove_emulation_prevention(&body[2..]))
}

/// 把 RPU 负载封装为 UNSPEC62 NAL 单元 (不含起始码)
pub fn wrap_unspec62_nalu(rpu: &[u8]) -> Vec<u8> {
    let escaped = insert_emulation_prevention(rpu);
    let mut out = Vec::with_capacity(escaped.len() + 2);
    out.extend_from_slice(&UNSPEC62_NAL_HEADER);
    out.extend_from_slice(&escaped);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_header_type() {
        assert_eq!((UNSPEC62_NAL_HEADER[0] >> 1) & 0x3F, NAL_UNSPEC62);
    }

    #[test]
    fn test_emulation_prevention_insert() {
        assert_eq!(
            insert_emulation_prevention(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x04]),
            vec![0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x04],
        );
        assert_eq!(
            insert_emulation_prevention(&[0x00, 0x00, 0x00, 0x00]),
            vec![0x00, 0x00, 0x03, 0x00, 0x00],
        );
    }

    #[test]
    fn test_emulation_prevention_remove() {
        assert_eq!(
            remove_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00]),
            vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00],
        );
        // 孤立的 0x03 保留
        assert_eq!(
            remove_emulation_prevention(&[0x00, 0x03, 0x00]),
            vec![0x00, 0x03, 0x00]
        );
    }

    #[test]
    fn test_emulation_prevention_inverse() {
        let raw = [0x19, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x03, 0x80];
        let escaped = insert_emulation_prevention(&raw);
        assert_eq!(remove_emulation_prevention(&escaped), raw.to_vec());
    }

    #[test]
    fn test_unwrap_with_and_without_start_code() {
        let nal = [0x7C, 0x01, 0x19, 0x00, 0x00, 0x03, 0x01, 0x80];
        assert_eq!(
            unwrap_unspec62_nalu(&nal).unwrap(),
            vec![0x19, 0x00, 0x00, 0x01, 0x80]
        );

        let mut with_sc = vec![0x00, 0x00, 0x00, 0x01];
        with_sc.extend_from_slice(&nal);
        assert_eq!(
            unwrap_unspec62_nalu(&with_sc).unwrap(),
            vec![0x19, 0x00, 0x00, 0x01, 0x80]
        );
    }

    #[test]
    fn test_unwrap_rejects_wrong_header() {
        let err = unwrap_unspec62_nalu(&[0x7E, 0x01, 0x19, 0x80]).unwrap_err();
        assert!(matches!(err, DoviError::InvalidPrefix(_)));

        let err = unwrap_unspec62_nalu(&[0x00, 0x00, 0x01, 0x7C]).unwrap_err();
        assert!(matches!(err, DoviError::TruncatedFrame(_)));
    }

    #[test]
    fn test_wrap_unspec62() {
        let out = wrap_unspec62_nalu(&[0x19, 0x00, 0x00, 0x02, 0x80]);
        assert_eq!(out, vec![0x7C, 0x01, 0x19, 0x00, 0x00, 0x03, 0x02, 0x80]);
    }

    #[test]
    fn test_split_annex_b() {
        let data = [
            0xAA, // 起始码之前的数据被忽略
            0x00, 0x00, 0x00, 0x01, 0x7C, 0x01, 0x19, 0x80, 0x00, 0x00, // 尾随零
            0x00, 0x00, 0x01, 0x7C, 0x01, 0x19, 0x81, //
            0x00, 0x00, 0x01, // 空单元
        ];
        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0], &[0x7C, 0x01, 0x19, 0x80]);
        assert_eq!(nalus[1], &[0x7C, 0x01, 0x19, 0x81]);
    }

    #[test]
    fn test_split_annex_b_without_start_code() {
        assert!(split_annex_b(&[0x7C, 0x01, 0x19, 0x80]).is_empty());
    }
}
