//! AV1 ITU-T T.35 元数据封装.
//!
//! itu_t_t35_payload_bytes 布局:
//!
//! ```text
//! 00 3B (provider_code) | 00 00 08 00 (provider_oriented_code) | EMDF 容器
//! ```
//!
//! EMDF 容器中 emdf_payload_id = 256 的负载即 RPU, 不含 0x19 前缀.
//! 国家码是 `metadata_itut_t35()` 的独立字段, 只出现在完整的 metadata OBU 中:
//! `obu_header | leb128(obu_size) | metadata_type=4 | B5 | T.35 负载 | 0x80`.

use dovi_core::{BitReader, BitWriter, DoviError, DoviResult};

use crate::rpu::RPU_PREFIX;

/// ITU-T T.35 国家码 (美国)
pub const T35_COUNTRY_CODE: u8 = 0xB5;

/// Dolby 的 terminal provider code
pub const T35_PROVIDER_CODE: u16 = 0x003B;

/// Dolby Vision 的 provider oriented code
pub const T35_PROVIDER_ORIENTED_CODE: u32 = 0x0000_0800;

/// OBU_METADATA
pub const OBU_METADATA: u8 = 5;

/// METADATA_TYPE_ITUT_T35
pub const METADATA_TYPE_ITUT_T35: u64 = 4;

const EMDF_VERSION: u64 = 0;
const EMDF_KEY_ID: u64 = 6;
/// emdf_payload_id 的 5 位字段取最大值 31 时, 后接 variable_bits(5) 扩展
const EMDF_PAYLOAD_ID: u64 = 31;
const EMDF_PAYLOAD_ID_EXT: u64 = 225;
/// variable_bits 最多读取的组数, 结果不超过 u32
const MAX_VARIABLE_BITS_GROUPS: usize = 4;

// ============================================================
// 可变长字段
// ============================================================

/// EMDF variable_bits(n), n <= 8
fn read_variable_bits(br: &mut BitReader<'_>, n: u32) -> DoviResult<u64> {
    let overflow = || DoviError::InvalidData(format!("EMDF: variable_bits({n}) 溢出"));

    let mut value = 0u64;
    for _ in 0..MAX_VARIABLE_BITS_GROUPS {
        value = value.checked_add(br.read_bits(n)?).ok_or_else(overflow)?;
        if !br.read_flag()? {
            return if value > u64::from(u32::MAX) {
                Err(overflow())
            } else {
                Ok(value)
            };
        }
        value = value
            .checked_mul(1 << n)
            .and_then(|v| v.checked_add(1 << n))
            .ok_or_else(overflow)?;
    }
    Err(DoviError::InvalidData(format!(
        "EMDF: variable_bits({n}) 超过 {MAX_VARIABLE_BITS_GROUPS} 组",
    )))
}

fn write_variable_bits(bw: &mut BitWriter, value: u64, n: u32) {
    let mask = (1u64 << n) - 1;
    let mut groups = vec![value & mask];
    let mut v = value >> n;
    while v > 0 {
        v -= 1;
        groups.push(v & mask);
        v >>= n;
    }
    for (i, g) in groups.iter().rev().enumerate() {
        bw.write_bits(*g, n);
        bw.write_flag(i + 1 < groups.len());
    }
}

/// 读取 leb128, 返回 (值, 占用字节数)
fn read_leb128(data: &[u8]) -> DoviResult<(u64, usize)> {
    let mut value = 0u64;
    for i in 0..8 {
        let byte = *data
            .get(i)
            .ok_or_else(|| DoviError::TruncatedFrame("OBU: leb128 被截断".into()))?;
        value |= u64::from(byte & 0x7F) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(DoviError::InvalidData("OBU: leb128 超过 8 字节".into()))
}

fn write_leb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

// ============================================================
// T.35 负载
// ============================================================

/// 把以 0x19 开头的 RPU 封装为 itu_t_t35_payload_bytes (从 provider_code 开始, 不含国家码)
pub fn wrap_t35_payload(rpu: &[u8]) -> DoviResult<Vec<u8>> {
    let Some((&RPU_PREFIX, body)) = rpu.split_first() else {
        return Err(DoviError::InvalidPrefix(
            "T.35: RPU 负载必须以 0x19 开头".into(),
        ));
    };

    let mut bw = BitWriter::with_capacity(body.len() + 16);
    bw.write_bits(u64::from(T35_PROVIDER_CODE), 16);
    bw.write_bits(u64::from(T35_PROVIDER_ORIENTED_CODE), 32);

    bw.write_bits(EMDF_VERSION, 2);
    bw.write_bits(EMDF_KEY_ID, 3);
    bw.write_bits(EMDF_PAYLOAD_ID, 5);
    write_variable_bits(&mut bw, EMDF_PAYLOAD_ID_EXT, 5);
    // smploffste, duratione, groupide, codecdatae
    bw.write_bits(0, 4);
    // discard_unknown_payload
    bw.write_flag(true);
    write_variable_bits(&mut bw, body.len() as u64, 8);
    for &b in body {
        bw.write_bits(u64::from(b), 8);
    }

    // 负载结束 (emdf_payload_id = 0) 与 emdf_protection()
    bw.write_bits(0, 5);
    bw.write_bits(1, 2);
    bw.write_bits(0, 2);
    bw.write_bits(0, 8);
    bw.align_to_byte();

    Ok(bw.finish())
}

/// 解开 itu_t_t35_payload_bytes, 返回以 0x19 开头的 RPU 负载
///
/// 国家码 0xB5 可有可无, provider_code 的首字节不会是 0xB5.
pub fn unwrap_t35_payload(data: &[u8]) -> DoviResult<Vec<u8>> {
    let data = match data.first() {
        Some(&T35_COUNTRY_CODE) => &data[1..],
        _ => data,
    };
    if data.len() < 6 {
        return Err(DoviError::TruncatedFrame(format!(
            "T.35: 长度 {} 不足以容纳 provider 码",
            data.len(),
        )));
    }

    let provider_code = u16::from_be_bytes([data[0], data[1]]);
    let oriented_code = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    if provider_code != T35_PROVIDER_CODE || oriented_code != T35_PROVIDER_ORIENTED_CODE {
        return Err(DoviError::InvalidPrefix(format!(
            "T.35: provider_code=0x{provider_code:04X}, oriented_code=0x{oriented_code:08X} 不是 Dolby Vision",
        )));
    }

    let mut br = BitReader::new(&data[6..]);
    let version = br.read_bits(2)?;
    let key_id = br.read_bits(3)?;
    let mut payload_id = br.read_bits(5)?;
    if payload_id == EMDF_PAYLOAD_ID {
        payload_id += read_variable_bits(&mut br, 5)?;
    }
    if version != EMDF_VERSION || key_id != EMDF_KEY_ID {
        return Err(DoviError::InvalidPrefix(format!(
            "EMDF: emdf_version={version}, key_id={key_id} 不受支持",
        )));
    }
    if payload_id != EMDF_PAYLOAD_ID + EMDF_PAYLOAD_ID_EXT {
        return Err(DoviError::InvalidPrefix(format!(
            "EMDF: emdf_payload_id={payload_id} 不是 Dolby Vision RPU",
        )));
    }

    // smploffste, duratione, groupide, codecdatae, discard_unknown_payload
    let flags = br.read_bits(5)?;
    if flags & 0b11110 != 0 {
        return Err(DoviError::InvalidData(format!(
            "EMDF: 不支持的负载配置 0b{:04b}",
            flags >> 1,
        )));
    }

    let size = read_variable_bits(&mut br, 8)?;
    let size = usize::try_from(size)
        .map_err(|_| DoviError::InvalidData(format!("EMDF: 负载长度 {size} 溢出")))?;
    if size > br.bits_left() / 8 {
        return Err(DoviError::TruncatedFrame(format!(
            "EMDF: 声明负载 {} 字节, 剩余 {} 位",
            size,
            br.bits_left(),
        )));
    }

    let mut rpu = Vec::with_capacity(size + 1);
    rpu.push(RPU_PREFIX);
    for _ in 0..size {
        rpu.push(br.read_bits(8)? as u8);
    }
    Ok(rpu)
}

// ============================================================
// metadata OBU
// ============================================================

/// 把 T.35 负载封装为带 obu_size 的 metadata OBU, 负载前补上国家码
pub fn wrap_metadata_obu(t35_payload: &[u8]) -> Vec<u8> {
    // metadata_type + 国家码 + 负载 + trailing_bits
    let obu_size = t35_payload.len() as u64 + 3;

    let mut out = Vec::with_capacity(t35_payload.len() + 8);
    // obu_type = 5, obu_has_size_field = 1
    out.push((OBU_METADATA << 3) | 0x02);
    write_leb128(&mut out, obu_size);
    write_leb128(&mut out, METADATA_TYPE_ITUT_T35);
    out.push(T35_COUNTRY_CODE);
    out.extend_from_slice(t35_payload);
    out.push(0x80);
    out
}

/// 解开 metadata OBU, 返回其中的 T.35 负载 (含国家码与 trailing_bits)
pub fn unwrap_metadata_obu(data: &[u8]) -> DoviResult<&[u8]> {
    let Some(&b0) = data.first() else {
        return Err(DoviError::TruncatedFrame("OBU: 空数据".into()));
    };
    if b0 & 0x80 != 0 {
        return Err(DoviError::InvalidData("OBU: obu_forbidden_bit 非零".into()));
    }
    let obu_type = (b0 >> 3) & 0x0F;
    if obu_type != OBU_METADATA {
        return Err(DoviError::InvalidPrefix(format!(
            "OBU: obu_type={obu_type} 不是 OBU_METADATA",
        )));
    }
    let has_extension = (b0 >> 2) & 1 == 1;
    let has_size = (b0 >> 1) & 1 == 1;

    let mut pos = 1 + usize::from(has_extension);
    if pos > data.len() {
        return Err(DoviError::TruncatedFrame("OBU: 扩展头被截断".into()));
    }

    let end = if has_size {
        let (size, len) = read_leb128(&data[pos..])?;
        pos += len;
        let remaining = (data.len() - pos) as u64;
        if size > remaining {
            return Err(DoviError::TruncatedFrame(format!(
                "OBU: obu_size={size} 超出剩余 {remaining} 字节",
            )));
        }
        pos + size as usize
    } else {
        data.len()
    };

    let (metadata_type, len) = read_leb128(&data[pos..end])?;
    if metadata_type != METADATA_TYPE_ITUT_T35 {
        return Err(DoviError::InvalidPrefix(format!(
            "OBU: metadata_type={metadata_type} 不是 ITU-T T.35",
        )));
    }
    Ok(&data[pos + len..end])
}
