//! 比特流读取器.
//!
//! 提供从 RPU 负载中按位读取数据的能力, 包括定宽字段与 Exp-Golomb 变长字段.
//!
//! 按大端位序读取 (MSB first). 读取器只持有位置与长度, 不共享任何全局状态,
//! 因此多个独立缓冲区可以并发解析.

use crate::{DoviError, DoviResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use dovi_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 当前是否位于字节边界
    pub fn is_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 读取 1 位标志
    pub fn read_flag(&mut self) -> DoviResult<bool> {
        if self.byte_pos >= self.data.len() {
            return Err(DoviError::OutOfData);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit == 1)
    }

    /// 读取 N 个位 (最多 64 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> DoviResult<u64> {
        if n == 0 {
            return Ok(0);
        }
        if n > 64 {
            return Err(DoviError::InvalidArgument(format!(
                "read_bits: n={} 超过 64 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(DoviError::OutOfData);
        }

        let mut result: u64 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u64::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 位有符号整数 (二进制补码)
    pub fn read_signed(&mut self, n: u32) -> DoviResult<i64> {
        let val = self.read_bits(n)?;
        if n == 0 {
            return Ok(0);
        }
        if n >= 64 {
            return Ok(val as i64);
        }
        // 符号扩展
        if (val >> (n - 1)) & 1 != 0 {
            Ok(val as i64 | !((1i64 << n) - 1))
        } else {
            Ok(val as i64)
        }
    }

    /// 读取无符号 Exp-Golomb 编码 ue(v)
    pub fn read_ue(&mut self) -> DoviResult<u64> {
        let mut leading_zeros = 0u32;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 63 {
                return Err(DoviError::InvalidData("Exp-Golomb 过长".into()));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1) + suffix)
    }

    /// 读取有符号 Exp-Golomb 编码 se(v)
    ///
    /// 映射: 0, 1, -1, 2, -2, ...
    pub fn read_se(&mut self) -> DoviResult<i64> {
        let k = i128::from(self.read_ue()?);
        let value = if k & 1 == 1 { (k + 1) / 2 } else { -(k / 2) };
        i64::try_from(value).map_err(|_| DoviError::InvalidData("se(v) 超出 i64 范围".into()))
    }

    /// 读取到下一个字节边界, 返回被跳过的位的值
    ///
    /// 已在字节边界时返回 0 且不移动位置.
    pub fn read_alignment_bits(&mut self) -> DoviResult<u8> {
        if self.bit_pos == 0 {
            return Ok(0);
        }
        let n = 8 - self.bit_pos as u32;
        Ok(self.read_bits(n)? as u8)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> DoviResult<()> {
        if n > self.bits_left() {
            return Err(DoviError::OutOfData);
        }

        let total_bits = self.bit_pos as usize + n;
        self.byte_pos += total_bits / 8;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> DoviResult<&'a [u8]> {
        if self.bit_pos != 0 {
            return Err(DoviError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }

        let end = self.byte_pos + n;
        if end > self.data.len() {
            return Err(DoviError::OutOfData);
        }

        let slice = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(slice)
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
