//! 统一错误类型定义.
//!
//! 所有 dovi crate 共用的错误类型, 覆盖位流读取, 封装校验, 语法约束与 profile 转换.

use thiserror::Error;

/// RPU 处理统一错误类型
#[derive(Debug, Error)]
pub enum DoviError {
    /// 无效参数 (调用方传入越界值)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 读取位置越过缓冲区末尾
    #[error("数据不足: 读取越过缓冲区末尾")]
    OutOfData,

    /// 前缀或封装标识不匹配 (0x19, 0x7C01, T.35 代码, OBU 类型)
    #[error("无效前缀: {0}")]
    InvalidPrefix(String),

    /// 帧被截断或帧尾缺失
    #[error("帧被截断: {0}")]
    TruncatedFrame(String),

    /// num_pivots_minus2 超出 [0, 7]
    #[error("无效的 pivot 数量: num_pivots_minus2={0}, 最大为 7")]
    InvalidPivotCount(u64),

    /// mapping_idc 不是多项式 (0) 或 MMR (1)
    #[error("无效的 mapping_idc: {0}")]
    InvalidMappingIdc(u64),

    /// 扩展块长度与级别不匹配
    #[error("无效的扩展块长度: level={level}, length={length}")]
    InvalidExtBlockLength {
        /// 扩展块级别
        level: u8,
        /// 声明的字节长度
        length: u64,
    },

    /// 未知的扩展块级别, 或级别出现在错误的 CM 段中
    #[error("无效的扩展块级别: {0}")]
    InvalidExtBlockLevel(u8),

    /// 源 profile 与转换模式组合不受支持
    #[error("不支持的转换: 源 profile {profile} 无法使用模式 {mode}")]
    UnsupportedSourceProfile {
        /// 推测的源 profile
        profile: u8,
        /// 请求的转换模式
        mode: u8,
    },

    /// CRC32 校验失败
    #[error("CRC32 不匹配: 期望 0x{expected:08X}, 实际 0x{actual:08X}")]
    Crc32Mismatch {
        /// 码流中记录的 CRC
        expected: u32,
        /// 根据负载计算出的 CRC
        actual: u32,
    },

    /// 无效数据 (损坏的码流, 保留位非零, 解析树不一致等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// dovi 统一 Result 类型
pub type DoviResult<T> = Result<T, DoviError>;
