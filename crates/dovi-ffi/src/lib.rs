//! # dovi-ffi
//!
//! Dolby Vision RPU C FFI 导出层.
//!
//! 将 `dovi-rpu` 的句柄 API 导出为 C 兼容的函数接口,
//! 编译为 DLL (Windows) / SO (Linux) / dylib (macOS) 供 C/C++ 等语言调用.
//!
//! # 命名规范
//!
//! 所有导出函数以 `dovi_` 前缀命名, 例如:
//! - `dovi_parse_unspec62_nalu()` - 解析 UNSPEC62 NAL
//! - `dovi_write_rpu()` - 写回 RPU 负载
//!
//! # 错误处理
//!
//! 失败的操作返回空指针或 -1, 错误信息通过 `dovi_rpu_get_error()` 取回.
//! 所有函数都接受空指针参数.
//!
//! # 内存管理
//!
//! - 由本库分配的对象必须通过对应的 `dovi_*_free()` 函数释放
//! - 调用方分配的缓冲区由调用方负责释放

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

use dovi_rpu::extension::{
    ExtMetadataBlockLevel1, ExtMetadataBlockLevel2, ExtMetadataBlockLevel3, ExtMetadataBlockLevel4,
    ExtMetadataBlockLevel5, ExtMetadataBlockLevel6, ExtMetadataBlockLevel8, ExtMetadataBlockLevel9,
    ExtMetadataBlockLevel10, ExtMetadataBlockLevel11, ExtMetadataBlockLevel254,
    ExtMetadataBlockLevel255,
};
use dovi_rpu::mapping::MMR_COEFS_PER_ORDER;
use dovi_rpu::{
    CurvePayload, ElType, MmrPiece, NUM_COMPONENTS, PolynomialPiece, ReshapingCurve, RpuDataMapping,
    RpuDataNlq, RpuHandle, RpuList, VdrDmData,
};

// ============================================================
// 版本
// ============================================================

/// 获取库版本号字符串
///
/// 返回的字符串指针为静态分配, 无需释放.
#[unsafe(no_mangle)]
pub extern "C" fn dovi_version() -> *const c_char {
    c"0.1.0".as_ptr()
}

// ============================================================
// 不透明句柄与数据缓冲
// ============================================================

/// RPU 句柄, 对 C 侧不透明
pub struct DoviRpuOpaque {
    handle: RpuHandle,
    /// `handle.error` 的 C 字符串副本
    error: Option<CString>,
}

impl DoviRpuOpaque {
    fn new(handle: RpuHandle) -> Self {
        let mut opaque = Self {
            handle,
            error: None,
        };
        opaque.sync_error();
        opaque
    }

    fn into_raw(self) -> *mut Self {
        Box::into_raw(Box::new(self))
    }

    fn sync_error(&mut self) {
        self.error = self
            .handle
            .last_error()
            .and_then(|e| CString::new(e).ok());
    }
}

/// 字节缓冲
#[repr(C)]
pub struct DoviData {
    pub data: *const u8,
    pub len: usize,
}

impl DoviData {
    fn into_raw(bytes: Vec<u8>) -> *const Self {
        let len = bytes.len();
        let data = Box::into_raw(bytes.into_boxed_slice()) as *const u8;
        Box::into_raw(Box::new(Self { data, len }))
    }
}

/// 把调用方缓冲区转换为切片, 空指针返回 None
///
/// # Safety
///
/// `buf` 非空时必须指向 `len` 个可读字节.
unsafe fn input_slice<'a>(buf: *const u8, len: usize) -> Option<&'a [u8]> {
    if buf.is_null() {
        None
    } else {
        // 安全: 由调用方保证
        Some(unsafe { std::slice::from_raw_parts(buf, len) })
    }
}

/// 在句柄上执行操作并同步错误信息
///
/// # Safety
///
/// `ptr` 为空或为 `dovi_parse_*` 返回且尚未释放的句柄.
unsafe fn with_handle<T>(
    ptr: *mut DoviRpuOpaque,
    f: impl FnOnce(&mut RpuHandle) -> Option<T>,
) -> Option<T> {
    // 安全: 由调用方保证
    let opaque = unsafe { ptr.as_mut() }?;
    let result = f(&mut opaque.handle);
    opaque.sync_error();
    result
}

// ============================================================
// 解析
// ============================================================

/// 解析以 0x19 开头的 RPU 负载
///
/// 总是返回句柄 (除非 `buf` 为空), 失败时句柄只携带错误信息.
///
/// # Safety
///
/// `buf` 必须指向 `len` 个可读字节.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_parse_rpu(buf: *const u8, len: usize) -> *mut DoviRpuOpaque {
    match unsafe { input_slice(buf, len) } {
        Some(data) => DoviRpuOpaque::new(RpuHandle::parse(data)).into_raw(),
        None => ptr::null_mut(),
    }
}

/// 解析 HEVC UNSPEC62 NAL (可带起始码)
///
/// # Safety
///
/// `buf` 必须指向 `len` 个可读字节.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_parse_unspec62_nalu(
    buf: *const u8,
    len: usize,
) -> *mut DoviRpuOpaque {
    match unsafe { input_slice(buf, len) } {
        Some(data) => DoviRpuOpaque::new(RpuHandle::parse_unspec62_nalu(data)).into_raw(),
        None => ptr::null_mut(),
    }
}

/// 解析 AV1 ITU-T T.35 负载
///
/// # Safety
///
/// `buf` 必须指向 `len` 个可读字节.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_parse_itu_t35_dovi_metadata_obu(
    buf: *const u8,
    len: usize,
) -> *mut DoviRpuOpaque {
    match unsafe { input_slice(buf, len) } {
        Some(data) => DoviRpuOpaque::new(RpuHandle::parse_av1_t35_payload(data)).into_raw(),
        None => ptr::null_mut(),
    }
}

/// 释放句柄
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_free(ptr: *mut DoviRpuOpaque) {
    if !ptr.is_null() {
        // 安全: 指针来自 Box::into_raw
        drop(unsafe { Box::from_raw(ptr) });
    }
}

/// 获取最近一次错误, 没有错误时返回空指针
///
/// 返回的字符串由句柄持有, 在下一次操作或释放前有效.
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_get_error(ptr: *const DoviRpuOpaque) -> *const c_char {
    // 安全: 由调用方保证
    match unsafe { ptr.as_ref() }.and_then(|o| o.error.as_ref()) {
        Some(e) => e.as_ptr(),
        None => ptr::null(),
    }
}

// ============================================================
// 写回
// ============================================================

/// 写出 RPU 负载 (0x19 开头, 不含仿真防止字节)
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_write_rpu(ptr: *mut DoviRpuOpaque) -> *const DoviData {
    unsafe { with_handle(ptr, RpuHandle::write) }.map_or(ptr::null(), DoviData::into_raw)
}

/// 写出 UNSPEC62 NAL (不含起始码)
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_write_unspec62_nalu(ptr: *mut DoviRpuOpaque) -> *const DoviData {
    unsafe { with_handle(ptr, RpuHandle::write_unspec62_nalu) }
        .map_or(ptr::null(), DoviData::into_raw)
}

/// 写出 AV1 itu_t_t35_payload_bytes
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_write_av1_rpu_metadata_obu_t35_payload(
    ptr: *mut DoviRpuOpaque,
) -> *const DoviData {
    unsafe { with_handle(ptr, RpuHandle::write_av1_t35_payload) }
        .map_or(ptr::null(), DoviData::into_raw)
}

/// 写出完整的 AV1 metadata OBU
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_write_av1_rpu_metadata_obu_t35_complete(
    ptr: *mut DoviRpuOpaque,
) -> *const DoviData {
    unsafe { with_handle(ptr, RpuHandle::write_av1_t35_obu) }
        .map_or(ptr::null(), DoviData::into_raw)
}

/// 释放 `dovi_write_*` 返回的缓冲
///
/// # Safety
///
/// `data` 为空或为尚未释放的缓冲.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_data_free(data: *const DoviData) {
    if data.is_null() {
        return;
    }
    // 安全: 两层指针均来自 Box::into_raw
    unsafe {
        let data = Box::from_raw(data as *mut DoviData);
        if !data.data.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                data.data as *mut u8,
                data.len,
            )));
        }
    }
}

// ============================================================
// 修改
// ============================================================

/// 按模式转换 (0..=4), 成功返回 0, 失败返回 -1
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_convert_rpu_with_mode(ptr: *mut DoviRpuOpaque, mode: u8) -> i32 {
    status(unsafe { with_handle(ptr, |h| h.convert(mode).then_some(())) })
}

/// 设置 Level 5 活动区域偏移
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_set_active_area_offsets(
    ptr: *mut DoviRpuOpaque,
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
) -> i32 {
    status(unsafe {
        with_handle(ptr, |h| {
            h.set_active_area_offsets(left, right, top, bottom)
                .then_some(())
        })
    })
}

/// 移除 mapping (恒等曲线, 无 NLQ)
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_remove_mapping(ptr: *mut DoviRpuOpaque) -> i32 {
    status(unsafe { with_handle(ptr, |h| h.remove_mapping().then_some(())) })
}

fn status(result: Option<()>) -> i32 {
    if result.is_some() { 0 } else { -1 }
}

// ============================================================
// 头部
// ============================================================

/// 扁平化的 RPU 头部
#[repr(C)]
#[derive(Debug)]
pub struct DoviRpuHeader {
    pub rpu_type: u8,
    pub rpu_format: u16,
    pub vdr_rpu_profile: u8,
    pub vdr_rpu_level: u8,
    pub vdr_seq_info_present_flag: bool,
    pub chroma_resampling_explicit_filter_flag: bool,
    pub coefficient_data_type: u8,
    pub coefficient_log2_denom: u64,
    pub vdr_rpu_normalized_idc: u8,
    pub bl_video_full_range_flag: bool,
    pub bl_bit_depth_minus8: u64,
    pub el_bit_depth_minus8: u64,
    pub vdr_bit_depth_minus8: u64,
    pub spatial_resampling_filter_flag: bool,
    pub reserved_zero_3bits: u8,
    pub el_spatial_resampling_filter_flag: bool,
    pub disable_residual_flag: bool,
    pub vdr_dm_metadata_present_flag: bool,
    pub use_prev_vdr_rpu_flag: bool,
    pub prev_vdr_rpu_id: u64,
    /// 推测的 profile
    pub guessed_profile: u8,
    /// "FEL" / "MEL", 非 profile 7 时为空指针. 静态字符串, 无需释放
    pub el_type: *const c_char,
}

/// 获取扁平化头部, 句柄不含解析树时返回空指针
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_get_header(ptr: *const DoviRpuOpaque) -> *const DoviRpuHeader {
    // 安全: 由调用方保证
    let Some(opaque) = (unsafe { ptr.as_ref() }) else {
        return ptr::null();
    };
    let Some(h) = opaque.handle.header() else {
        return ptr::null();
    };

    let el_type = match opaque.handle.el_type() {
        Some(ElType::Fel) => c"FEL".as_ptr(),
        Some(ElType::Mel) => c"MEL".as_ptr(),
        None => ptr::null(),
    };

    let header = DoviRpuHeader {
        rpu_type: h.rpu_type,
        rpu_format: h.rpu_format,
        vdr_rpu_profile: h.vdr_rpu_profile,
        vdr_rpu_level: h.vdr_rpu_level,
        vdr_seq_info_present_flag: h.vdr_seq_info_present_flag,
        chroma_resampling_explicit_filter_flag: h.chroma_resampling_explicit_filter_flag,
        coefficient_data_type: h.coefficient_data_type,
        coefficient_log2_denom: h.coefficient_log2_denom,
        vdr_rpu_normalized_idc: h.vdr_rpu_normalized_idc,
        bl_video_full_range_flag: h.bl_video_full_range_flag,
        bl_bit_depth_minus8: h.bl_bit_depth_minus8,
        el_bit_depth_minus8: h.el_bit_depth_minus8,
        vdr_bit_depth_minus8: h.vdr_bit_depth_minus8,
        spatial_resampling_filter_flag: h.spatial_resampling_filter_flag,
        reserved_zero_3bits: h.reserved_zero_3bits,
        el_spatial_resampling_filter_flag: h.el_spatial_resampling_filter_flag,
        disable_residual_flag: h.disable_residual_flag,
        vdr_dm_metadata_present_flag: h.vdr_dm_metadata_present_flag,
        use_prev_vdr_rpu_flag: h.use_prev_vdr_rpu_flag,
        prev_vdr_rpu_id: h.prev_vdr_rpu_id,
        guessed_profile: h.guessed_profile(),
        el_type,
    };
    Box::into_raw(Box::new(header))
}

/// 释放头部
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的头部.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_free_header(ptr: *const DoviRpuHeader) {
    if !ptr.is_null() {
        // 安全: 指针来自 Box::into_raw
        drop(unsafe { Box::from_raw(ptr as *mut DoviRpuHeader) });
    }
}

// ============================================================
// mapping 与 DM 视图
// ============================================================

/// 由本库分配的数组, `len` 为 0 时 `data` 不可解引用
#[repr(C)]
pub struct DoviArray<T> {
    pub data: *const T,
    pub len: usize,
}

impl<T> DoviArray<T> {
    fn new(items: Vec<T>) -> Self {
        let len = items.len();
        let data = Box::into_raw(items.into_boxed_slice()) as *const T;
        Self { data, len }
    }

    /// # Safety
    ///
    /// 只能对 `new` 构造的数组调用一次.
    unsafe fn free(&self) {
        // 安全: 指针来自 Box::into_raw
        drop(unsafe {
            Box::from_raw(ptr::slice_from_raw_parts_mut(self.data as *mut T, self.len))
        });
    }
}

/// 单个多项式分段, 未使用的系数位置为 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DoviPolynomialPiece {
    pub poly_order_minus1: u8,
    pub linear_interp_flag: bool,
    pub poly_coef_int: [i64; MAX_POLY_COEFS],
    pub poly_coef: [u64; MAX_POLY_COEFS],
}

/// 单个 MMR 分段, 仅前 `mmr_order_minus1 + 1` 行有效
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DoviMmrPiece {
    pub mmr_order_minus1: u8,
    pub mmr_constant_int: i64,
    pub mmr_constant: u64,
    pub mmr_coef_int: [[i64; MMR_COEFS_PER_ORDER]; MAX_MMR_ORDERS],
    pub mmr_coef: [[u64; MMR_COEFS_PER_ORDER]; MAX_MMR_ORDERS],
}

/// 一条 reshaping 曲线, 按 `mapping_idc` 只有一个分段数组非空
#[repr(C)]
pub struct DoviReshapingCurve {
    pub num_pivots_minus2: u8,
    /// 按码流记录: 首个为绝对值, 其余为增量
    pub pred_pivot_value: DoviArray<u16>,
    /// 0 = 多项式, 1 = MMR
    pub mapping_idc: u8,
    pub polynomial: DoviArray<DoviPolynomialPiece>,
    pub mmr: DoviArray<DoviMmrPiece>,
}

/// NLQ 参数
#[repr(C)]
#[derive(Debug)]
pub struct DoviRpuDataNlq {
    pub nlq_method_idc: u8,
    pub nlq_num_pivots_minus2: u8,
    pub nlq_pred_pivot_value: [u16; 2],
    pub nlq_offset: [u16; NUM_COMPONENTS],
    pub vdr_in_max_int: [u64; NUM_COMPONENTS],
    pub vdr_in_max: [u64; NUM_COMPONENTS],
    pub linear_deadzone_slope_int: [u64; NUM_COMPONENTS],
    pub linear_deadzone_slope: [u64; NUM_COMPONENTS],
    pub linear_deadzone_threshold_int: [u64; NUM_COMPONENTS],
    pub linear_deadzone_threshold: [u64; NUM_COMPONENTS],
}

/// rpu_data_mapping 的副本
#[repr(C)]
pub struct DoviRpuDataMapping {
    pub vdr_rpu_id: u64,
    pub mapping_color_space: u64,
    pub mapping_chroma_format_idc: u64,
    pub num_x_partitions_minus1: u64,
    pub num_y_partitions_minus1: u64,
    /// 按 Y, Cb, Cr 顺序
    pub curves: [DoviReshapingCurve; NUM_COMPONENTS],
    /// 非双层 profile 时为空指针
    pub nlq: *const DoviRpuDataNlq,
}

/// 多项式最多 3 个系数 (二次)
const MAX_POLY_COEFS: usize = 3;

/// MMR 最多 3 阶
const MAX_MMR_ORDERS: usize = 3;

impl From<&PolynomialPiece> for DoviPolynomialPiece {
    fn from(piece: &PolynomialPiece) -> Self {
        let mut out = Self {
            poly_order_minus1: piece.poly_order_minus1,
            linear_interp_flag: piece.linear_interp_flag,
            ..Default::default()
        };
        for (dst, src) in out.poly_coef_int.iter_mut().zip(&piece.poly_coef_int) {
            *dst = *src;
        }
        for (dst, src) in out.poly_coef.iter_mut().zip(&piece.poly_coef) {
            *dst = *src;
        }
        out
    }
}

impl From<&MmrPiece> for DoviMmrPiece {
    fn from(piece: &MmrPiece) -> Self {
        let mut out = Self {
            mmr_order_minus1: piece.mmr_order_minus1,
            mmr_constant_int: piece.mmr_constant_int,
            mmr_constant: piece.mmr_constant,
            ..Default::default()
        };
        for (dst, src) in out.mmr_coef_int.iter_mut().zip(&piece.mmr_coef_int) {
            *dst = *src;
        }
        for (dst, src) in out.mmr_coef.iter_mut().zip(&piece.mmr_coef) {
            *dst = *src;
        }
        out
    }
}

impl From<&ReshapingCurve> for DoviReshapingCurve {
    fn from(curve: &ReshapingCurve) -> Self {
        let (mapping_idc, polynomial, mmr): (u8, Vec<DoviPolynomialPiece>, Vec<DoviMmrPiece>) =
            match &curve.payload {
                CurvePayload::Polynomial(pieces) => {
                    (0, pieces.iter().map(Into::into).collect(), Vec::new())
                }
                CurvePayload::Mmr(pieces) => {
                    (1, Vec::new(), pieces.iter().map(Into::into).collect())
                }
            };
        Self {
            num_pivots_minus2: curve.num_pivots_minus2,
            pred_pivot_value: DoviArray::new(curve.pred_pivot_value.clone()),
            mapping_idc,
            polynomial: DoviArray::new(polynomial),
            mmr: DoviArray::new(mmr),
        }
    }
}

impl From<&RpuDataNlq> for DoviRpuDataNlq {
    fn from(nlq: &RpuDataNlq) -> Self {
        Self {
            nlq_method_idc: nlq.nlq_method_idc,
            nlq_num_pivots_minus2: nlq.nlq_num_pivots_minus2,
            nlq_pred_pivot_value: nlq.nlq_pred_pivot_value,
            nlq_offset: nlq.nlq_offset,
            vdr_in_max_int: nlq.vdr_in_max_int,
            vdr_in_max: nlq.vdr_in_max,
            linear_deadzone_slope_int: nlq.linear_deadzone_slope_int,
            linear_deadzone_slope: nlq.linear_deadzone_slope,
            linear_deadzone_threshold_int: nlq.linear_deadzone_threshold_int,
            linear_deadzone_threshold: nlq.linear_deadzone_threshold,
        }
    }
}

impl From<&RpuDataMapping> for DoviRpuDataMapping {
    fn from(mapping: &RpuDataMapping) -> Self {
        Self {
            vdr_rpu_id: mapping.vdr_rpu_id,
            mapping_color_space: mapping.mapping_color_space,
            mapping_chroma_format_idc: mapping.mapping_chroma_format_idc,
            num_x_partitions_minus1: mapping.num_x_partitions_minus1,
            num_y_partitions_minus1: mapping.num_y_partitions_minus1,
            curves: std::array::from_fn(|i| (&mapping.curves[i]).into()),
            nlq: boxed(mapping.nlq.as_ref().map(DoviRpuDataNlq::from)),
        }
    }
}

/// 获取 mapping 副本, 句柄不含 mapping (解析失败或沿用上一 RPU) 时返回空指针
///
/// 副本与句柄相互独立, 必须通过 `dovi_rpu_free_data_mapping()` 释放.
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_get_data_mapping(
    ptr: *const DoviRpuOpaque,
) -> *const DoviRpuDataMapping {
    // 安全: 由调用方保证
    let mapping = unsafe { ptr.as_ref() }.and_then(|o| o.handle.mapping());
    boxed(mapping.map(DoviRpuDataMapping::from))
}

/// 释放 mapping 副本
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的 mapping 副本.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_free_data_mapping(ptr: *const DoviRpuDataMapping) {
    if ptr.is_null() {
        return;
    }
    // 安全: 所有指针均来自 Box::into_raw
    unsafe {
        let mapping = Box::from_raw(ptr as *mut DoviRpuDataMapping);
        for curve in &mapping.curves {
            curve.pred_pivot_value.free();
            curve.polynomial.free();
            curve.mmr.free();
        }
        free_boxed(mapping.nlq);
    }
}

/// 扩展块副本, 单例级别缺失时为空指针
#[repr(C)]
pub struct DoviDmData {
    /// 两个段中的扩展块总数
    pub num_ext_blocks: u64,
    pub level1: *const ExtMetadataBlockLevel1,
    pub level2: DoviArray<ExtMetadataBlockLevel2>,
    pub level3: *const ExtMetadataBlockLevel3,
    pub level4: *const ExtMetadataBlockLevel4,
    pub level5: *const ExtMetadataBlockLevel5,
    pub level6: *const ExtMetadataBlockLevel6,
    pub level8: DoviArray<ExtMetadataBlockLevel8>,
    pub level9: *const ExtMetadataBlockLevel9,
    pub level10: DoviArray<ExtMetadataBlockLevel10>,
    pub level11: *const ExtMetadataBlockLevel11,
    pub level254: *const ExtMetadataBlockLevel254,
    pub level255: *const ExtMetadataBlockLevel255,
}

/// vdr_dm_data 的副本
#[repr(C)]
pub struct DoviVdrDmData {
    pub compressed: bool,
    pub affected_dm_metadata_id: u64,
    pub current_dm_metadata_id: u64,
    pub scene_refresh_flag: u64,
    pub ycc_to_rgb_coef: [i16; 9],
    pub ycc_to_rgb_offset: [u32; 3],
    pub rgb_to_lms_coef: [i16; 9],
    pub signal_eotf: u16,
    pub signal_eotf_param0: u16,
    pub signal_eotf_param1: u16,
    pub signal_eotf_param2: u32,
    pub signal_bit_depth: u8,
    pub signal_color_space: u8,
    pub signal_chroma_format: u8,
    pub signal_full_range_flag: u8,
    pub source_min_pq: u16,
    pub source_max_pq: u16,
    pub source_diagonal: u16,
    pub dm_data: DoviDmData,
}

impl From<&VdrDmData> for DoviDmData {
    fn from(dm: &VdrDmData) -> Self {
        Self {
            num_ext_blocks: dm.num_ext_blocks() as u64,
            level1: boxed(dm.level1().copied()),
            level2: DoviArray::new(dm.level2().copied().collect()),
            level3: boxed(dm.level3().copied()),
            level4: boxed(dm.level4().copied()),
            level5: boxed(dm.level5().copied()),
            level6: boxed(dm.level6().copied()),
            level8: DoviArray::new(dm.level8().copied().collect()),
            level9: boxed(dm.level9().copied()),
            level10: DoviArray::new(dm.level10().copied().collect()),
            level11: boxed(dm.level11().copied()),
            level254: boxed(dm.level254().copied()),
            level255: boxed(dm.level255().copied()),
        }
    }
}

impl From<&VdrDmData> for DoviVdrDmData {
    fn from(dm: &VdrDmData) -> Self {
        Self {
            compressed: dm.compressed,
            affected_dm_metadata_id: dm.affected_dm_metadata_id,
            current_dm_metadata_id: dm.current_dm_metadata_id,
            scene_refresh_flag: dm.scene_refresh_flag,
            ycc_to_rgb_coef: dm.ycc_to_rgb_coef,
            ycc_to_rgb_offset: dm.ycc_to_rgb_offset,
            rgb_to_lms_coef: dm.rgb_to_lms_coef,
            signal_eotf: dm.signal_eotf,
            signal_eotf_param0: dm.signal_eotf_param0,
            signal_eotf_param1: dm.signal_eotf_param1,
            signal_eotf_param2: dm.signal_eotf_param2,
            signal_bit_depth: dm.signal_bit_depth,
            signal_color_space: dm.signal_color_space,
            signal_chroma_format: dm.signal_chroma_format,
            signal_full_range_flag: dm.signal_full_range_flag,
            source_min_pq: dm.source_min_pq,
            source_max_pq: dm.source_max_pq,
            source_diagonal: dm.source_diagonal,
            dm_data: dm.into(),
        }
    }
}

/// 获取 DM 数据副本, 句柄不含 DM 时返回空指针
///
/// 副本与句柄相互独立, 必须通过 `dovi_rpu_free_vdr_dm_data()` 释放.
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_get_vdr_dm_data(ptr: *const DoviRpuOpaque) -> *const DoviVdrDmData {
    // 安全: 由调用方保证
    let dm = unsafe { ptr.as_ref() }.and_then(|o| o.handle.vdr_dm_data());
    boxed(dm.map(DoviVdrDmData::from))
}

/// 释放 DM 数据副本
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的 DM 副本.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_free_vdr_dm_data(ptr: *const DoviVdrDmData) {
    if ptr.is_null() {
        return;
    }
    // 安全: 所有指针均来自 Box::into_raw
    unsafe {
        let dm = Box::from_raw(ptr as *mut DoviVdrDmData);
        let blocks = &dm.dm_data;
        free_boxed(blocks.level1);
        blocks.level2.free();
        free_boxed(blocks.level3);
        free_boxed(blocks.level4);
        free_boxed(blocks.level5);
        free_boxed(blocks.level6);
        blocks.level8.free();
        free_boxed(blocks.level9);
        blocks.level10.free();
        free_boxed(blocks.level11);
        free_boxed(blocks.level254);
        free_boxed(blocks.level255);
    }
}

fn boxed<T>(value: Option<T>) -> *const T {
    value.map_or(ptr::null(), |v| Box::into_raw(Box::new(v)) as *const T)
}

/// # Safety
///
/// `ptr` 为空或来自 `boxed` 且尚未释放.
unsafe fn free_boxed<T>(ptr: *const T) {
    if !ptr.is_null() {
        // 安全: 指针来自 Box::into_raw
        drop(unsafe { Box::from_raw(ptr as *mut T) });
    }
}

// ============================================================
// 列表
// ============================================================

/// RPU 列表
#[repr(C)]
pub struct DoviRpuOpaqueList {
    /// 句柄数组, 每个元素都非空
    pub list: *const *mut DoviRpuOpaque,
    pub len: usize,
    /// 文件读取或切分失败时的错误, 否则为空指针
    pub error: *const c_char,
}

/// 解析仅包含 UNSPEC62 NAL 的 Annex B 二进制文件
///
/// 单个 RPU 的错误通过各自句柄取回. `path` 为空或不是 UTF-8 时返回空指针.
///
/// # Safety
///
/// `path` 为空或为以 `\0` 结尾的字符串.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_parse_rpu_bin_file(path: *const c_char) -> *const DoviRpuOpaqueList {
    if path.is_null() {
        return ptr::null();
    }
    // 安全: 由调用方保证
    let Ok(path) = unsafe { CStr::from_ptr(path) }.to_str() else {
        log::warn!("dovi_parse_rpu_bin_file: 路径不是有效的 UTF-8");
        return ptr::null();
    };

    let RpuList { rpus, error } = RpuList::parse_file(Path::new(path));
    let handles: Box<[*mut DoviRpuOpaque]> = rpus
        .into_iter()
        .map(|h| DoviRpuOpaque::new(h).into_raw())
        .collect();
    let len = handles.len();
    let error = error
        .and_then(|e| CString::new(e).ok())
        .map_or(ptr::null(), |e| e.into_raw() as *const c_char);

    Box::into_raw(Box::new(DoviRpuOpaqueList {
        list: Box::into_raw(handles) as *const *mut DoviRpuOpaque,
        len,
        error,
    }))
}

/// 释放列表及其中所有句柄
///
/// # Safety
///
/// `ptr` 为空或为尚未释放的列表.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dovi_rpu_list_free(ptr: *const DoviRpuOpaqueList) {
    if ptr.is_null() {
        return;
    }
    // 安全: 所有指针均来自 Box::into_raw / CString::into_raw
    unsafe {
        let list = Box::from_raw(ptr as *mut DoviRpuOpaqueList);
        let handles = Box::from_raw(ptr::slice_from_raw_parts_mut(
            list.list as *mut *mut DoviRpuOpaque,
            list.len,
        ));
        for &h in handles.iter() {
            dovi_rpu_free(h);
        }
        if !list.error.is_null() {
            drop(CString::from_raw(list.error as *mut c_char));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dovi_rpu::DoviRpu;
    use std::io::Write;

    fn sample_nalu() -> Vec<u8> {
        DoviRpu::profile81_default().write_unspec62_nalu().unwrap()
    }

    unsafe fn data_to_vec(data: *const DoviData) -> Vec<u8> {
        unsafe {
            let d = &*data;
            std::slice::from_raw_parts(d.data, d.len).to_vec()
        }
    }

    #[test]
    fn test_version() {
        let v = unsafe { CStr::from_ptr(dovi_version()) };
        assert_eq!(v.to_str().unwrap(), "0.1.0");
    }

    #[test]
    fn test_null_tolerance() {
        unsafe {
            assert!(dovi_parse_rpu(ptr::null(), 10).is_null());
            assert!(dovi_rpu_get_error(ptr::null()).is_null());
            assert!(dovi_write_rpu(ptr::null_mut()).is_null());
            assert!(dovi_rpu_get_header(ptr::null()).is_null());
            assert_eq!(dovi_convert_rpu_with_mode(ptr::null_mut(), 2), -1);
            assert_eq!(dovi_rpu_remove_mapping(ptr::null_mut()), -1);
            assert!(dovi_parse_rpu_bin_file(ptr::null()).is_null());
            dovi_rpu_free(ptr::null_mut());
            dovi_data_free(ptr::null());
            dovi_rpu_free_header(ptr::null());
            assert!(dovi_rpu_get_data_mapping(ptr::null()).is_null());
            assert!(dovi_rpu_get_vdr_dm_data(ptr::null()).is_null());
            dovi_rpu_free_data_mapping(ptr::null());
            dovi_rpu_free_vdr_dm_data(ptr::null());
            dovi_rpu_list_free(ptr::null());
        }
    }

    #[test]
    fn test_parse_write_roundtrip() {
        let nal = sample_nalu();
        unsafe {
            let rpu = dovi_parse_unspec62_nalu(nal.as_ptr(), nal.len());
            assert!(!rpu.is_null());
            assert!(dovi_rpu_get_error(rpu).is_null());

            let out = dovi_write_unspec62_nalu(rpu);
            assert_eq!(data_to_vec(out), nal);
            dovi_data_free(out);

            let payload = dovi_write_av1_rpu_metadata_obu_t35_payload(rpu);
            let bytes = data_to_vec(payload);
            dovi_data_free(payload);
            let from_av1 = dovi_parse_itu_t35_dovi_metadata_obu(bytes.as_ptr(), bytes.len());
            assert!(dovi_rpu_get_error(from_av1).is_null());
            dovi_rpu_free(from_av1);

            let obu = dovi_write_av1_rpu_metadata_obu_t35_complete(rpu);
            assert_eq!(data_to_vec(obu)[0], 0x2A);
            dovi_data_free(obu);

            dovi_rpu_free(rpu);
        }
    }

    #[test]
    fn test_header_and_convert() {
        let nal = sample_nalu();
        unsafe {
            let rpu = dovi_parse_unspec62_nalu(nal.as_ptr(), nal.len());
            let header = dovi_rpu_get_header(rpu);
            assert_eq!((*header).guessed_profile, 8);
            assert!((*header).el_type.is_null());
            dovi_rpu_free_header(header);

            assert_eq!(dovi_convert_rpu_with_mode(rpu, 1), 0);
            let header = dovi_rpu_get_header(rpu);
            assert_eq!((*header).guessed_profile, 7);
            assert_eq!(CStr::from_ptr((*header).el_type).to_str().unwrap(), "MEL");
            dovi_rpu_free_header(header);

            assert_eq!(dovi_convert_rpu_with_mode(rpu, 7), -1);
            assert!(!dovi_rpu_get_error(rpu).is_null());

            assert_eq!(dovi_rpu_set_active_area_offsets(rpu, 0, 0, 138, 138), 0);
            assert_eq!(dovi_rpu_remove_mapping(rpu), 0);
            dovi_rpu_free(rpu);
        }
    }

    #[test]
    fn test_data_mapping_outlives_handle() {
        let nal = sample_nalu();
        unsafe {
            let rpu = dovi_parse_unspec62_nalu(nal.as_ptr(), nal.len());
            assert_eq!(dovi_convert_rpu_with_mode(rpu, 1), 0);
            let mapping = dovi_rpu_get_data_mapping(rpu);
            dovi_rpu_free(rpu);

            assert!(!mapping.is_null());
            let m = &*mapping;
            for curve in &m.curves {
                assert_eq!(curve.mapping_idc, 0);
                assert_eq!(curve.mmr.len, 0);
                assert_eq!(curve.polynomial.len, 1);
                let pivots = std::slice::from_raw_parts(
                    curve.pred_pivot_value.data,
                    curve.pred_pivot_value.len,
                );
                assert_eq!(pivots, &[0, 1023]);
                let piece = &*curve.polynomial.data;
                assert_eq!(piece.poly_coef_int, [0, 1, 0]);
            }
            assert!(!m.nlq.is_null());
            assert_eq!((*m.nlq).vdr_in_max_int, [1; NUM_COMPONENTS]);
            dovi_rpu_free_data_mapping(mapping);
        }
    }

    #[test]
    fn test_data_mapping_mmr_curve() {
        let mut rpu = DoviRpu::profile81_default();
        if let Some(mapping) = rpu.rpu_data_mapping.as_mut() {
            let mut row = [0i64; MMR_COEFS_PER_ORDER];
            row[0] = 3;
            mapping.curves[1].payload = CurvePayload::Mmr(vec![MmrPiece {
                mmr_order_minus1: 1,
                mmr_constant_int: -2,
                mmr_constant: 5,
                mmr_coef_int: vec![row, row],
                mmr_coef: vec![[7; MMR_COEFS_PER_ORDER]; 2],
            }]);
        }
        let nal = rpu.write_unspec62_nalu().unwrap();
        unsafe {
            let handle = dovi_parse_unspec62_nalu(nal.as_ptr(), nal.len());
            assert!(dovi_rpu_get_error(handle).is_null());
            let mapping = dovi_rpu_get_data_mapping(handle);
            let curve = &(*mapping).curves[1];
            assert_eq!(curve.mapping_idc, 1);
            assert_eq!(curve.polynomial.len, 0);
            assert_eq!(curve.mmr.len, 1);
            let piece = &*curve.mmr.data;
            assert_eq!(piece.mmr_constant_int, -2);
            assert_eq!(piece.mmr_coef_int[1][0], 3);
            assert_eq!(piece.mmr_coef[2], [0; MMR_COEFS_PER_ORDER]);
            assert!((*mapping).nlq.is_null());
            dovi_rpu_free_data_mapping(mapping);
            dovi_rpu_free(handle);
        }
    }

    #[test]
    fn test_vdr_dm_data_outlives_handle() {
        let nal = sample_nalu();
        unsafe {
            let rpu = dovi_parse_unspec62_nalu(nal.as_ptr(), nal.len());
            assert_eq!(dovi_rpu_set_active_area_offsets(rpu, 0, 0, 138, 138), 0);
            let dm = dovi_rpu_get_vdr_dm_data(rpu);
            dovi_rpu_free(rpu);

            assert!(!dm.is_null());
            let d = &*dm;
            assert!(!d.compressed);
            assert_eq!(d.signal_bit_depth, 12);
            let blocks = &d.dm_data;
            assert_eq!(blocks.num_ext_blocks, 3);
            assert!(blocks.level1.is_null());
            assert_eq!(blocks.level2.len, 0);
            assert_eq!((*blocks.level5).offsets(), [0, 0, 138, 138]);
            assert_eq!((*blocks.level6).max_content_light_level, 1000);
            assert_eq!((*blocks.level254).dm_version_index, 2);
            dovi_rpu_free_vdr_dm_data(dm);
        }
    }

    #[test]
    fn test_parse_failure_sets_error() {
        let bad = [0x7C, 0x01, 0x19, 0x08, 0x09];
        unsafe {
            let rpu = dovi_parse_unspec62_nalu(bad.as_ptr(), bad.len());
            assert!(!rpu.is_null());
            assert!(!dovi_rpu_get_error(rpu).is_null());
            assert!(dovi_rpu_get_header(rpu).is_null());
            assert!(dovi_rpu_get_data_mapping(rpu).is_null());
            assert!(dovi_rpu_get_vdr_dm_data(rpu).is_null());
            assert!(dovi_write_rpu(rpu).is_null());
            dovi_rpu_free(rpu);
        }
    }

    #[test]
    fn test_parse_bin_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..3 {
            file.write_all(&[0, 0, 0, 1]).unwrap();
            file.write_all(&sample_nalu()).unwrap();
        }
        file.flush().unwrap();

        let path = CString::new(file.path().to_str().unwrap()).unwrap();
        unsafe {
            let list = dovi_parse_rpu_bin_file(path.as_ptr());
            assert!(!list.is_null());
            assert!((*list).error.is_null());
            assert_eq!((*list).len, 3);
            let first = *(*list).list;
            assert!(dovi_rpu_get_error(first).is_null());
            dovi_rpu_list_free(list);

            let missing = CString::new("/nonexistent/dovi.bin").unwrap();
            let list = dovi_parse_rpu_bin_file(missing.as_ptr());
            assert_eq!((*list).len, 0);
            assert!(!(*list).error.is_null());
            dovi_rpu_list_free(list);
        }
    }
}
