//! # Workload parameters
//!
//! Turns an intensity percentage and a requested stride into the arena size and
//! the copy chunk used by the traffic loop.
//!
//! Stride requests come in three flavours: an explicit byte count, "half the
//! block", and "one byte under a page" (the latter sidesteps page-granular copy
//! fast paths). On the command line the two derived flavours are spelled `-1` and
//! `-2`. Resolution clamps the raw request to half the block *before* looking for
//! those sentinels, exactly in that order.
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format_size;
use crate::geometry::CacheGeometry;
use log::info;
use std::fmt;

/// How the copy stride should be derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideRequest {
    /// Literal chunk size in bytes. Clamped to half the block.
    Explicit(i64),
    /// Half of the block, i.e. one chunk per pass
    HalfBlock,
    /// `page_size - 1` bytes
    JustUnderPage,
}

impl StrideRequest {
    pub const HALF_BLOCK_SENTINEL: i64 = -1;
    pub const JUST_UNDER_PAGE_SENTINEL: i64 = -2;

    /// Integer form of the request, sentinels included
    pub fn raw(self) -> i64 {
        match self {
            StrideRequest::Explicit(bytes) => bytes,
            StrideRequest::HalfBlock => Self::HALF_BLOCK_SENTINEL,
            StrideRequest::JustUnderPage => Self::JUST_UNDER_PAGE_SENTINEL,
        }
    }
}

impl From<i64> for StrideRequest {
    fn from(raw: i64) -> Self {
        match raw {
            Self::HALF_BLOCK_SENTINEL => StrideRequest::HalfBlock,
            Self::JUST_UNDER_PAGE_SENTINEL => StrideRequest::JustUnderPage,
            bytes => StrideRequest::Explicit(bytes),
        }
    }
}

impl fmt::Display for StrideRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrideRequest::Explicit(bytes) => write!(f, "{bytes}"),
            StrideRequest::HalfBlock => write!(f, "half-block"),
            StrideRequest::JustUnderPage => write!(f, "just-under-page"),
        }
    }
}

/// Concrete shape of the memory traffic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadParameters {
    /// Fraction of the L3 to occupy, in `[0, 1]`
    pub intensity: f64,
    /// Arena length, `floor(cache_size * intensity)`
    pub block_size_bytes: usize,
    /// Chunk copied per step of the strided pass
    pub stride_bytes: usize,
}

impl WorkloadParameters {
    /// `0 < stride <= block / 2`. Always true for explicit strides; the two
    /// sentinel forms can break it on very small blocks.
    pub fn stride_within_bounds(&self) -> bool {
        self.stride_bytes > 0 && self.stride_bytes <= self.block_size_bytes / 2
    }
}

/// Resolve intensity and stride against the detected cache geometry
pub fn resolve(
    geometry: &CacheGeometry,
    intensity_percent: f64,
    stride: StrideRequest,
    config: &Config,
) -> Result<WorkloadParameters> {
    let intensity = intensity_percent / 100.0;
    // also rejects NaN
    if !(0.0..=1.0).contains(&intensity) {
        return Err(Error::InvalidIntensity { intensity });
    }

    let block_size_bytes = (geometry.size_bytes as f64 * intensity) as usize;
    let stride_bytes = resolve_stride(block_size_bytes, stride, config.page_size())?;

    info!(
        "For intensity = {:6.4}, block size = {} bytes ({}), stride = {} bytes (requested {})",
        intensity,
        block_size_bytes,
        format_size(block_size_bytes as f32),
        stride_bytes,
        stride
    );

    Ok(WorkloadParameters {
        intensity,
        block_size_bytes,
        stride_bytes,
    })
}

/// Clamp the raw request to half the block, then interpret sentinels.
pub fn resolve_stride(
    block_size_bytes: usize,
    stride: StrideRequest,
    page_size: usize,
) -> Result<usize> {
    let half = i64::try_from(block_size_bytes / 2).unwrap_or(i64::MAX);
    let clamped = half.min(stride.raw());

    match clamped {
        StrideRequest::HALF_BLOCK_SENTINEL => Ok(block_size_bytes / 2),
        StrideRequest::JUST_UNDER_PAGE_SENTINEL => Ok(page_size.saturating_sub(1)),
        s if s <= 0 => Err(Error::InvalidStride { stride: s }),
        s => Ok(s as usize),
    }
}
