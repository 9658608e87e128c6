//! Properties of descriptor parsing and workload resolution.

use l3_pressure_rs::config::Config;
use l3_pressure_rs::error::Error;
use l3_pressure_rs::geometry::{CacheGeometry, parse_size_descriptor};
use l3_pressure_rs::workload::{StrideRequest, resolve, resolve_stride};
use proptest::prelude::*;
use rstest::rstest;

const PAGE: usize = 4096;

fn config() -> Config {
    Config {
        page_size: Some(PAGE),
        ..Config::default()
    }
}

fn geometry(size_bytes: u64) -> CacheGeometry {
    CacheGeometry { size_bytes }
}

#[rstest]
#[case("0\n", 0)]
#[case("1024\n", 1024)]
#[case("256K\n", 256 * 1024)]
#[case("8192K\n", 8 * 1024 * 1024)]
#[case("30M\n", 30 * 1024 * 1024)]
#[case("2G", 2 * 1024 * 1024 * 1024)]
fn descriptor_examples(#[case] line: &str, #[case] expected: u64) {
    assert_eq!(parse_size_descriptor(line).unwrap(), expected);
}

#[rstest]
#[case(StrideRequest::HalfBlock, Ok(2_097_152))]
#[case(StrideRequest::JustUnderPage, Ok(PAGE - 1))]
#[case(StrideRequest::Explicit(64), Ok(64))]
#[case(StrideRequest::Explicit(1 << 40), Ok(2_097_152))]
#[case(StrideRequest::Explicit(0), Err(0))]
#[case(StrideRequest::Explicit(-7), Err(-7))]
fn eight_mib_at_half_intensity(#[case] stride: StrideRequest, #[case] expected: Result<usize, i64>) {
    let result = resolve(&geometry(8_388_608), 50.0, stride, &config());
    match (result, expected) {
        (Ok(params), Ok(bytes)) => {
            assert_eq!(params.block_size_bytes, 4_194_304);
            assert_eq!(params.stride_bytes, bytes);
        }
        (Err(Error::InvalidStride { stride }), Err(raw)) => assert_eq!(stride, raw),
        (other, expected) => panic!("got {other:?}, expected {expected:?}"),
    }
}

#[test]
fn explicit_minus_one_is_read_as_sentinel_after_clamping() {
    let explicit = resolve_stride(1000, StrideRequest::Explicit(-1), PAGE).unwrap();
    let sentinel = resolve_stride(1000, StrideRequest::HalfBlock, PAGE).unwrap();
    assert_eq!(explicit, sentinel);
    assert_eq!(explicit, 500);
}

/// Clamping to `block / 2` happens before sentinel recognition. Half a block is
/// never negative so the sentinels always survive the clamp, but on tiny blocks
/// they resolve to strides outside `(0, block / 2]`.
#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
fn sentinels_on_tiny_blocks(#[case] block: usize) {
    let half = resolve_stride(block, StrideRequest::HalfBlock, PAGE).unwrap();
    assert_eq!(half, block / 2);

    let under_page = resolve_stride(block, StrideRequest::JustUnderPage, PAGE).unwrap();
    assert_eq!(under_page, PAGE - 1);
    assert!(under_page > block / 2);
}

proptest! {
    #[test]
    fn descriptor_multiplier(value in 0u64..(1 << 20), unit in prop::sample::select(vec!["", "K", "M", "G"])) {
        let multiplier = match unit {
            "K" => 1024,
            "M" => 1024 * 1024,
            "G" => 1024 * 1024 * 1024,
            _ => 1,
        };
        let line = format!("{value}{unit}\n");
        prop_assert_eq!(parse_size_descriptor(&line).unwrap(), value * multiplier);
    }

    #[test]
    fn block_size_is_truncated_product(cache in 0u64..(1 << 36), pct in 0.0f64..=100.0) {
        match resolve(&geometry(cache), pct, StrideRequest::Explicit(1), &config()) {
            Ok(params) => {
                prop_assert_eq!(params.block_size_bytes, (cache as f64 * (pct / 100.0)) as usize);
                prop_assert!(params.stride_within_bounds());
            }
            // a block under two bytes leaves no room for any explicit stride
            Err(Error::InvalidStride { stride }) => {
                prop_assert_eq!(stride, 0);
                prop_assert!(((cache as f64 * (pct / 100.0)) as usize) < 2);
            }
            Err(e) => prop_assert!(false, "unexpected {}", e),
        }
    }

    #[test]
    fn intensity_outside_unit_interval(pct in prop_oneof![-1.0e6f64..-1.0e-9, 100.000_001f64..1.0e6]) {
        let result = resolve(&geometry(1 << 24), pct, StrideRequest::HalfBlock, &config());
        prop_assert!(matches!(result, Err(Error::InvalidIntensity { .. })), "unexpected {:?}", result);
    }

    #[test]
    fn explicit_strides_are_clamped(block in 2usize..(1 << 30), raw in 1i64..(1 << 40)) {
        let stride = resolve_stride(block, StrideRequest::Explicit(raw), PAGE).unwrap();
        prop_assert_eq!(stride as i64, raw.min((block / 2) as i64));
        prop_assert!(stride > 0 && stride <= block / 2);
    }

    #[test]
    fn non_sentinel_non_positive_strides_fail(block in 0usize..(1 << 30), raw in -(1i64 << 40)..=0) {
        prop_assume!(raw != -1 && raw != -2);
        let result = resolve_stride(block, StrideRequest::Explicit(raw), PAGE);
        prop_assert!(matches!(result, Err(Error::InvalidStride { .. })), "unexpected {:?}", result);
    }

    #[test]
    fn half_block_sentinel(block in 0usize..(1 << 40)) {
        prop_assert_eq!(resolve_stride(block, StrideRequest::HalfBlock, PAGE).unwrap(), block / 2);
    }

    #[test]
    fn resolution_is_idempotent(cache in 0u64..(1 << 32), pct in 0.0f64..=100.0, raw in -2i64..(1 << 24)) {
        let first = resolve(&geometry(cache), pct, StrideRequest::from(raw), &config());
        let second = resolve(&geometry(cache), pct, StrideRequest::from(raw), &config());
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "diverging results"),
        }
    }
}
