use proptest::prelude::*;
use qmatmul::matrix::naive::{matmul_8bit_reference, matmul_float_reference};
use qmatmul::matrix::pack::{pack_lhs_8bit, pack_lhs_float, pack_rhs_8bit, pack_rhs_float};
use qmatmul::quant::multiplier::{MAX_EXPONENT, MIN_EXPONENT};
use qmatmul::quant::{multiply_by_quantized_multiplier, quantize_multiplier, rescale_reference};
use qmatmul::{DstType, KernelParamsFloat, KernelPath, Kernels, Multiplier, QuantSpec};

fn dst_type_strategy() -> impl Strategy<Value = DstType> {
    prop_oneof![
        Just(DstType::Int8),
        Just(DstType::Uint8),
        Just(DstType::Int16),
        Just(DstType::Int32),
    ]
}

/// Operands and matching shape.
fn operands_strategy() -> impl Strategy<Value = (usize, usize, usize, Vec<i8>, Vec<i8>)> {
    (1usize..20, 1usize..20, 1usize..24).prop_flat_map(|(rows, cols, depth)| {
        (
            Just(rows),
            Just(cols),
            Just(depth),
            prop::collection::vec(any::<i8>(), rows * depth),
            prop::collection::vec(any::<i8>(), depth * cols),
        )
    })
}

fn available_kernels() -> Vec<Kernels> {
    [KernelPath::Scalar, KernelPath::Avx2]
        .into_iter()
        .filter_map(|path| Kernels::for_path(path).ok())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The scalar rescale equals the exact result whenever the pre-shift
    /// stays inside i32.
    #[test]
    fn prop_scalar_rescale_matches_exact(
        x in any::<i32>(),
        m in 0..=i32::MAX,
        e in MIN_EXPONENT..=MAX_EXPONENT,
    ) {
        let x = x >> e.max(0);
        let expected = rescale_reference(x, m, e);
        prop_assume!(i32::try_from(expected).is_ok());
        prop_assert_eq!(multiply_by_quantized_multiplier(x, m, e) as i64, expected);
    }

    /// Encoding then applying a real multiplier lands within one unit of
    /// the real product.
    #[test]
    fn prop_quantize_multiplier_round_trips(
        real in 1.0e-6f64..100.0,
        x in -100_000i32..100_000,
    ) {
        let (m, e) = quantize_multiplier(real).unwrap();
        prop_assert!((1 << 30..=i32::MAX).contains(&m));
        let got = multiply_by_quantized_multiplier(x, m, e) as f64;
        let want = x as f64 * real;
        prop_assert!((got - want).abs() <= 1.0 + want.abs() * 1.0e-8, "got {} want {}", got, want);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_kernel_8bit_matches_reference(
        (rows, cols, depth, lhs, rhs) in operands_strategy(),
        dst_type in dst_type_strategy(),
        lhs_zero_point in -16i32..16,
        rhs_zero_point in -16i32..16,
        exponent in -24i32..-6,
        per_channel in any::<bool>(),
    ) {
        let mut spec = QuantSpec::new(dst_type);
        spec.lhs_zero_point = lhs_zero_point;
        spec.rhs_zero_point = rhs_zero_point;
        spec.bias = Some((0..rows as i32).map(|i| i * 37 - 300).collect());
        spec.multiplier = if per_channel {
            Multiplier::PerChannel {
                fixedpoint: (0..rows as i32).map(|i| (1 << 30) + i * 7919).collect(),
                exponent: (0..rows as i32).map(|i| exponent + i % 3).collect(),
            }
        } else {
            Multiplier::PerTensor { fixedpoint: 1_431_655_765, exponent }
        };

        let lhs_pack = pack_lhs_8bit(&lhs, rows, depth, lhs_zero_point as i8);
        let rhs_pack = pack_rhs_8bit(&rhs, depth, cols, rhs_zero_point as i8);
        let expected = matmul_8bit_reference(&lhs, &rhs, rows, cols, depth, &spec);

        for kernels in available_kernels() {
            let mut buf = vec![0i32; rows * cols];
            let params = spec.kernel_params(&lhs_pack, &rhs_pack, buf.as_mut_ptr() as *mut u8, rows);
            prop_assert_eq!(params.validate(), Ok(()));
            unsafe { (kernels.kernel_8bit)(&params) };

            let n = rows * cols;
            let got: Vec<i32> = unsafe {
                match dst_type {
                    DstType::Int8 => std::slice::from_raw_parts(buf.as_ptr() as *const i8, n)
                        .iter().map(|&v| v as i32).collect(),
                    DstType::Uint8 => std::slice::from_raw_parts(buf.as_ptr() as *const u8, n)
                        .iter().map(|&v| v as i32).collect(),
                    DstType::Int16 => std::slice::from_raw_parts(buf.as_ptr() as *const i16, n)
                        .iter().map(|&v| v as i32).collect(),
                    DstType::Int32 => buf.clone(),
                }
            };
            prop_assert_eq!(&got, &expected, "path {}", kernels.path);
        }
    }

    #[test]
    fn prop_kernel_float_matches_reference(
        (rows, cols, depth) in (1usize..20, 1usize..20, 1usize..24),
        seed in any::<u32>(),
    ) {
        let value = |i: usize| ((i as u32).wrapping_mul(2_654_435_761) ^ seed) % 17;
        let lhs: Vec<f32> = (0..rows * depth).map(|i| value(i) as f32 * 0.25 - 2.0).collect();
        let rhs: Vec<f32> = (0..depth * cols).map(|i| value(i + 7) as f32 * 0.5 - 4.0).collect();
        let lhs_pack = pack_lhs_float(&lhs, rows, depth);
        let rhs_pack = pack_rhs_float(&rhs, depth, cols);
        let expected = matmul_float_reference(&lhs, &rhs, rows, cols, depth, None, -40.0, 40.0);

        for kernels in available_kernels() {
            let mut dst = vec![0.0f32; rows * cols];
            let mut params = KernelParamsFloat::for_packed(
                &lhs_pack, &rhs_pack, dst.as_mut_ptr(), rows, 0..rows, 0..cols,
            ).unwrap();
            params.clamp_min = -40.0;
            params.clamp_max = 40.0;
            unsafe { (kernels.kernel_float)(&params) };
            prop_assert_eq!(&dst, &expected, "path {}", kernels.path);
        }
    }
}
