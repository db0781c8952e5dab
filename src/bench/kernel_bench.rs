use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use qmatmul::matrix::pack::{pack_lhs_8bit, pack_lhs_float, pack_rhs_8bit, pack_rhs_float};
use qmatmul::{DstType, KernelParamsFloat, KernelPath, Kernels, Multiplier, QuantSpec};

const DEPTH: usize = 256;

fn available_paths() -> Vec<Kernels> {
    [KernelPath::Scalar, KernelPath::Avx2]
        .into_iter()
        .filter_map(|path| Kernels::for_path(path).ok())
        .collect()
}

fn benchmark_8bit(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_8bit");

    for size in [16, 64, 128] {
        let lhs: Vec<i8> = (0..size * DEPTH).map(|i| (i % 199) as u8 as i8).collect();
        let rhs: Vec<i8> = (0..DEPTH * size).map(|i| (i % 157) as u8 as i8).collect();
        let lhs_pack = pack_lhs_8bit(&lhs, size, DEPTH, 2);
        let rhs_pack = pack_rhs_8bit(&rhs, DEPTH, size, -1);

        let mut spec = QuantSpec::new(DstType::Int8);
        spec.lhs_zero_point = 2;
        spec.rhs_zero_point = -1;
        spec.multiplier = Multiplier::PerTensor {
            fixedpoint: 1 << 30,
            exponent: -12,
        };
        let mut dst = vec![0i8; size * size];
        let params = spec.kernel_params(&lhs_pack, &rhs_pack, dst.as_mut_ptr() as *mut u8, size);

        group.throughput(Throughput::Elements((2 * size * size * DEPTH) as u64));
        for kernels in available_paths() {
            group.bench_with_input(
                BenchmarkId::new(kernels.path.to_string(), size),
                &params,
                |b, params| b.iter(|| unsafe { (kernels.kernel_8bit)(black_box(params)) }),
            );
        }
    }
    group.finish();
}

fn benchmark_float(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_float");

    for size in [16, 64, 128] {
        let lhs: Vec<f32> = (0..size * DEPTH).map(|i| (i % 13) as f32 * 0.1).collect();
        let rhs: Vec<f32> = (0..DEPTH * size).map(|i| (i % 7) as f32 * 0.2).collect();
        let lhs_pack = pack_lhs_float(&lhs, size, DEPTH);
        let rhs_pack = pack_rhs_float(&rhs, DEPTH, size);

        let mut dst = vec![0.0f32; size * size];
        let params = KernelParamsFloat::for_packed(
            &lhs_pack,
            &rhs_pack,
            dst.as_mut_ptr(),
            size,
            0..size,
            0..size,
        )
        .expect("full-range descriptor");

        group.throughput(Throughput::Elements((2 * size * size * DEPTH) as u64));
        for kernels in available_paths() {
            group.bench_with_input(
                BenchmarkId::new(kernels.path.to_string(), size),
                &params,
                |b, params| b.iter(|| unsafe { (kernels.kernel_float)(black_box(params)) }),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_8bit, benchmark_float);
criterion_main!(benches);
