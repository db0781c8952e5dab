//! Benchmark runner for the 8×8 kernels.

use anyhow::{Result, bail};
use clap::Parser;
use log::info;
use qmatmul::matrix::pack::{pack_lhs_8bit, pack_lhs_float, pack_rhs_8bit, pack_rhs_float};
use qmatmul::quant::quantize_multiplier;
use qmatmul::{DstType, KernelParamsFloat, KernelPath, Kernels, Multiplier, QuantSpec};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark the quantized and float 8x8 kernels", long_about = None)]
struct Args {
    /// Square output sizes to run, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = [64, 256, 512])]
    sizes: Vec<usize>,

    /// Reduction depth
    #[arg(long, default_value_t = 512)]
    depth: usize,

    /// Timed runs per measurement
    #[arg(long, default_value_t = 5)]
    iterations: usize,

    /// Only run this kernel path (avx2 or scalar)
    #[arg(long)]
    path: Option<KernelPath>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.iterations == 0 {
        bail!("--iterations must be at least 1");
    }
    if args.depth == 0 || args.sizes.contains(&0) {
        bail!("sizes and depth must be non-zero");
    }

    let paths: Vec<Kernels> = match args.path {
        Some(path) => vec![Kernels::for_path(path)?],
        None => [KernelPath::Scalar, KernelPath::Avx2]
            .into_iter()
            .filter_map(|path| Kernels::for_path(path).ok())
            .collect(),
    };
    info!(
        "benchmarking paths: {:?}",
        paths.iter().map(|k| k.path).collect::<Vec<_>>()
    );

    println!("=== 8×8 Kernel Benchmark ===\n");
    println!("Depth: {}, iterations: {}\n", args.depth, args.iterations);

    for &size in &args.sizes {
        println!("Output: {}×{}", size, size);
        println!("{}", "-".repeat(60));

        let results = bench_size(size, size, args.depth, args.iterations, &paths)?;
        for (name, time_ms, gops) in results {
            println!("{:24} {:9.3} ms  {:7.2} GOP/s", name, time_ms, gops);
        }
        println!();
    }
    Ok(())
}

fn bench_size(
    rows: usize,
    cols: usize,
    depth: usize,
    iterations: usize,
    paths: &[Kernels],
) -> Result<Vec<(String, f64, f64)>> {
    let lhs: Vec<i8> = (0..rows * depth).map(|i| (i % 251) as u8 as i8).collect();
    let rhs: Vec<i8> = (0..depth * cols).map(|i| (i % 241) as u8 as i8).collect();
    let lhs_pack = pack_lhs_8bit(&lhs, rows, depth, 3);
    let rhs_pack = pack_rhs_8bit(&rhs, depth, cols, -5);

    let (fixedpoint, exponent) = match quantize_multiplier(1.0 / (depth as f64 * 64.0)) {
        Some(m) => m,
        None => bail!("cannot encode rescale factor for depth {}", depth),
    };
    let mut spec = QuantSpec::new(DstType::Int8);
    spec.lhs_zero_point = 3;
    spec.rhs_zero_point = -5;
    spec.dst_zero_point = 1;
    spec.multiplier = Multiplier::PerTensor {
        fixedpoint,
        exponent,
    };

    let lhs_f: Vec<f32> = lhs.iter().map(|&v| v as f32 / 128.0).collect();
    let rhs_f: Vec<f32> = rhs.iter().map(|&v| v as f32 / 128.0).collect();
    let lhs_pack_f = pack_lhs_float(&lhs_f, rows, depth);
    let rhs_pack_f = pack_rhs_float(&rhs_f, depth, cols);

    let ops = 2.0 * (rows * cols * depth) as f64;
    let mut results = Vec::new();
    let mut first_8bit: Option<Vec<i8>> = None;
    let mut first_float: Option<Vec<f32>> = None;

    for kernels in paths {
        let mut dst = vec![0i8; rows * cols];
        let params = spec.kernel_params(&lhs_pack, &rhs_pack, dst.as_mut_ptr() as *mut u8, rows);
        params.validate()?;
        // SAFETY: validated descriptor over buffers that live for the whole loop.
        let time = time_it(iterations, || unsafe { (kernels.kernel_8bit)(&params) });
        results.push((format!("int8 {}", kernels.path), time * 1000.0, ops / time / 1e9));
        if first_8bit.is_none() {
            first_8bit = Some(dst);
        } else if first_8bit.as_ref() != Some(&dst) {
            bail!("int8 {} disagrees with the first path", kernels.path);
        }

        let mut dst = vec![0.0f32; rows * cols];
        let mut params = KernelParamsFloat::for_packed(
            &lhs_pack_f,
            &rhs_pack_f,
            dst.as_mut_ptr(),
            rows,
            0..rows,
            0..cols,
        )?;
        params.clamp_min = -1.0e4;
        params.clamp_max = 1.0e4;
        params.validate()?;
        // SAFETY: as above.
        let time = time_it(iterations, || unsafe { (kernels.kernel_float)(&params) });
        results.push((format!("f32 {}", kernels.path), time * 1000.0, ops / time / 1e9));
        if first_float.is_none() {
            first_float = Some(dst);
        } else if first_float.as_ref() != Some(&dst) {
            bail!("f32 {} disagrees with the first path", kernels.path);
        }
    }
    Ok(results)
}

/// Average seconds per call after one warmup call.
fn time_it<F: FnMut()>(iterations: usize, mut f: F) -> f64 {
    f();
    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    start.elapsed().as_secs_f64() / iterations as f64
}
