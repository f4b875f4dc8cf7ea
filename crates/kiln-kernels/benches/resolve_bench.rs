//! Benchmark: kernel resolution (cache hit vs module scan vs lazy load) and
//! launch overhead, against the recording driver.

use std::sync::Arc;
use std::time::Instant;

use kiln_kernels::{
    Dim3, HipAdapter, KernelAdapter, KernelArguments, KernelInvocation, RecordingDriver,
};

fn kernel_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Cijk_Ailk_Bljk_SB_MT{i}")).collect()
}

fn adapter_with_modules(names: &[String], modules: usize) -> HipAdapter<RecordingDriver> {
    let adapter = HipAdapter::new(Arc::new(RecordingDriver::new()), "bench");
    for chunk in names.chunks(names.len().div_ceil(modules)) {
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
        adapter
            .load_code_object_bytes(&RecordingDriver::code_object(&refs))
            .unwrap();
    }
    adapter
}

fn bench_cached(names: &[String], iters: usize) -> f64 {
    let adapter = adapter_with_modules(names, 8);
    for name in names {
        adapter.init_kernel(name).unwrap();
    }
    let start = Instant::now();
    for _ in 0..iters {
        for name in names {
            adapter.init_kernel(name).unwrap();
        }
    }
    start.elapsed().as_secs_f64() / (iters * names.len()) as f64
}

fn bench_first_resolve(names: &[String], iters: usize) -> f64 {
    let mut total = 0.0;
    for _ in 0..iters {
        let adapter = adapter_with_modules(names, 8);
        let start = Instant::now();
        for name in names {
            adapter.init_kernel(name).unwrap();
        }
        total += start.elapsed().as_secs_f64();
    }
    total / (iters * names.len()) as f64
}

fn bench_lazy(names: &[String], iters: usize) -> f64 {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(
            dir.path().join(format!("{name}.co")),
            RecordingDriver::code_object(&[name.as_str()]),
        )
        .unwrap();
    }

    let mut total = 0.0;
    for _ in 0..iters {
        let adapter = HipAdapter::new(Arc::new(RecordingDriver::new()), "lazy");
        adapter.initialize_lazy_loading("gfx90a", dir.path()).unwrap();
        let start = Instant::now();
        for name in names {
            adapter.init_kernel(name).unwrap();
        }
        total += start.elapsed().as_secs_f64();
    }
    total / (iters * names.len()) as f64
}

fn bench_launch(names: &[String], iters: usize) -> f64 {
    let adapter = adapter_with_modules(names, 8);
    let mut args = KernelArguments::new();
    args.append("a", 0u64);
    args.append("b", 0u64);
    args.append("m", 512u32);
    let invocations: Vec<_> = names
        .iter()
        .map(|n| {
            KernelInvocation::new(n.as_str(), Dim3::new(16, 16, 1), Dim3::new(256, 1, 1))
                .with_args(args.clone())
        })
        .collect();

    let start = Instant::now();
    for _ in 0..iters {
        for inv in &invocations {
            adapter.launch_kernel(inv).unwrap();
        }
    }
    start.elapsed().as_secs_f64() / (iters * names.len()) as f64
}

fn main() {
    println!("=== Kiln Kernel Resolution Benchmark ===\n");
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:>12}",
        "Kernels", "Cached (us)", "Scan (us)", "Lazy (us)", "Launch (us)"
    );
    println!("{}", "-".repeat(62));

    for &n in &[16usize, 64, 256, 1024] {
        let names = kernel_names(n);
        let iters = if n <= 64 { 200 } else if n <= 256 { 20 } else { 5 };

        let cached = bench_cached(&names, iters * 10);
        let scan = bench_first_resolve(&names, iters);
        let lazy = bench_lazy(&names, iters.min(20));
        let launch = bench_launch(&names, iters);

        println!(
            "{:<10} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
            n,
            cached * 1e6,
            scan * 1e6,
            lazy * 1e6,
            launch * 1e6,
        );
    }
}
