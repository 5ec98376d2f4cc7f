use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use hlsopt::*;

// Representative scenarios: a stencil, a tiled kernel and a dataflow graph.

const STENCIL: &str = r#"
array src[64] : f32
array dst[64] : f32
loop i = 0 to 62 pipeline {
  read src[i]
  read src[i + 1]
  read src[i + 2]
  write dst[i]
}
"#;

const TILED: &str = r#"
array a[32, 32] : f32
array b[32, 32] : f32
loop i = 0 to 32 {
  loop j = 0 to 32 {
    loop k = 0 to 32 step 4 pipeline {
      read a[i, k]
      read a[i, k + 1]
      read a[i, k + 2]
      read a[i, k + 3]
      read b[k, j]
      read b[k + 1, j]
      read b[k + 2, j]
      read b[k + 3, j]
    }
  }
}
"#;

const DATAFLOW: &str = r#"
region top {
  node load() -> (raw)
  node filter(raw) -> (clean)
  node split(clean) -> (l, r)
  node left(l) -> (lo)
  node right(r) -> (ro)
  node join(lo, ro)
}
"#;

fn scenarios() -> [(&'static str, &'static str); 3] {
    [
        ("stencil", STENCIL),
        ("tiled", TILED),
        ("dataflow", DATAFLOW),
    ]
}

/// A single pipelined loop reading `n` consecutive offsets of one array.
fn generate_offsets(n: usize) -> String {
    let mut src = format!(
        "array A[{}] : f32\nloop i = 0 to {} pipeline {{\n",
        4 * n,
        2 * n
    );
    for k in 0..n {
        src.push_str(&format!("  read A[i + {}]\n", k));
    }
    src.push_str("}\n");
    src
}

/// A chain of `n` dataflow nodes (worst case for round count).
fn generate_chain(n: usize) -> String {
    let mut src = String::from("region top {\n");
    for k in 0..n {
        let input = if k == 0 {
            String::new()
        } else {
            format!("b{}", k - 1)
        };
        if k + 1 < n {
            src.push_str(&format!("  node n{}({}) -> (b{})\n", k, input, k));
        } else {
            src.push_str(&format!("  node n{}({})\n", k, input));
        }
    }
    src.push_str("}\n");
    src
}

fn resolved(source: &str) -> ir::Module {
    let program = parser::parse(source)
        .program
        .expect("benchmark scenario must parse");
    let result = resolve::resolve(&program);
    assert!(result.diagnostics.iter().all(|d| !d.is_error()));
    result.module
}

// Full compile latency (parse -> resolve -> partition -> schedule -> legality).
fn bench_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_compile_latency");
    let options = pipeline::Options::default();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let state = pipeline::compile(black_box(source), &options, pipeline::Emit::Report);
                black_box(state.module);
            });
        });
    }

    group.finish();
}

// Partition pass scaling vs number of distinct offsets (quadratic pair scan).
fn bench_partition_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_scaling");

    for n in [2_usize, 8, 32, 128] {
        let source = generate_offsets(n);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}offsets", n)),
            &source,
            |b, source| {
                b.iter_batched(
                    || resolved(source),
                    |mut module| {
                        let r = layout::run_array_partition(black_box(&mut module));
                        black_box(r);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

// Scheduler scaling vs chain length (one node per round).
fn bench_schedule_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_scaling");
    let options = dataflow::ScheduleOptions::default();

    for n in [4_usize, 16, 64, 256] {
        let source = generate_chain(n);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}nodes", n)),
            &source,
            |b, source| {
                b.iter_batched(
                    || resolved(source),
                    |mut module| {
                        let graph = black_box(&mut module.dataflow);
                        let stats = dataflow::schedule_nodes(graph, options);
                        black_box(stats);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_full_compile_latency,
    bench_partition_scaling,
    bench_schedule_scaling,
);
criterion_main!(benches);
