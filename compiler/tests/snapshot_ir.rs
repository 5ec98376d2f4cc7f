// Snapshot tests: lock the textual IR and report formats.
//
// Uses the library API (compile → Display) and compares against inline
// `insta` snapshots. Run `cargo insta review` after intentional output changes.

use hlsopt::pipeline::{compile, Emit, Options};
use hlsopt::report::build_report;

fn compile_ok(source: &str, options: Options, emit: Emit) -> hlsopt::pipeline::CompilationState {
    let state = compile(source, &options, emit);
    assert!(!state.has_error, "errors: {:#?}", state.diagnostics);
    state
}

const MIXED: &str = "\
array A[8] : f32
array B[8, 4] : i32 @ 1
loop i = 0 to 8 pipeline {
  read A[i]
  read A[i + 1]
  read A[i + 2]
  write B[i, 0]
  write B[i, 3]
}
region top {
  node P() -> (b0)
  node Q(b0) -> (b1)
  node R(b1)
}
";

const FAN_OUT: &str = "\
region top {
  node A() -> (buf1)
  node B(buf1) -> (buf2)
  node D(buf1)
  node C(buf2)
}
";

#[test]
fn ir_after_both_passes() {
    let state = compile_ok(MIXED, Options::default(), Emit::Ir);
    let output = state.module.expect("module").to_string();
    insta::assert_snapshot!(output.trim_end(), @r"
array A[8] : f32 layout (d0) -> (d0 mod 3, d0 floordiv 3)
array B[8, 4] : i32 @ 1 layout (d0, d1) -> (0, d1 floordiv 2, d0, d1 mod 2)
loop i = 0 to 8 step 1 pipeline {
  read A[i]
  read A[i + 1]
  read A[i + 2]
  write B[i, 0]
  write B[i, 3]
}
region top legal {
  node P() -> (b0) level 2
  node Q(b0) -> (b1) level 1
  node R(b1) level 0
}
");
}

#[test]
fn layout_text() {
    let state = compile_ok(MIXED, Options::default(), Emit::Layout);
    let output = build_report(&state).expect("report").render_layout();
    insta::assert_snapshot!(output.trim_end(), @r"
A[8]: from reads
  dim 0: cyclic(factor=3) (unique 3, distance 3)
  layout (d0) -> (d0 mod 3, d0 floordiv 3)
B[8, 4]: from writes
  dim 0: none (unique 1, distance 1)
  dim 1: block(factor=2, block=2) (unique 2, distance 4)
  layout (d0, d1) -> (0, d1 floordiv 2, d0, d1 mod 2)
");
}

#[test]
fn report_with_blocked_producer() {
    let state = compile_ok(FAN_OUT, Options::default(), Emit::Report);
    let output = build_report(&state).expect("report").to_string();
    insta::assert_snapshot!(output.trim_end(), @r"
ignore_violations = false

== array partition ==

== dataflow schedule ==
region top (illegal)
  A unscheduled
  B level 1
  D level 0
  C level 0
3 round(s), some nodes unscheduled
");
}

#[test]
fn levels_when_violations_ignored() {
    let state = compile_ok(
        FAN_OUT,
        Options {
            ignore_violations: true,
        },
        Emit::Levels,
    );
    let output = build_report(&state).expect("report").render_levels();
    insta::assert_snapshot!(output.trim_end(), @r"
region top (unchecked)
  A level 2
  B level 1
  D level 0
  C level 0
4 round(s), all nodes scheduled
");
}
