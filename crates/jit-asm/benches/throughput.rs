//! Performance benchmarks for `jit_asm`.
//!
//! Measures:
//! - Single instruction emission latency
//! - Whole-function generation throughput
//! - Label-heavy workloads (patch pass cost)
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use jit_asm::{Assembler, Cond, Mem, Register};

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");

    group.bench_function("mov_reg_imm", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.mov(black_box(Register::Rax), black_box(0x1234)).unwrap();
            asm.finish().unwrap()
        })
    });

    group.bench_function("add_reg_reg", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.add(black_box(Register::Rax), black_box(Register::Rbx))
                .unwrap();
            asm.finish().unwrap()
        })
    });

    group.bench_function("mov_sib_mem", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.mov(
                Mem::base(Register::Rax).index(Register::Rcx, 8).disp(0x10),
                black_box(Register::Rdx),
            )
            .unwrap();
            asm.finish().unwrap()
        })
    });

    group.finish();
}

// ─── Whole-Function Throughput ───────────────────────────────────────────────

fn bench_function_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("function_generation");
    const BODY_OPS: u64 = 256;
    group.throughput(Throughput::Elements(BODY_OPS));

    group.bench_function("alu_body_256", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.prologue();
            asm.xor(Register::Rax, Register::Rax).unwrap();
            for i in 0..BODY_OPS {
                asm.add(Register::Rax, black_box(i as i64 & 0x7F)).unwrap();
            }
            asm.ret();
            asm.finish().unwrap()
        })
    });

    group.bench_function("spill_body_256", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.prologue();
            asm.spill_many(4, |asm, slots| {
                for i in 0..BODY_OPS as usize {
                    asm.mov(slots[i % 4], black_box(i as i64))?;
                }
                Ok(())
            })
            .unwrap();
            asm.ret();
            asm.finish().unwrap()
        })
    });

    group.finish();
}

// ─── Label-Heavy Workloads ───────────────────────────────────────────────────

fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");
    const JUMPS: u64 = 128;
    group.throughput(Throughput::Elements(JUMPS));

    group.bench_function("forward_near_jumps_128", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            let done = asm.label("done");
            for _ in 0..JUMPS {
                asm.jcc(Cond::Ne, done).unwrap();
                asm.nop();
            }
            asm.bind(done).unwrap();
            asm.finish().unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_function_generation,
    bench_labels
);
criterion_main!(benches);
