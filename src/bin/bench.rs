//! Machine benchmark binary.
//!
//! Measures interpreter throughput on synthetic hot loops.
//! Run with: `cargo run --release --bin bench`

use std::time::{Duration, Instant};

use um::machine::isa::Instruction;
use um::machine::program::Program;
use um::machine::vm::{State, UniversalMachine};

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    runs: u64,
    instructions: u64,
    total: Duration,
}

impl BenchResult {
    fn print(&self) {
        let secs = self.total.as_secs_f64();
        let mips = self.instructions as f64 / secs / 1e6;
        println!(
            "  {:<24} {:>6} runs {:>12} instr {:>8.1} Minstr/s",
            self.name, self.runs, self.instructions, mips,
        );
    }
}

/// Runs `f` repeatedly for at least `min_duration`, returning aggregated
/// results. `f` reports the number of instructions it executed.
fn bench<F>(name: &'static str, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..3 {
        f();
    }

    let mut runs = 0u64;
    let mut instructions = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        instructions += f();
        runs += 1;
    }

    BenchResult {
        name,
        runs,
        instructions,
        total: start.elapsed(),
    }
}

fn run_to_halt(program: Program) -> u64 {
    let mut machine = UniversalMachine::new(program);
    machine.run();
    match machine.state() {
        State::Halted => machine.step_count(),
        other => panic!("bench program stopped in {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Workloads
// ---------------------------------------------------------------------------

/// Pure dispatch: decrement a counter to zero, four instructions per
/// iteration.
fn countdown(iterations: u32) -> Program {
    let ops = [
        Instruction::Orthography {
            a: 1,
            value: iterations,
        },
        Instruction::NotAnd { a: 2, b: 0, c: 0 }, // r2 = -1
        Instruction::Orthography { a: 3, value: 3 }, // loop head
        Instruction::Addition { a: 1, b: 1, c: 2 }, // r1 -= 1
        Instruction::Orthography { a: 5, value: 7 }, // exit target
        Instruction::ConditionalMove { a: 5, b: 3, c: 1 },
        Instruction::LoadProgram { b: 0, c: 5 },
        Instruction::Halt {},
    ];
    Program::from_words(ops.iter().map(|op| op.encode()).collect())
}

/// Allocator churn: one allocate and one abandon per iteration, which
/// keeps recycling the same handle.
fn alloc_churn(iterations: u32) -> Program {
    let ops = [
        Instruction::Orthography {
            a: 1,
            value: iterations,
        },
        Instruction::NotAnd { a: 2, b: 0, c: 0 },
        Instruction::Orthography { a: 3, value: 3 }, // loop head
        Instruction::Addition { a: 1, b: 1, c: 2 },
        Instruction::Orthography { a: 4, value: 16 },
        Instruction::Allocation { b: 6, c: 4 },
        Instruction::Abandonment { c: 6 },
        Instruction::Orthography { a: 5, value: 10 }, // exit target
        Instruction::ConditionalMove { a: 5, b: 3, c: 1 },
        Instruction::LoadProgram { b: 0, c: 5 },
        Instruction::Halt {},
    ];
    Program::from_words(ops.iter().map(|op| op.encode()).collect())
}

/// Heap traffic: one amendment and one index per iteration against a
/// scratch array.
fn array_traffic(iterations: u32) -> Program {
    let ops = [
        Instruction::Orthography {
            a: 1,
            value: iterations,
        },
        Instruction::NotAnd { a: 2, b: 0, c: 0 },
        Instruction::Orthography { a: 4, value: 64 },
        Instruction::Allocation { b: 6, c: 4 },
        Instruction::Orthography { a: 3, value: 5 }, // loop head
        Instruction::Addition { a: 1, b: 1, c: 2 },
        Instruction::ArrayAmendment { a: 6, b: 0, c: 1 },
        Instruction::ArrayIndex { a: 7, b: 6, c: 0 },
        Instruction::Orthography { a: 5, value: 11 }, // exit target
        Instruction::ConditionalMove { a: 5, b: 3, c: 1 },
        Instruction::LoadProgram { b: 0, c: 5 },
        Instruction::Halt {},
    ];
    Program::from_words(ops.iter().map(|op| op.encode()).collect())
}

fn main() {
    let min_duration = Duration::from_millis(300);

    println!("um interpreter throughput:");
    bench("countdown", min_duration, || {
        run_to_halt(countdown(100_000))
    })
    .print();
    bench("alloc-free churn", min_duration, || {
        run_to_halt(alloc_churn(50_000))
    })
    .print();
    bench("array read/write", min_duration, || {
        run_to_halt(array_traffic(50_000))
    })
    .print();
}
