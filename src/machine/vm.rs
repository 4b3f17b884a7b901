//! Core machine implementation.
//!
//! The machine executes one instruction per step: fetch the platter at the
//! execution finger in array 0, decode it, dispatch. All arithmetic wraps
//! modulo 2^32. Input suspends the machine instead of blocking, so hosts
//! drive it as a plain state machine; see [`UniversalMachine::run`] and
//! [`UniversalMachine::supply_input`].

mod heap;
mod registers;

use crate::machine::errors::VmError;
use crate::machine::isa::{Instruction, RegIndex, Word};
use crate::machine::program::Program;
use heap::Heap;
use registers::Registers;

/// Register value delivered when the host signals end-of-input.
///
/// An exhausted input stream is defined behavior, not a failure: the
/// pending register receives this all-ones word.
pub const END_OF_INPUT: Word = Word::MAX;

/// Execution state of a machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Ready to execute the next instruction.
    Idle,
    /// Blocked on one byte of input; resume with
    /// [`UniversalMachine::supply_input`].
    Waiting,
    /// Executed a Halt instruction. Terminal.
    Halted,
    /// An instruction failed. Terminal; the reason is never cleared.
    Failed(VmError),
}

/// The universal machine: eight registers, a heap of word arrays, and an
/// execution finger into array 0.
///
/// A machine is created from a [`Program`] image with all registers zero,
/// the finger at offset 0, and state [`State::Idle`]. It is mutated only
/// by [`run`](Self::run)/[`step`](Self::step) and by explicit input
/// delivery, and it stops permanently once Halted or Failed.
///
/// All storage is exclusively owned, so `clone` produces a fully
/// independent snapshot: a warm machine (say, one that has already played
/// through a login sequence) can be forked once per session instead of
/// replaying the same bytes every time. Driving a machine from more than
/// one thread at a time is not supported; clones, however, are free to run
/// on separate threads since they share nothing.
#[derive(Clone, Debug)]
pub struct UniversalMachine {
    registers: Registers,
    heap: Heap,
    /// Word offset into array 0 of the next instruction.
    finger: Word,
    /// Bytes produced but not yet handed to the host.
    output: Vec<u8>,
    /// Register that receives the next input byte while Waiting.
    input_reg: RegIndex,
    /// Instructions started since creation (cloning carries the count over).
    steps: u64,
    state: State,
}

impl UniversalMachine {
    /// Creates a machine whose array 0 holds the given program.
    pub fn new(program: Program) -> Self {
        Self {
            registers: Registers::new(),
            heap: Heap::new(program.into_words()),
            finger: 0,
            output: Vec::new(),
            input_reg: 0,
            steps: 0,
            state: State::Idle,
        }
    }

    /// Creates a machine directly from raw image bytes.
    pub fn from_image(bytes: &[u8]) -> Result<Self, VmError> {
        Ok(Self::new(Program::from_bytes(bytes)?))
    }

    /// Current execution state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of instructions started so far.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Executes instructions until the machine leaves [`State::Idle`],
    /// then returns the output bytes accumulated since the last drain.
    pub fn run(&mut self) -> Vec<u8> {
        while matches!(self.state, State::Idle) {
            self.step();
        }
        std::mem::take(&mut self.output)
    }

    /// Like [`run`](Self::run), but executes at most `max_steps`
    /// instructions. The machine may still be Idle on return; hosts use
    /// this to cap execution without any machinery inside the engine.
    pub fn run_for(&mut self, max_steps: u64) -> Vec<u8> {
        let mut remaining = max_steps;
        while remaining > 0 && matches!(self.state, State::Idle) {
            self.step();
            remaining -= 1;
        }
        std::mem::take(&mut self.output)
    }

    /// Executes a single instruction. Has no effect unless the machine is
    /// [`State::Idle`].
    pub fn step(&mut self) {
        if !matches!(self.state, State::Idle) {
            return;
        }
        self.steps += 1;
        if let Err(error) = self.execute_next() {
            self.state = State::Failed(error);
        }
    }

    /// Delivers one input byte, or the end-of-input signal as `None`, to a
    /// machine in [`State::Waiting`].
    ///
    /// The register named by the suspended Input instruction receives the
    /// byte's value ([`END_OF_INPUT`] on `None`), the finger advances past
    /// the Input instruction, and the machine becomes Idle again. Calling
    /// this in any other state is a host protocol violation and does
    /// nothing.
    pub fn supply_input(&mut self, byte: Option<u8>) {
        if !matches!(self.state, State::Waiting) {
            return;
        }
        let value = match byte {
            Some(byte) => byte as Word,
            None => END_OF_INPUT,
        };
        self.registers.set(self.input_reg, value);
        self.finger = self.finger.wrapping_add(1);
        self.state = State::Idle;
    }

    fn execute_next(&mut self) -> Result<(), VmError> {
        let platter = self.heap.fetch(self.finger)?;
        let instruction = Instruction::decode(platter)?;
        self.dispatch(instruction)?;
        // Halt and Input leave the finger on the current instruction;
        // LoadProgram places it itself. Everything else advances by one.
        if !matches!(
            instruction,
            Instruction::Halt {} | Instruction::Input { .. } | Instruction::LoadProgram { .. }
        ) {
            self.finger = self.finger.wrapping_add(1);
        }
        Ok(())
    }

    fn dispatch(&mut self, instruction: Instruction) -> Result<(), VmError> {
        match instruction {
            Instruction::ConditionalMove { a, b, c } => self.op_conditional_move(a, b, c),
            Instruction::ArrayIndex { a, b, c } => self.op_array_index(a, b, c),
            Instruction::ArrayAmendment { a, b, c } => self.op_array_amendment(a, b, c),
            Instruction::Addition { a, b, c } => self.op_addition(a, b, c),
            Instruction::Multiplication { a, b, c } => self.op_multiplication(a, b, c),
            Instruction::Division { a, b, c } => self.op_division(a, b, c),
            Instruction::NotAnd { a, b, c } => self.op_not_and(a, b, c),
            Instruction::Halt {} => self.op_halt(),
            Instruction::Allocation { b, c } => self.op_allocation(b, c),
            Instruction::Abandonment { c } => self.op_abandonment(c),
            Instruction::Output { c } => self.op_output(c),
            Instruction::Input { c } => self.op_input(c),
            Instruction::LoadProgram { b, c } => self.op_load_program(b, c),
            Instruction::Orthography { a, value } => self.op_orthography(a, value),
        }
    }

    fn op_conditional_move(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        if self.registers.get(c) != 0 {
            let value = self.registers.get(b);
            self.registers.set(a, value);
        }
        Ok(())
    }

    fn op_array_index(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let value = self.heap.read(self.registers.get(b), self.registers.get(c))?;
        self.registers.set(a, value);
        Ok(())
    }

    fn op_array_amendment(
        &mut self,
        a: RegIndex,
        b: RegIndex,
        c: RegIndex,
    ) -> Result<(), VmError> {
        self.heap.write(
            self.registers.get(a),
            self.registers.get(b),
            self.registers.get(c),
        )
    }

    fn op_addition(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let sum = self.registers.get(b).wrapping_add(self.registers.get(c));
        self.registers.set(a, sum);
        Ok(())
    }

    fn op_multiplication(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let product = self.registers.get(b).wrapping_mul(self.registers.get(c));
        self.registers.set(a, product);
        Ok(())
    }

    fn op_division(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let divisor = self.registers.get(c);
        if divisor == 0 {
            return Err(VmError::DivisionByZero);
        }
        let quotient = self.registers.get(b) / divisor;
        self.registers.set(a, quotient);
        Ok(())
    }

    fn op_not_and(&mut self, a: RegIndex, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let value = !(self.registers.get(b) & self.registers.get(c));
        self.registers.set(a, value);
        Ok(())
    }

    fn op_halt(&mut self) -> Result<(), VmError> {
        self.state = State::Halted;
        Ok(())
    }

    fn op_allocation(&mut self, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        // Read the size before writing the handle: B and C may name the
        // same register.
        let size = self.registers.get(c);
        let handle = self.heap.allocate(size);
        self.registers.set(b, handle);
        Ok(())
    }

    fn op_abandonment(&mut self, c: RegIndex) -> Result<(), VmError> {
        self.heap.free(self.registers.get(c))
    }

    fn op_output(&mut self, c: RegIndex) -> Result<(), VmError> {
        let value = self.registers.get(c);
        if value > u8::MAX as Word {
            return Err(VmError::OutputOutOfRange { value });
        }
        self.output.push(value as u8);
        Ok(())
    }

    fn op_input(&mut self, c: RegIndex) -> Result<(), VmError> {
        self.input_reg = c;
        self.state = State::Waiting;
        Ok(())
    }

    fn op_load_program(&mut self, b: RegIndex, c: RegIndex) -> Result<(), VmError> {
        let source = self.registers.get(b);
        if source != 0 {
            self.heap.replace_program(source)?;
        }
        // The target is the next instruction offset; there is no separate
        // increment. An out-of-range target fails at the next fetch.
        self.finger = self.registers.get(c);
        Ok(())
    }

    fn op_orthography(&mut self, a: RegIndex, value: Word) -> Result<(), VmError> {
        self.registers.set(a, value);
        Ok(())
    }
}
