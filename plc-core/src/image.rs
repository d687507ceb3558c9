//! The process image (component D): every PLC register bank, the shadow
//! copy used for edge/change detection, and the force overlay.
//!
//! Grounded in the original's `plclib.h` register structs
//! (`digital_input`, `digital_output`, `analog_io`, `timer`, `blink`,
//! `mvar`, `mreal`) and `PLC_regs`, reshaped from one C struct holding
//! raw arrays into small value types per slot (spec.md §9: "pointer-heavy
//! C structs -> value types").

use bitflags::bitflags;

use crate::data::{mask_width, Value};
use crate::error::{PlcError, PlcResult};
use crate::instruction::{Operand, OperandKind};

bitflags! {
    /// Which register banks changed during the cycle that just ran.
    /// Only bits set here are copied from live state into the shadow
    /// (spec.md §3: "advanced only from change-mask bits the cycle
    /// actually set").
    #[derive(Default)]
    pub struct ChangeMask: u32 {
        const DIGITAL_INPUTS  = 1 << 0;
        const DIGITAL_OUTPUTS = 1 << 1;
        const ANALOG_INPUTS   = 1 << 2;
        const ANALOG_OUTPUTS  = 1 << 3;
        const TIMERS          = 1 << 4;
        const BLINKERS        = 1 << 5;
        const MEMORY          = 1 << 6;
        const REAL_MEMORY     = 1 << 7;
    }
}

/// One digital input bit slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DigitalInput {
    pub level: bool,
    pub rising_edge: bool,
    pub falling_edge: bool,
    pub force_true: bool,
    pub force_false: bool,
}

impl DigitalInput {
    /// `level = (raw | force_true) & !force_false`; force_false always
    /// wins (spec.md §3 invariant).
    fn decode(&mut self, raw: bool) {
        let prev = self.level;
        self.level = (raw || self.force_true) && !self.force_false;
        self.rising_edge = self.level && !prev;
        self.falling_edge = !self.level && prev;
    }
}

/// One digital output bit slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DigitalOutput {
    pub level: bool,
    pub set_pending: bool,
    pub reset_pending: bool,
    pub force_true: bool,
    pub force_false: bool,
}

impl DigitalOutput {
    /// `out = ((Q | (set & !reset)) | force_true) & !force_false`.
    fn encode(&self) -> bool {
        ((self.level || (self.set_pending && !self.reset_pending)) || self.force_true)
            && !self.force_false
    }
}

/// One analog channel (input or output). The raw value is a `u64` that
/// maps linearly onto `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogChannel {
    pub raw: u64,
    pub min: f64,
    pub max: f64,
    force: Option<f64>,
    pub nick: String,
}

impl AnalogChannel {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            raw: 0,
            min,
            max,
            force: None,
            nick: String::new(),
        }
    }

    /// Scaled value: the forced value if one is in range, else the raw
    /// channel linearly mapped onto `[min, max]`.
    pub fn scaled(&self) -> f64 {
        if let Some(f) = self.force {
            return f;
        }
        self.min + (self.max - self.min) * (self.raw as f64 / u64::MAX as f64)
    }

    /// Set the raw channel from a scaled value, clamped to `[min, max]`.
    pub fn set_scaled(&mut self, value: f64) {
        let clamped = value.clamp(self.min, self.max);
        let span = self.max - self.min;
        self.raw = if span.abs() < f64::EPSILON {
            0
        } else {
            (((clamped - self.min) / span) * u64::MAX as f64) as u64
        };
    }

    /// Force this channel to `value`. Accepted only if `min < value <
    /// max` (spec.md §8 scenario 5); returns whether it was accepted.
    pub fn force(&mut self, value: f64) -> bool {
        if self.min < value && value < self.max {
            self.force = Some(value);
            true
        } else {
            false
        }
    }

    pub fn unforce(&mut self) {
        self.force = None;
    }

    pub fn is_forced(&self) -> bool {
        self.force.is_some()
    }
}

/// One on-delay/off-delay timer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    pub scale: u32,
    pub sub_counter: u32,
    pub value: u32,
    pub preset: u32,
    pub q: bool,
    pub start: bool,
    pub reset: bool,
    pub on_delay: bool,
    pub nick_id: u32,
}

impl Timer {
    /// Advance by one cycle: increment the sub-counter while running,
    /// roll into `value` every `scale + 1` cycles, and freeze at
    /// `value == preset` until reset (spec.md §3, §4.5 step 2).
    fn advance(&mut self) {
        if self.reset {
            self.value = 0;
            self.sub_counter = 0;
            self.reset = false;
        }
        if self.start && self.value < self.preset {
            self.sub_counter += 1;
            if self.sub_counter > self.scale {
                self.value += 1;
                self.sub_counter = 0;
            }
        }
        let expired = self.value >= self.preset;
        self.q = if self.on_delay { expired } else { !expired };
    }
}

/// A square-wave generator with period `2*scale + 2` scans.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Blinker {
    pub q: bool,
    pub scale: u32,
    pub sub_counter: u32,
}

impl Blinker {
    fn advance(&mut self) {
        if self.scale == 0 {
            return;
        }
        self.sub_counter += 1;
        if self.sub_counter > self.scale {
            self.q = !self.q;
            self.sub_counter = 0;
        }
    }
}

/// An integer memory counter with edge-triggered increment/decrement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryCounter {
    pub value: u64,
    pub read_only: bool,
    pub down: bool,
    pub pulse: bool,
    pub edge: bool,
    pub set: bool,
    pub reset: bool,
}

impl MemoryCounter {
    fn compute_pulse(&mut self) {
        if self.set || self.reset {
            self.pulse = self.set && !self.reset;
        }
    }

    fn check_edge(&mut self, prev_pulse: bool) {
        if self.pulse != prev_pulse {
            self.edge = true;
        }
    }

    fn apply_increment(&mut self) {
        if !self.read_only && self.pulse && self.edge {
            self.value = if self.down {
                self.value.wrapping_sub(1)
            } else {
                self.value.wrapping_add(1)
            };
        }
        self.edge = false;
    }
}

/// A real-valued memory register (no edge/pulse behavior).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RealMemory {
    pub value: f64,
    pub read_only: bool,
}

/// Previous-cycle snapshot of every bank, used for edge and change
/// detection. Updated only for the banks `update` actually marks dirty.
#[derive(Debug, Clone, Default)]
struct Shadow {
    digital_inputs: Vec<bool>,
    digital_outputs: Vec<bool>,
    analog_inputs: Vec<u64>,
    analog_outputs: Vec<u64>,
    timers: Vec<(u32, bool)>,
    blinkers: Vec<bool>,
    memory: Vec<(u64, bool)>,
    real_memory: Vec<f64>,
}

/// The full PLC process image: every register bank plus the command
/// word, status, step time, and change mask.
#[derive(Debug, Clone)]
pub struct ProcessImage {
    pub digital_inputs: Vec<DigitalInput>,
    pub digital_outputs: Vec<DigitalOutput>,
    pub analog_inputs: Vec<AnalogChannel>,
    pub analog_outputs: Vec<AnalogChannel>,
    pub timers: Vec<Timer>,
    pub blinkers: Vec<Blinker>,
    pub memory: Vec<MemoryCounter>,
    pub real_memory: Vec<RealMemory>,
    pub command: u64,
    pub response: u64,
    pub update: ChangeMask,
    pub status: i32,
    pub step_ms: u32,
    shadow: Shadow,
    prev_memory_pulse: Vec<bool>,
}

/// Fixed register counts a [`ProcessImage`] is allocated with once, at
/// construction (spec.md §3 "Lifecycle": "process image and shadow are
/// allocated once... no reallocation happens during scanning").
#[derive(Debug, Clone, Copy)]
pub struct ImageLayout {
    pub digital_inputs: usize,
    pub digital_outputs: usize,
    pub analog_inputs: usize,
    pub analog_outputs: usize,
    pub timers: usize,
    pub blinkers: usize,
    pub memory: usize,
    pub real_memory: usize,
    pub step_ms: u32,
}

impl ProcessImage {
    pub fn new(layout: ImageLayout) -> Self {
        let digital_inputs = vec![DigitalInput::default(); layout.digital_inputs];
        let digital_outputs = vec![DigitalOutput::default(); layout.digital_outputs];
        let analog_inputs = vec![AnalogChannel::new(0.0, 1.0); layout.analog_inputs];
        let analog_outputs = vec![AnalogChannel::new(0.0, 1.0); layout.analog_outputs];
        let memory = vec![MemoryCounter::default(); layout.memory];
        let prev_memory_pulse = vec![false; layout.memory];

        Self {
            shadow: Shadow {
                digital_inputs: vec![false; layout.digital_inputs],
                digital_outputs: vec![false; layout.digital_outputs],
                analog_inputs: vec![0; layout.analog_inputs],
                analog_outputs: vec![0; layout.analog_outputs],
                timers: vec![(0, false); layout.timers],
                blinkers: vec![false; layout.blinkers],
                memory: vec![(0, false); layout.memory],
                real_memory: vec![0.0; layout.real_memory],
            },
            digital_inputs,
            digital_outputs,
            analog_inputs,
            analog_outputs,
            timers: vec![Timer::default(); layout.timers],
            blinkers: vec![Blinker::default(); layout.blinkers],
            memory,
            real_memory: vec![RealMemory::default(); layout.real_memory],
            command: 0,
            response: 0,
            update: ChangeMask::empty(),
            status: 0,
            step_ms: layout.step_ms,
            prev_memory_pulse,
        }
    }

    // -- scan-cycle phases (spec.md §4.5) ------------------------------

    /// Phase 2: advance every timer by one cycle.
    pub fn advance_timers(&mut self) {
        for t in &mut self.timers {
            t.advance();
        }
    }

    /// Phase 3: advance every blinker by one cycle.
    pub fn advance_blinkers(&mut self) {
        for b in &mut self.blinkers {
            b.advance();
        }
    }

    /// Phase 4: recompute each memory counter's pending pulse direction.
    pub fn compute_memory_pulses(&mut self) {
        for m in &mut self.memory {
            m.compute_pulse();
        }
    }

    /// Phase 6: explode sampled raw input bytes into bit slots, applying
    /// force policy and edge detection. `raw` must cover every digital
    /// input byte.
    pub fn decode_digital_inputs(&mut self, raw: &[u8]) {
        for (idx, slot) in self.digital_inputs.iter_mut().enumerate() {
            let byte = idx / 8;
            let bit = idx % 8;
            let bitval = raw.get(byte).map(|b| (b >> bit) & 1 == 1).unwrap_or(false);
            slot.decode(bitval);
        }
    }

    /// Phase 6: map a sampled analog raw reading into channel `idx`,
    /// substituting the force value when one is in range.
    pub fn decode_analog_input(&mut self, idx: usize, raw: u64) -> PlcResult<()> {
        let ch = self
            .analog_inputs
            .get_mut(idx)
            .ok_or(PlcError::BadIndex)?;
        ch.raw = raw;
        Ok(())
    }

    /// Phase 6 (tail): clear every output bit/byte before running rungs.
    pub fn clear_outputs(&mut self) {
        for o in &mut self.digital_outputs {
            o.level = false;
            o.set_pending = false;
            o.reset_pending = false;
        }
    }

    /// Phase 8: recompose the raw digital output byte array.
    pub fn encode_digital_outputs(&self) -> Vec<u8> {
        let nq = self.digital_outputs.len().div_ceil(8);
        let mut out = vec![0u8; nq];
        for (idx, slot) in self.digital_outputs.iter().enumerate() {
            if slot.encode() {
                out[idx / 8] |= 1 << (idx % 8);
            }
        }
        out
    }

    /// Phase 8: map an analog output channel's scaled value back to its
    /// raw `u64` for the driver.
    pub fn encode_analog_output(&self, idx: usize) -> PlcResult<u64> {
        let ch = self.analog_outputs.get(idx).ok_or(PlcError::BadIndex)?;
        Ok(if let Some(f) = ch.scaled_force() {
            let span = ch.max - ch.min;
            if span.abs() < f64::EPSILON {
                0
            } else {
                ((f - ch.min) / span * u64::MAX as f64) as u64
            }
        } else {
            ch.raw
        })
    }

    /// Phase 9: mark each memory counter's `edge` flag where `pulse`
    /// differs from the previous cycle.
    pub fn check_memory_edges(&mut self) {
        for (m, prev) in self.memory.iter_mut().zip(self.prev_memory_pulse.iter()) {
            m.check_edge(*prev);
        }
    }

    /// Phase 10: apply pending increments/decrements, then clear edges.
    pub fn increment_memory_counters(&mut self) {
        for m in &mut self.memory {
            m.apply_increment();
        }
        for (prev, m) in self.prev_memory_pulse.iter_mut().zip(self.memory.iter()) {
            *prev = m.pulse;
        }
    }

    /// Phase 11: diff every bank against the shadow, set `update`, and
    /// copy only the changed banks into the shadow.
    pub fn publish_change_mask(&mut self) {
        let mut mask = ChangeMask::empty();

        let di: Vec<bool> = self.digital_inputs.iter().map(|s| s.level).collect();
        if di != self.shadow.digital_inputs {
            mask |= ChangeMask::DIGITAL_INPUTS;
            self.shadow.digital_inputs = di;
        }

        let dq: Vec<bool> = self.digital_outputs.iter().map(|s| s.encode()).collect();
        if dq != self.shadow.digital_outputs {
            mask |= ChangeMask::DIGITAL_OUTPUTS;
            self.shadow.digital_outputs = dq;
        }

        let ai: Vec<u64> = self.analog_inputs.iter().map(|c| c.raw).collect();
        if ai != self.shadow.analog_inputs {
            mask |= ChangeMask::ANALOG_INPUTS;
            self.shadow.analog_inputs = ai;
        }

        let aq: Vec<u64> = self.analog_outputs.iter().map(|c| c.raw).collect();
        if aq != self.shadow.analog_outputs {
            mask |= ChangeMask::ANALOG_OUTPUTS;
            self.shadow.analog_outputs = aq;
        }

        let tv: Vec<(u32, bool)> = self.timers.iter().map(|t| (t.value, t.q)).collect();
        if tv != self.shadow.timers {
            mask |= ChangeMask::TIMERS;
            self.shadow.timers = tv;
        }

        let bq: Vec<bool> = self.blinkers.iter().map(|b| b.q).collect();
        if bq != self.shadow.blinkers {
            mask |= ChangeMask::BLINKERS;
            self.shadow.blinkers = bq;
        }

        let mv: Vec<(u64, bool)> = self.memory.iter().map(|m| (m.value, m.pulse)).collect();
        if mv != self.shadow.memory {
            mask |= ChangeMask::MEMORY;
            self.shadow.memory = mv;
        }

        let rv: Vec<f64> = self.real_memory.iter().map(|r| r.value).collect();
        if rv != self.shadow.real_memory {
            mask |= ChangeMask::REAL_MEMORY;
            self.shadow.real_memory = rv;
        }

        self.update = mask;
    }

    // -- forcing API (supplemented from original's plc_force/plc_unforce) --

    pub fn force_digital_input(&mut self, idx: usize, level: bool) -> PlcResult<()> {
        let slot = self.digital_inputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        if level {
            slot.force_true = true;
            slot.force_false = false;
        } else {
            slot.force_false = true;
            slot.force_true = false;
        }
        Ok(())
    }

    pub fn unforce_digital_input(&mut self, idx: usize) -> PlcResult<()> {
        let slot = self.digital_inputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        slot.force_true = false;
        slot.force_false = false;
        Ok(())
    }

    pub fn is_digital_input_forced(&self, idx: usize) -> PlcResult<bool> {
        let slot = self.digital_inputs.get(idx).ok_or(PlcError::BadIndex)?;
        Ok(slot.force_true || slot.force_false)
    }

    pub fn force_digital_output(&mut self, idx: usize, level: bool) -> PlcResult<()> {
        let slot = self.digital_outputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        if level {
            slot.force_true = true;
            slot.force_false = false;
        } else {
            slot.force_false = true;
            slot.force_true = false;
        }
        Ok(())
    }

    pub fn unforce_digital_output(&mut self, idx: usize) -> PlcResult<()> {
        let slot = self.digital_outputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        slot.force_true = false;
        slot.force_false = false;
        Ok(())
    }

    pub fn force_analog_input(&mut self, idx: usize, value: f64) -> PlcResult<bool> {
        let ch = self.analog_inputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        Ok(ch.force(value))
    }

    pub fn unforce_analog_input(&mut self, idx: usize) -> PlcResult<()> {
        let ch = self.analog_inputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
        ch.unforce();
        Ok(())
    }

    // -- generic operand access, used by the VM's LD/ST/SET/RESET -------

    /// Read an operand's current value (component H's `LD`).
    pub fn read(&self, operand: &Operand) -> PlcResult<Value> {
        use OperandKind::*;
        match operand.kind {
            Input => read_digital(&self.digital_inputs, operand.byte, operand.bit, |s| s.level),
            Output | Contact => {
                read_digital(&self.digital_outputs, operand.byte, operand.bit, |s| s.level)
            }
            Rising => {
                let idx = operand.byte as usize * 8 + operand.bit as usize;
                let s = self.digital_inputs.get(idx).ok_or(PlcError::BadIndex)?;
                Ok(Value::bool_val(s.rising_edge))
            }
            Falling => {
                let idx = operand.byte as usize * 8 + operand.bit as usize;
                let s = self.digital_inputs.get(idx).ok_or(PlcError::BadIndex)?;
                Ok(Value::bool_val(s.falling_edge))
            }
            RealInput => {
                let ch = self.analog_inputs.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                Ok(Value::Real(ch.scaled()))
            }
            RealOutput | RealContact => {
                let ch = self.analog_outputs.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                Ok(Value::Real(ch.scaled()))
            }
            Memory | MemoryPulse => {
                let m = self.memory.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                let width = if operand.bit == 0 { 64 } else { operand.bit as u32 };
                Ok(Value::Int(m.value & mask_width(width)))
            }
            RealMemory | RealMemoryStore => {
                let m = self.real_memory.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                Ok(Value::Real(m.value))
            }
            Command => Ok(Value::Int(self.command)),
            Write => Ok(Value::Int(self.response)),
            Blinker => {
                let b = self.blinkers.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                Ok(Value::bool_val(b.q))
            }
            Timer | TimerStart => {
                let t = self.timers.get(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                Ok(Value::bool_val(t.q))
            }
        }
    }

    /// Write an operand's value (component H's `ST`).
    pub fn write(&mut self, operand: &Operand, value: Value) -> PlcResult<()> {
        use OperandKind::*;
        match operand.kind {
            Contact => write_digital(&mut self.digital_outputs, operand.byte, operand.bit, value),
            RealContact => {
                let ch = self
                    .analog_outputs
                    .get_mut(operand.byte as usize)
                    .ok_or(PlcError::BadIndex)?;
                ch.set_scaled(value.as_f64());
                Ok(())
            }
            TimerStart => {
                let t = self.timers.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                t.start = value.is_truthy();
                t.reset = false;
                Ok(())
            }
            MemoryPulse => {
                let m = self.memory.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                m.value = value.as_u64();
                Ok(())
            }
            RealMemoryStore => {
                let m = self
                    .real_memory
                    .get_mut(operand.byte as usize)
                    .ok_or(PlcError::BadIndex)?;
                m.value = value.as_f64();
                Ok(())
            }
            Write => {
                self.response = value.as_u64();
                Ok(())
            }
            _ => Err(PlcError::BadCoil),
        }
    }

    /// `SET`: drive a coil's set-pending side true, clearing reset.
    pub fn set_coil(&mut self, operand: &Operand) -> PlcResult<()> {
        use OperandKind::*;
        match operand.kind {
            Contact => {
                let idx = operand.byte as usize * 8 + operand.bit as usize;
                let o = self.digital_outputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
                o.set_pending = true;
                o.reset_pending = false;
                Ok(())
            }
            TimerStart => {
                let t = self.timers.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                t.start = true;
                t.reset = false;
                Ok(())
            }
            MemoryPulse => {
                let m = self.memory.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                m.set = true;
                m.reset = false;
                Ok(())
            }
            _ => Err(PlcError::BadCoil),
        }
    }

    /// `RESET`: the inverse of [`Self::set_coil`].
    pub fn reset_coil(&mut self, operand: &Operand) -> PlcResult<()> {
        use OperandKind::*;
        match operand.kind {
            Contact => {
                let idx = operand.byte as usize * 8 + operand.bit as usize;
                let o = self.digital_outputs.get_mut(idx).ok_or(PlcError::BadIndex)?;
                o.set_pending = false;
                o.reset_pending = true;
                Ok(())
            }
            TimerStart => {
                let t = self.timers.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                t.start = false;
                t.reset = true;
                Ok(())
            }
            MemoryPulse => {
                let m = self.memory.get_mut(operand.byte as usize).ok_or(PlcError::BadIndex)?;
                m.set = false;
                m.reset = true;
                Ok(())
            }
            _ => Err(PlcError::BadCoil),
        }
    }
}

/// Read a (possibly multi-byte, big-endian) level out of a digital bank.
fn read_digital<T>(bank: &[T], byte: u16, bit: u8, level: impl Fn(&T) -> bool) -> PlcResult<Value> {
    if bit < 8 {
        let idx = byte as usize * 8 + bit as usize;
        let l = level(bank.get(idx).ok_or(PlcError::BadIndex)?);
        return Ok(Value::bool_val(l));
    }
    let nbytes = bit as usize / 8;
    let mut acc: u64 = 0;
    for i in 0..nbytes {
        let mut byte_val: u8 = 0;
        for b in 0..8 {
            let idx = (byte as usize + i) * 8 + b;
            let l = level(bank.get(idx).ok_or(PlcError::BadIndex)?);
            if l {
                byte_val |= 1 << b;
            }
        }
        acc = (acc << 8) | byte_val as u64;
    }
    Ok(Value::Int(acc))
}

fn write_digital(bank: &mut [DigitalOutput], byte: u16, bit: u8, value: Value) -> PlcResult<()> {
    if bit < 8 {
        let idx = byte as usize * 8 + bit as usize;
        let slot = bank.get_mut(idx).ok_or(PlcError::BadIndex)?;
        slot.level = value.is_truthy();
        return Ok(());
    }
    let nbytes = bit as usize / 8;
    let raw = value.as_u64();
    for i in 0..nbytes {
        let shift = (nbytes - 1 - i) * 8;
        let byte_val = ((raw >> shift) & 0xFF) as u8;
        for b in 0..8 {
            let idx = (byte as usize + i) * 8 + b;
            let slot = bank.get_mut(idx).ok_or(PlcError::BadIndex)?;
            slot.level = (byte_val >> b) & 1 == 1;
        }
    }
    Ok(())
}

impl AnalogChannel {
    fn scaled_force(&self) -> Option<f64> {
        self.force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ImageLayout {
        ImageLayout {
            digital_inputs: 8,
            digital_outputs: 8,
            analog_inputs: 2,
            analog_outputs: 2,
            timers: 1,
            blinkers: 1,
            memory: 1,
            real_memory: 1,
            step_ms: 10,
        }
    }

    #[test]
    fn force_false_wins_over_force_true() {
        let mut img = ProcessImage::new(layout());
        img.force_digital_input(0, true).unwrap();
        img.force_digital_input(0, false).unwrap();
        img.decode_digital_inputs(&[0xFF]);
        assert!(!img.digital_inputs[0].level);
    }

    #[test]
    fn edge_exactness() {
        let mut img = ProcessImage::new(layout());
        img.decode_digital_inputs(&[0x00]);
        assert!(!img.digital_inputs[0].rising_edge);
        img.decode_digital_inputs(&[0x01]);
        assert!(img.digital_inputs[0].rising_edge);
        assert!(!img.digital_inputs[0].falling_edge);
        img.decode_digital_inputs(&[0x00]);
        assert!(img.digital_inputs[0].falling_edge);
    }

    #[test]
    fn timer_increments_every_scale_plus_one_cycles() {
        let mut img = ProcessImage::new(layout());
        img.timers[0].start = true;
        img.timers[0].preset = 3;
        img.timers[0].scale = 1;
        for _ in 0..2 {
            img.advance_timers();
        }
        assert_eq!(img.timers[0].value, 1);
    }

    #[test]
    fn timer_freezes_at_preset() {
        let mut img = ProcessImage::new(layout());
        img.timers[0].start = true;
        img.timers[0].preset = 1;
        img.timers[0].scale = 0;
        for _ in 0..10 {
            img.advance_timers();
        }
        assert_eq!(img.timers[0].value, 1);
    }

    #[test]
    fn analog_force_rejects_out_of_range() {
        let mut img = ProcessImage::new(layout());
        img.analog_inputs[1].min = 0.0;
        img.analog_inputs[1].max = 2.0;
        assert!(img.force_analog_input(1, 1.5).unwrap());
        assert!(!img.force_analog_input(1, -1.5).unwrap());
    }

    #[test]
    fn encode_round_trip_outputs() {
        let mut img = ProcessImage::new(layout());
        for i in 0..4 {
            img.digital_outputs[i].level = true;
        }
        for i in 4..8 {
            img.digital_outputs[i].set_pending = true;
        }
        let out = img.encode_digital_outputs();
        assert_eq!(out[0], 0xFF);
    }

    #[test]
    fn memory_counter_edge_fires_once() {
        let mut img = ProcessImage::new(layout());
        img.memory[0].set = true;
        img.compute_memory_pulses();
        img.check_memory_edges();
        assert!(img.memory[0].edge);
        img.increment_memory_counters();
        assert!(!img.memory[0].edge);
        assert_eq!(img.memory[0].value, 1);

        img.check_memory_edges();
        assert!(!img.memory[0].edge);
    }

    #[test]
    fn change_mask_tracks_only_dirty_banks() {
        let mut img = ProcessImage::new(layout());
        img.publish_change_mask();
        assert!(img.update.is_empty());
        img.decode_digital_inputs(&[0x01]);
        img.publish_change_mask();
        assert!(img.update.contains(ChangeMask::DIGITAL_INPUTS));
        assert!(!img.update.contains(ChangeMask::DIGITAL_OUTPUTS));
    }
}
