//! The scan engine (component I): the cycle loop tying the process
//! image, compiled programs, and a driver together.
//!
//! Grounded in the original's `plc_cycle`/`plc_start`/`plc_stop` in
//! `plclib.c`: sample -> timers/blinkers -> memory pulses -> sleep ->
//! decode -> run -> encode -> pulse edges -> counter increment -> publish
//! change mask (spec.md §4.5), plus `compute_variance`'s running
//! mean/variance of cycle wall time via Welford's online algorithm.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{CompileError, PlcError, PlcResult};
use crate::hardware::Driver;
use crate::image::{ImageLayout, ProcessImage};
use crate::parser::{self, Language};
use crate::rung::Rung;
use crate::vm;

/// The push-stack's 255-entry cap isn't the only fixed allocation: the
/// rung vector itself is sized to a maximum at construction (spec.md §3
/// Lifecycle).
const MAX_RUNGS: usize = 256;

/// Fixed register counts and step period a [`Plc`] is constructed with
/// (spec.md §3: "A PLC is constructed with fixed counts of every
/// register kind...").
#[derive(Debug, Clone, Copy)]
pub struct Config {
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

impl From<Config> for ImageLayout {
    fn from(c: Config) -> Self {
        ImageLayout {
            digital_inputs: c.digital_inputs,
            digital_outputs: c.digital_outputs,
            analog_inputs: c.analog_inputs,
            analog_outputs: c.analog_outputs,
            timers: c.timers,
            blinkers: c.blinkers,
            memory: c.memory,
            real_memory: c.real_memory,
            step_ms: c.step_ms,
        }
    }
}

/// Engine run state (spec.md §3 Lifecycle: "Stopped -> Running ->
/// Stopped").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// A compiled program tagged with the source it came from, for
/// diagnostics (supplemented from the original's
/// `plc_load_program_file`, which tags a loaded program with its path).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub name: String,
    pub rung: Rung,
}

/// Running mean/variance of per-cycle wall time, tracked online with
/// Welford's algorithm (supplemented from the original's
/// `compute_variance`).
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// The top-level runtime object: process image, compiled programs, and
/// the driver they run against.
pub struct Plc {
    pub image: ProcessImage,
    programs: Vec<Program>,
    driver: Box<dyn Driver>,
    state: RunState,
    per_rung_budget: Duration,
    jitter: Welford,
}

impl Plc {
    pub fn new(config: Config, driver: Box<dyn Driver>) -> Self {
        let per_rung_budget = Duration::from_millis(config.step_ms as u64);
        Self {
            image: ProcessImage::new(config.into()),
            programs: Vec::new(),
            driver,
            state: RunState::Stopped,
            per_rung_budget,
            jitter: Welford::default(),
        }
    }

    /// Compile `source` with the front-end named by `lang` and append it
    /// to the rung vector (capped at [`MAX_RUNGS`], spec.md §3).
    pub fn load_program(
        &mut self,
        lang: Language,
        name: impl Into<String>,
        source: &str,
    ) -> Result<(), CompileError> {
        if self.programs.len() >= MAX_RUNGS {
            return Err(CompileError::new(0, String::new(), PlcError::Overflow));
        }
        let rung = parser::compile(lang, source)?;
        self.programs.push(Program {
            name: name.into(),
            rung,
        });
        Ok(())
    }

    /// Compile a program from a file path, dispatching the front-end by
    /// extension (spec.md §6: `.il`/`.ld`) and tagging it with its path
    /// for diagnostics.
    pub fn load_program_file(&mut self, path: &Path, source: &str) -> Result<(), CompileError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let lang = Language::from_extension(ext).ok_or_else(|| {
            CompileError::new(0, String::new(), PlcError::BadFile(path.display().to_string()))
        })?;
        let name = path.display().to_string();
        self.load_program(lang, name, source)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Acquire the driver and move to `Running`. A hardware failure
    /// leaves the engine `Stopped` (spec.md §7: hardware faults surface
    /// as `PlcError::Hardware`).
    pub fn start(&mut self) -> PlcResult<()> {
        self.driver.enable()?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Zero every output, release the driver, and move to `Stopped`.
    pub fn stop(&mut self) -> PlcResult<()> {
        self.image.clear_outputs();
        self.flush_outputs()?;
        self.driver.flush()?;
        self.driver.disable()?;
        self.state = RunState::Stopped;
        Ok(())
    }

    /// Run one full scan cycle (spec.md §4.5's 11 steps). A fault inside
    /// one rung aborts that rung only; the cycle still completes with
    /// whatever outputs were computed before the fault.
    pub fn step(&mut self) -> PlcResult<()> {
        let cycle_start = Instant::now();

        // 1. Sample.
        self.driver.fetch()?;
        let nbytes = self.image.digital_inputs.len().div_ceil(8);
        let mut raw_digital = vec![0u8; nbytes];
        for i in 0..self.image.digital_inputs.len() {
            if self.driver.dio_read(i)? {
                raw_digital[i / 8] |= 1 << (i % 8);
            }
        }
        let mut raw_analog = Vec::with_capacity(self.image.analog_inputs.len());
        for i in 0..self.image.analog_inputs.len() {
            raw_analog.push(self.driver.data_read(i)?);
        }

        // 2-4. Timers, blinkers, memory pulses.
        self.image.advance_timers();
        self.image.advance_blinkers();
        self.image.compute_memory_pulses();

        // 5. Sleep out whatever's left of the step period.
        let used = cycle_start.elapsed();
        let target = Duration::from_millis(self.image.step_ms as u64);
        if used < target {
            std::thread::sleep(target - used);
        }

        // 6. Decode inputs, clear outputs.
        self.image.decode_digital_inputs(&raw_digital);
        for (idx, raw) in raw_analog.into_iter().enumerate() {
            self.image.decode_analog_input(idx, raw)?;
        }
        self.image.clear_outputs();

        // 7. Run every loaded rung.
        for program in &self.programs {
            if let Err(e) = vm::run_rung(&program.rung, &mut self.image, self.per_rung_budget) {
                log::warn!("rung {} faulted: {e}", program.name);
            }
        }

        // 8. Encode outputs, flush, clear the incoming command register
        // now that every rung this cycle has had a chance to read it.
        self.flush_outputs()?;
        self.driver.flush()?;
        self.image.command = 0;

        // 9-10. Pulse edges, counter increment.
        self.image.check_memory_edges();
        self.image.increment_memory_counters();

        // 11. Publish change mask.
        self.image.publish_change_mask();

        let elapsed_us = cycle_start.elapsed().as_secs_f64() * 1_000_000.0;
        self.jitter.update(elapsed_us);
        log::trace!("cycle complete in {elapsed_us:.1}us, update={:?}", self.image.update);

        Ok(())
    }

    fn flush_outputs(&mut self) -> PlcResult<()> {
        let out = self.image.encode_digital_outputs();
        for i in 0..self.image.digital_outputs.len() {
            let bit = (out[i / 8] >> (i % 8)) & 1 == 1;
            self.driver.dio_write(i, bit)?;
        }
        for i in 0..self.image.analog_outputs.len() {
            let raw = self.image.encode_analog_output(i)?;
            self.driver.data_write(i, raw)?;
        }
        Ok(())
    }

    /// Running `(mean_us, variance_us2)` of cycle wall time, supplemented
    /// from the original's `compute_variance`.
    pub fn cycle_jitter(&self) -> (f64, f64) {
        (self.jitter.mean, self.jitter.variance())
    }

    // -- forcing API (supplemented from the original's plc_force/plc_unforce) --

    pub fn force_digital_input(&mut self, idx: usize, level: bool) -> PlcResult<()> {
        self.image.force_digital_input(idx, level)
    }

    pub fn unforce_digital_input(&mut self, idx: usize) -> PlcResult<()> {
        self.image.unforce_digital_input(idx)
    }

    pub fn is_forced_digital_input(&self, idx: usize) -> PlcResult<bool> {
        self.image.is_digital_input_forced(idx)
    }

    pub fn force_digital_output(&mut self, idx: usize, level: bool) -> PlcResult<()> {
        self.image.force_digital_output(idx, level)
    }

    pub fn unforce_digital_output(&mut self, idx: usize) -> PlcResult<()> {
        self.image.unforce_digital_output(idx)
    }

    pub fn force_analog_input(&mut self, idx: usize, value: f64) -> PlcResult<bool> {
        self.image.force_analog_input(idx, value)
    }

    pub fn unforce_analog_input(&mut self, idx: usize) -> PlcResult<()> {
        self.image.unforce_analog_input(idx)
    }

    pub fn force_analog_output(&mut self, idx: usize, value: f64) -> PlcResult<bool> {
        let ch = self
            .image
            .analog_outputs
            .get_mut(idx)
            .ok_or(PlcError::BadIndex)?;
        Ok(ch.force(value))
    }

    pub fn unforce_analog_output(&mut self, idx: usize) -> PlcResult<()> {
        let ch = self
            .image
            .analog_outputs
            .get_mut(idx)
            .ok_or(PlcError::BadIndex)?;
        ch.unforce();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimDriver;

    fn config() -> Config {
        Config {
            digital_inputs: 8,
            digital_outputs: 8,
            analog_inputs: 2,
            analog_outputs: 2,
            timers: 1,
            blinkers: 1,
            memory: 2,
            real_memory: 1,
            step_ms: 1,
        }
    }

    fn plc() -> Plc {
        Plc::new(config(), Box::new(SimDriver::new(8, 8, 2, 2)))
    }

    #[test]
    fn start_stop_round_trip() {
        let mut p = plc();
        assert_eq!(p.state(), RunState::Stopped);
        p.start().unwrap();
        assert_eq!(p.state(), RunState::Running);
        p.stop().unwrap();
        assert_eq!(p.state(), RunState::Stopped);
    }

    #[test]
    fn step_runs_loaded_program_and_reflects_digital_output() {
        let mut p = Plc::new(config(), Box::new(SimDriver::new(8, 8, 2, 2)));
        p.load_program(Language::Il, "gate", "LD %i0/0\nST %Q0/0\n").unwrap();
        p.start().unwrap();
        p.step().unwrap();
        assert!(!p.image.digital_outputs[0].level);

        let mut driven = Plc::new(config(), {
            let mut sim = SimDriver::new(8, 8, 2, 2);
            sim.digital_in[0] = true;
            Box::new(sim)
        });
        driven.load_program(Language::Il, "gate", "LD %i0/0\nST %Q0/0\n").unwrap();
        driven.start().unwrap();
        driven.step().unwrap();
        assert!(driven.image.digital_outputs[0].level);
    }

    #[test]
    fn analog_force_then_step_holds_forced_value() {
        let mut p = plc();
        p.image.analog_inputs[0].min = 0.0;
        p.image.analog_inputs[0].max = 10.0;
        assert!(p.force_analog_input(0, 5.0).unwrap());
        p.start().unwrap();
        p.step().unwrap();
        assert!((p.image.analog_inputs[0].scaled() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn cycle_jitter_accumulates_after_multiple_steps() {
        let mut p = plc();
        p.start().unwrap();
        for _ in 0..5 {
            p.step().unwrap();
        }
        let (mean, _variance) = p.cycle_jitter();
        assert!(mean > 0.0);
    }

    #[test]
    fn rung_vector_capped_at_max_rungs() {
        let mut p = plc();
        for i in 0..MAX_RUNGS {
            p.load_program(Language::Il, format!("p{i}"), "NOP\n").unwrap();
        }
        let err = p.load_program(Language::Il, "overflow", "NOP\n").unwrap_err();
        assert_eq!(err.kind, PlcError::Overflow);
    }
}
