//! Integration-level tests for the concrete scenarios in spec.md §8.
//! Scenario 1 (triple-majority gate) and scenario 6 (timeout) already
//! live as inline unit tests beside the VM; this file covers the
//! remaining four against a real `Plc` built on the simulated driver.

use plc_core::hardware::SimDriver;
use plc_core::parser::Language;
use plc_core::scan::Config;
use plc_core::Plc;

/// Scenario 2: Euclidean GCD via repeated subtraction on two memory
/// counters, entirely within one scan. `gcd(255, 34) = 17`.
#[test]
fn euclidean_gcd_converges_in_one_scan() {
    let src = "\
LD %i0/8
ST %M0
LD %i1/8
ST %M1
loop: LD %m0
EQ %m1
JMP? done
LD %m0
GT %m1
JMP? take_m0
LD %m1
SUB %m0
ST %M1
JMP loop
take_m0: LD %m0
SUB %m1
ST %M0
JMP loop
done: LD %m0
ST %Q0/8
";
    let config = Config {
        digital_inputs: 16,
        digital_outputs: 8,
        analog_inputs: 0,
        analog_outputs: 0,
        timers: 0,
        blinkers: 0,
        memory: 2,
        real_memory: 0,
        step_ms: 50,
    };
    let mut plc = Plc::new(config, Box::new(SimDriver::new(16, 8, 0, 0)));
    plc.load_program(Language::Il, "gcd", src).unwrap();
    plc.start().unwrap();

    // 255 = 0xFF on the first input byte, 34 = 0x22 on the second.
    for i in 0..8 {
        plc.force_digital_input(i, true).unwrap();
    }
    for i in [8 + 1, 8 + 5] {
        plc.force_digital_input(i, true).unwrap();
    }

    plc.step().unwrap();
    let out = plc.image.encode_digital_outputs();
    assert_eq!(out[0], 17);
}

/// Scenario 3: feeding six samples `1.0..=6.0` one per scan, a
/// hand-rolled Welford's algorithm converges to the sample variance
/// within `FLOAT_PRECISION`.
#[test]
fn streaming_variance_matches_closed_form() {
    // %mf5 holds the constant 1.0 the program adds each scan — the IL
    // grammar has no integer/real literals, only operand reads.
    let src = "\
LD %mf0
ADD %mf5
ST %MF0
LD %if0
SUB %mf1
ST %MF3
LD %mf3
DIV %mf0
ADD %mf1
ST %MF1
LD %if0
SUB %mf1
MUL %mf3
ADD %mf2
ST %MF2
LD %mf0
SUB %mf5
ST %MF4
LD %mf2
DIV %mf4
ST %QF0
";
    let config = Config {
        digital_inputs: 8,
        digital_outputs: 8,
        analog_inputs: 1,
        analog_outputs: 1,
        timers: 0,
        blinkers: 0,
        memory: 0,
        real_memory: 6,
        step_ms: 50,
    };
    let mut plc = Plc::new(config, Box::new(SimDriver::new(8, 8, 1, 1)));
    plc.image.real_memory[5].value = 1.0;
    plc.image.analog_inputs[0].min = 0.0;
    plc.image.analog_inputs[0].max = 10.0;
    plc.image.analog_outputs[0].min = 0.0;
    plc.image.analog_outputs[0].max = 10.0;
    plc.load_program(Language::Il, "variance", src).unwrap();
    plc.start().unwrap();

    for x in 1..=6 {
        // First scan divides by `count - 1 == 0`; the rung faults and is
        // skipped for that one instruction, the rest of the cycle stands.
        plc.force_analog_input(0, x as f64).unwrap();
        let _ = plc.step();
    }

    let samples = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let expected_variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() as f64 - 1.0);

    let got = plc.image.analog_outputs[0].scaled();
    assert!(
        (got - expected_variance).abs() < 1e-6,
        "got {got}, expected {expected_variance}"
    );
}

/// Scenario 4: one forced input bit drives four direct-coil and four
/// `SET`-coil outputs; the encoded raw byte is `0xFF`.
#[test]
fn encode_round_trip_via_direct_and_set_coils() {
    let src = "\
LD %i0/0
ST %Q0/0
LD %i0/0
ST %Q0/1
LD %i0/0
ST %Q0/2
LD %i0/0
ST %Q0/3
LD %i0/0
S %Q0/4
LD %i0/0
S %Q0/5
LD %i0/0
S %Q0/6
LD %i0/0
S %Q0/7
";
    let config = Config {
        digital_inputs: 8,
        digital_outputs: 8,
        analog_inputs: 0,
        analog_outputs: 0,
        timers: 0,
        blinkers: 0,
        memory: 0,
        real_memory: 0,
        step_ms: 50,
    };
    let mut plc = Plc::new(config, Box::new(SimDriver::new(8, 8, 0, 0)));
    plc.load_program(Language::Il, "encode", src).unwrap();
    plc.start().unwrap();
    plc.force_digital_input(0, true).unwrap();
    plc.step().unwrap();

    let out = plc.image.encode_digital_outputs();
    assert_eq!(out[0], 0xFF);
}

/// Scenario 5: analog forcing accepts strictly-interior values and
/// rejects out-of-range ones; unforcing restores normal sampling.
#[test]
fn analog_forcing_respects_bounds() {
    let config = Config {
        digital_inputs: 8,
        digital_outputs: 8,
        analog_inputs: 2,
        analog_outputs: 2,
        timers: 0,
        blinkers: 0,
        memory: 0,
        real_memory: 0,
        step_ms: 50,
    };
    let mut plc = Plc::new(config, Box::new(SimDriver::new(8, 8, 2, 2)));
    plc.image.analog_inputs[1].min = 0.0;
    plc.image.analog_inputs[1].max = 2.0;

    assert!(plc.force_analog_input(1, 1.5).unwrap());
    assert!(plc.image.analog_inputs[1].is_forced());

    assert!(!plc.force_analog_input(1, -1.5).unwrap());
    assert!(plc.image.analog_inputs[1].is_forced());

    plc.unforce_analog_input(1).unwrap();
    assert!(!plc.image.analog_inputs[1].is_forced());
}
