//! Run fingerprint used to compare simulation determinism across hosts.

use log as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use tempfile as _;
use thiserror as _;
use vsim_core::regs::{ADDR_H, AUDIO_DATA, DATA0};
use vsim_core::{BusCommand, NullObserver, Program, ReferenceChip, SimConfig, Simulation, StopReason};

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint() -> String {
    let program = Program::new(vec![
        BusCommand::delay(50),
        BusCommand::reg_write(ADDR_H, 0x10),
        BusCommand::reg_write_array(DATA0, vec![0x01, 0x23, 0x45, 0x67, 0x89], 640),
        BusCommand::reg_write_repeated(AUDIO_DATA, 0x30, 8),
        BusCommand::wait_vsync(),
        BusCommand::reg_read(DATA0),
        BusCommand::wait_vsync(),
        BusCommand::wait_vsync(),
        BusCommand::wait_vsync(),
        BusCommand::done(),
    ]);
    let config = SimConfig {
        max_frames: Some(2),
        ..SimConfig::default()
    };
    let chip = ReferenceChip::new(config.timing).with_transaction_log();
    let mut sim = Simulation::new(config, chip, program, None).expect("default clocks are valid");
    let summary = sim.run(&mut NullObserver);

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    hash_bytes(&mut hash, &summary.ticks.to_le_bytes());
    hash_bytes(&mut hash, &summary.frames.to_le_bytes());
    hash_bytes(&mut hash, &summary.bus.writes.to_le_bytes());
    hash_bytes(&mut hash, &summary.bus.reads.to_le_bytes());
    hash_bytes(&mut hash, &summary.audio_samples.to_le_bytes());
    hash_bytes(
        &mut hash,
        &[match summary.reason {
            StopReason::Interrupted => 0x10,
            StopReason::ProgramDone => 0x11,
            StopReason::FrameLimit => 0x12,
            StopReason::ObserverRequested => 0x13,
            StopReason::ChipFinished => 0x14,
        }],
    );

    let chip = sim.into_chip();
    for transaction in chip.transactions() {
        hash_bytes(&mut hash, &transaction.tick.to_le_bytes());
        hash_bytes(&mut hash, &[transaction.reg, transaction.data, u8::from(transaction.read)]);
    }
    hash_bytes(&mut hash, chip.vram());

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
