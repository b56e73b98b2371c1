//! Bus command sequencer.
//!
//! The sequencer executes a [`Program`] one bus cycle at a time. Every write
//! or read takes three cycles: an idle cycle that dispatches it, a select
//! cycle that drives chip-select, strobe, address and data, and a deselect
//! cycle that samples read data and releases the bus. `Delay` occupies one
//! idle cycle per count.

use std::sync::Arc;

use crate::bus::command::{BusCommand, Program};
use crate::bus::pins::BusPins;
use crate::bus::source::{ByteSource, FileSource, ReadCapture, SliceSource};
use crate::replay::ReplayTable;
use crate::DETAIL_TARGET;

/// Bus transaction phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusTransactionState {
    /// No transaction on the bus; the next command iteration may dispatch.
    #[default]
    Idle,
    /// A transaction was dispatched and is driven on the next cycle.
    Select,
    /// The transaction is on the bus and is released on the next cycle.
    Deselect,
}

/// What one sequencer step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusActivity {
    /// One cycle of a `Delay`.
    Delay,
    /// Held by `WaitVSync` or by a replay timestamp gap.
    Waiting,
    /// A transaction was dispatched.
    Dispatch {
        /// Target register.
        reg: u8,
        /// True for reads.
        read: bool,
    },
    /// Chip-select and strobe were asserted.
    Select {
        /// Target register.
        reg: u8,
        /// Byte presented for writes, 0 for reads.
        data: u8,
        /// True for reads.
        read: bool,
    },
    /// The bus was released.
    Deselect {
        /// Target register.
        reg: u8,
        /// Byte written, or byte captured for reads.
        data: u8,
        /// True for reads.
        read: bool,
    },
    /// The program has completed.
    Finished,
}

/// Saturating counters kept by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerStats {
    /// Bus cycles stepped.
    pub bus_cycles: u64,
    /// Completed write transactions.
    pub writes: u64,
    /// Completed read transactions.
    pub reads: u64,
    /// Data cursors that ran past their source.
    pub cursor_overflows: u64,
    /// Byte captured by the most recent read.
    pub last_read: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transaction {
    reg: u8,
    data: u8,
    read: bool,
}

/// Per-command execution state, reset on every fetch.
#[derive(Default)]
struct Active {
    command: Option<BusCommand>,
    count: u32,
    done: u32,
    source: Option<Box<dyn ByteSource>>,
    capture: Option<ReadCapture>,
}

/// Program executor driving the external register bus.
pub struct Sequencer {
    program: Program,
    replay: Option<Arc<ReplayTable>>,
    pc: usize,
    active: Active,
    state: BusTransactionState,
    pending: Transaction,
    waiting_vsync: bool,
    finished: bool,
    fast_mode: bool,
    fast_trigger: u8,
    replay_anchor: (u64, usize),
    replay_index: usize,
    stats: SequencerStats,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("pc", &self.pc)
            .field("command", &self.active.command)
            .field("done", &self.active.done)
            .field("count", &self.active.count)
            .field("state", &self.state)
            .field("waiting_vsync", &self.waiting_vsync)
            .field("finished", &self.finished)
            .field("fast_mode", &self.fast_mode)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Sequencer {
    /// Creates a sequencer positioned before the first command of `program`.
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self {
            program,
            replay: None,
            pc: 0,
            active: Active::default(),
            state: BusTransactionState::Idle,
            pending: Transaction {
                reg: 0,
                data: 0,
                read: false,
            },
            waiting_vsync: false,
            finished: false,
            fast_mode: false,
            fast_trigger: crate::regs::AUDIO_CTRL,
            replay_anchor: (0, 0),
            replay_index: 0,
            stats: SequencerStats::default(),
        }
    }

    /// Attaches the table consumed by `RegWriteReplay`.
    #[must_use]
    pub fn with_replay(mut self, table: impl Into<Arc<ReplayTable>>) -> Self {
        self.replay = Some(table.into());
        self
    }

    /// Starts in fast mode; a write to `trigger` turns it off.
    #[must_use]
    pub fn with_fast_mode(mut self, enabled: bool, trigger: u8) -> Self {
        self.fast_mode = enabled;
        self.fast_trigger = trigger & crate::regs::REGISTER_MASK;
        self
    }

    /// Executes one bus cycle against `pins`.
    pub fn step(&mut self, pins: &mut dyn BusPins) -> BusActivity {
        let cycle = self.stats.bus_cycles;
        self.stats.bus_cycles = self.stats.bus_cycles.saturating_add(1);
        match self.state {
            BusTransactionState::Select => self.select(pins),
            BusTransactionState::Deselect => self.deselect(pins, cycle),
            BusTransactionState::Idle => self.idle(cycle),
        }
    }

    fn select(&mut self, pins: &mut dyn BusPins) -> BusActivity {
        let Transaction { reg, data, read } = self.pending;
        if !read {
            pins.set_data(data);
        }
        pins.assert(true, read, !read, reg);
        self.state = BusTransactionState::Deselect;
        BusActivity::Select {
            reg,
            data: if read { 0 } else { data },
            read,
        }
    }

    fn deselect(&mut self, pins: &mut dyn BusPins, cycle: u64) -> BusActivity {
        let Transaction { reg, mut data, read } = self.pending;
        if read {
            data = pins.data();
            self.stats.reads = self.stats.reads.saturating_add(1);
            self.stats.last_read = Some(data);
            if let Some(capture) = self.active.capture.as_mut() {
                capture.push(data);
            }
            log::trace!(target: DETAIL_TARGET, "cycle {cycle}: read  [{reg:02X}] -> {data:02X}");
        } else {
            self.stats.writes = self.stats.writes.saturating_add(1);
            log::trace!(target: DETAIL_TARGET, "cycle {cycle}: write [{reg:02X}] <- {data:02X}");
            if self.fast_mode && reg == self.fast_trigger {
                log::info!("fast mode ended by write to register {reg:#04x} at bus cycle {cycle}");
                self.end_fast_mode(cycle);
            }
        }
        pins.assert(false, false, false, reg);
        self.state = BusTransactionState::Idle;
        BusActivity::Deselect { reg, data, read }
    }

    fn idle(&mut self, cycle: u64) -> BusActivity {
        if self.finished {
            return BusActivity::Finished;
        }
        if self.waiting_vsync {
            return BusActivity::Waiting;
        }
        while self.active.done >= self.active.count {
            if let Some(activity) = self.fetch(cycle) {
                return activity;
            }
        }
        self.iterate(cycle)
    }

    /// Loads the next command. Returns an activity when the command resolves
    /// without iterating.
    fn fetch(&mut self, cycle: u64) -> Option<BusActivity> {
        let command = self
            .program
            .get(self.pc)
            .cloned()
            .unwrap_or(BusCommand::Done);
        self.pc = self.pc.saturating_add(1);
        log::debug!(target: DETAIL_TARGET, "cycle {cycle}: fetch {} ({command:?})", command.mnemonic());

        let mut count = command.repeat_count();
        let mut source: Option<Box<dyn ByteSource>> = None;
        let mut capture = None;
        match &command {
            BusCommand::Done => {
                log::info!("bus program complete after {cycle} bus cycles");
                self.finished = true;
                self.active = Active::default();
                return Some(BusActivity::Finished);
            }
            BusCommand::WaitVSync => {
                // no iteration of its own: the bus is blocked from this cycle,
                // and the cycle after the release fetches the next command
                self.waiting_vsync = true;
                self.active = Active::default();
                return Some(BusActivity::Waiting);
            }
            BusCommand::RegWriteReplay => {
                count = self.replay.as_ref().map_or(0, |table| {
                    u32::try_from(table.len()).unwrap_or(u32::MAX)
                });
                if count == 0 {
                    log::warn!("replay command without a replay table, skipped");
                }
                self.replay_anchor = (cycle, 0);
                self.replay_index = 0;
            }
            BusCommand::RegWriteArray { bytes, .. } => {
                source = Some(Box::new(SliceSource::new(Arc::clone(bytes))));
            }
            BusCommand::RegWriteFile { path, .. } => {
                source = Some(Box::new(FileSource::new(path.clone())));
            }
            BusCommand::RegReadFile { path, .. } => {
                capture = Some(ReadCapture::new(path.clone()));
            }
            BusCommand::Delay { .. }
            | BusCommand::RegWrite { .. }
            | BusCommand::RegWriteRepeated { .. }
            | BusCommand::RegRead { .. } => {}
        }

        self.active = Active {
            command: Some(command),
            count,
            done: 0,
            source,
            capture,
        };
        None
    }

    fn iterate(&mut self, cycle: u64) -> BusActivity {
        let Some(command) = self.active.command.as_ref() else {
            return BusActivity::Finished;
        };
        let transaction = match command {
            BusCommand::Delay { .. } => {
                self.active.done += 1;
                return BusActivity::Delay;
            }
            BusCommand::RegWrite { reg, value } | BusCommand::RegWriteRepeated { reg, value, .. } => {
                Transaction {
                    reg: *reg,
                    data: *value,
                    read: false,
                }
            }
            BusCommand::RegWriteArray { reg, .. } | BusCommand::RegWriteFile { reg, .. } => {
                let reg = *reg;
                Transaction {
                    reg,
                    data: self.next_source_byte(),
                    read: false,
                }
            }
            BusCommand::RegRead { reg } | BusCommand::RegReadFile { reg, .. } => Transaction {
                reg: *reg,
                data: 0,
                read: true,
            },
            BusCommand::RegWriteReplay => match self.replay_transaction(cycle) {
                Some(transaction) => transaction,
                None => return BusActivity::Waiting,
            },
            BusCommand::Done | BusCommand::WaitVSync => return BusActivity::Finished,
        };

        self.active.done += 1;
        self.pending = transaction;
        self.state = BusTransactionState::Select;
        BusActivity::Dispatch {
            reg: transaction.reg,
            read: transaction.read,
        }
    }

    fn next_source_byte(&mut self) -> u8 {
        let Some(source) = self.active.source.as_mut() else {
            return 0;
        };
        if let Some(byte) = source.next_byte() {
            return byte;
        }
        self.stats.cursor_overflows = self.stats.cursor_overflows.saturating_add(1);
        log::warn!(
            "data source exhausted at iteration {} of {}, restarting from the first byte",
            self.active.done,
            self.active.count
        );
        source.rewind();
        source.next_byte().unwrap_or(0)
    }

    fn replay_transaction(&mut self, cycle: u64) -> Option<Transaction> {
        let table = self.replay.as_ref()?;
        let event = table.get(self.replay_index)?;
        if !self.fast_mode {
            let (anchor_cycle, anchor_index) = self.replay_anchor;
            let gap = table
                .offset_cycles(self.replay_index)
                .saturating_sub(table.offset_cycles(anchor_index));
            if cycle < anchor_cycle.saturating_add(gap) {
                return None;
            }
        }
        self.replay_index += 1;
        Some(Transaction {
            reg: event.register,
            data: event.data,
            read: event.is_read,
        })
    }

    fn end_fast_mode(&mut self, cycle: u64) {
        self.fast_mode = false;
        if let Some(last) = self.replay_index.checked_sub(1) {
            self.replay_anchor = (cycle, last);
        }
    }

    /// Releases a pending `WaitVSync`; called on every vsync falling edge.
    #[allow(clippy::missing_const_for_fn)]
    pub fn notify_vsync(&mut self) {
        self.waiting_vsync = false;
    }

    /// Switches fast mode; turning it off rebases replay pacing on the last
    /// executed cycle, as a trigger write does.
    pub fn set_fast_mode(&mut self, enabled: bool) {
        if self.fast_mode && !enabled {
            self.end_fast_mode(self.stats.bus_cycles.saturating_sub(1));
        } else {
            self.fast_mode = enabled;
        }
    }

    /// Returns true while replay gaps are skipped.
    #[must_use]
    pub const fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    /// Returns true once `Done` has executed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true while blocked on `WaitVSync`.
    #[must_use]
    pub const fn is_waiting_vsync(&self) -> bool {
        self.waiting_vsync
    }

    /// Current transaction phase.
    #[must_use]
    pub const fn state(&self) -> BusTransactionState {
        self.state
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    /// Index of the next command to fetch.
    #[must_use]
    pub const fn program_counter(&self) -> usize {
        self.pc
    }

    /// Replay events issued and the table length.
    #[must_use]
    pub fn replay_progress(&self) -> (usize, usize) {
        (
            self.replay_index,
            self.replay.as_ref().map_or(0, |table| table.len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{BusActivity, BusTransactionState, Sequencer};
    use crate::bus::command::{BusCommand, Program};
    use crate::bus::pins::StrobedBus;
    use crate::chip::BusLines;

    fn run(seq: &mut Sequencer, lines: &mut BusLines, cycles: usize) -> Vec<BusActivity> {
        (0..cycles)
            .map(|_| seq.step(&mut StrobedBus::new(lines)))
            .collect()
    }

    #[test]
    fn write_takes_dispatch_select_deselect() {
        let mut seq = Sequencer::new(Program::new(vec![BusCommand::reg_write(0x05, 0x80)]));
        let mut lines = BusLines::default();
        let trace = run(&mut seq, &mut lines, 4);
        assert_eq!(
            trace,
            vec![
                BusActivity::Dispatch { reg: 5, read: false },
                BusActivity::Select {
                    reg: 5,
                    data: 0x80,
                    read: false
                },
                BusActivity::Deselect {
                    reg: 5,
                    data: 0x80,
                    read: false
                },
                BusActivity::Finished,
            ]
        );
        assert!(seq.is_finished());
        assert!(lines.cs_n);
        assert_eq!(seq.state(), BusTransactionState::Idle);
    }

    #[test]
    fn read_captures_chip_data_on_deselect() {
        let mut seq = Sequencer::new(Program::new(vec![BusCommand::reg_read(0x07)]));
        let mut lines = BusLines {
            data_out: 0x3C,
            ..BusLines::default()
        };
        let trace = run(&mut seq, &mut lines, 3);
        assert_eq!(
            trace[2],
            BusActivity::Deselect {
                reg: 7,
                data: 0x3C,
                read: true
            }
        );
        assert_eq!(seq.stats().last_read, Some(0x3C));
        assert_eq!(seq.stats().reads, 1);
    }

    #[test]
    fn zero_count_commands_are_skipped() {
        let mut seq = Sequencer::new(Program::new(vec![
            BusCommand::delay(0),
            BusCommand::reg_write_repeated(1, 2, 0),
            BusCommand::reg_write(3, 4),
        ]));
        let mut lines = BusLines::default();
        assert_eq!(
            seq.step(&mut StrobedBus::new(&mut lines)),
            BusActivity::Dispatch { reg: 3, read: false }
        );
    }

    #[test]
    fn wait_vsync_holds_until_notified() {
        let mut seq = Sequencer::new(Program::new(vec![
            BusCommand::wait_vsync(),
            BusCommand::reg_write(0, 1),
        ]));
        let mut lines = BusLines::default();
        let trace = run(&mut seq, &mut lines, 5);
        assert!(trace.iter().all(|a| *a == BusActivity::Waiting));
        assert!(seq.is_waiting_vsync());
        seq.notify_vsync();
        assert_eq!(
            seq.step(&mut StrobedBus::new(&mut lines)),
            BusActivity::Dispatch { reg: 0, read: false }
        );
    }

    #[test]
    fn exhausted_program_synthesizes_done() {
        let mut seq = Sequencer::new(Program::default());
        let mut lines = BusLines::default();
        assert_eq!(
            seq.step(&mut StrobedBus::new(&mut lines)),
            BusActivity::Finished
        );
        assert!(seq.is_finished());
    }
}
