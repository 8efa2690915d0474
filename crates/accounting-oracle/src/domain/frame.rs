//! Reporting frame schedule
//!
//! A frame is a fixed run of epochs. Every frame is anchored to a reference
//! slot, the last slot of the epoch preceding the frame start, and the oracle
//! report for that frame describes the chain as of that slot.

use serde::{Deserialize, Serialize};

/// Frame and chain timing constants published by the consensus committee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSchedule {
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    pub epochs_per_frame: u64,
    /// Unix time of slot 0
    pub genesis_time: u64,
    /// First epoch covered by the committee
    pub initial_epoch: u64,
}

impl Default for FrameSchedule {
    fn default() -> Self {
        Self {
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            epochs_per_frame: 225,
            genesis_time: 1_606_824_023,
            initial_epoch: 0,
        }
    }
}

impl FrameSchedule {
    pub fn slots_per_frame(&self) -> u64 {
        self.slots_per_epoch.saturating_mul(self.epochs_per_frame)
    }

    pub fn seconds_per_frame(&self) -> u64 {
        self.slots_per_frame().saturating_mul(self.seconds_per_slot)
    }

    /// Unix time at which `slot` starts.
    pub fn slot_time(&self, slot: u64) -> u64 {
        self.genesis_time
            .saturating_add(slot.saturating_mul(self.seconds_per_slot))
    }

    /// Timestamp the accounting collaborator attributes to a report.
    pub fn report_timestamp(&self, ref_slot: u64) -> u64 {
        self.slot_time(ref_slot)
    }

    /// Time covered by a single report.
    pub fn time_elapsed(&self) -> u64 {
        self.seconds_per_frame()
    }

    /// Reference slot of the frame following the one anchored at `ref_slot`.
    pub fn next_ref_slot(&self, ref_slot: u64) -> u64 {
        ref_slot.saturating_add(self.slots_per_frame())
    }

    /// Unix time at which the frame anchored at `ref_slot` opens.
    pub fn frame_start_time(&self, ref_slot: u64) -> u64 {
        self.slot_time(ref_slot.saturating_add(1))
    }

    /// Frame open at `timestamp`.
    pub fn frame_at(&self, timestamp: u64) -> Frame {
        let seconds_per_epoch = self.slots_per_epoch.saturating_mul(self.seconds_per_slot);
        let epoch = if seconds_per_epoch == 0 {
            0
        } else {
            timestamp.saturating_sub(self.genesis_time) / seconds_per_epoch
        };
        let frame_index = if self.epochs_per_frame == 0 {
            0
        } else {
            epoch.saturating_sub(self.initial_epoch) / self.epochs_per_frame
        };
        let frame_start_epoch = self.initial_epoch + frame_index * self.epochs_per_frame;
        let next_frame_start_epoch = frame_start_epoch + self.epochs_per_frame;

        Frame {
            ref_slot: (frame_start_epoch * self.slots_per_epoch).saturating_sub(1),
            report_processing_deadline_slot: (next_frame_start_epoch * self.slots_per_epoch)
                .saturating_sub(1),
        }
    }
}

/// The committee's currently open reporting frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub ref_slot: u64,
    /// Last slot at which a report for this frame may still be processed
    pub report_processing_deadline_slot: u64,
}

impl Frame {
    pub fn new(ref_slot: u64, schedule: &FrameSchedule) -> Self {
        Self {
            ref_slot,
            report_processing_deadline_slot: schedule.next_ref_slot(ref_slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schedule() -> FrameSchedule {
        FrameSchedule {
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            epochs_per_frame: 1,
            genesis_time: 0,
            initial_epoch: 0,
        }
    }

    #[test]
    fn test_frame_at_epoch_boundary() {
        let schedule = test_schedule();
        // Epoch 5 starts at 5 * 32 * 12
        let frame = schedule.frame_at(5 * 384);
        assert_eq!(frame.ref_slot, 159);
        assert_eq!(frame.report_processing_deadline_slot, 191);

        // Still in the same frame one second before the next epoch
        assert_eq!(schedule.frame_at(6 * 384 - 1).ref_slot, 159);
    }

    #[test]
    fn test_frame_before_initial_epoch_saturates() {
        let schedule = FrameSchedule {
            initial_epoch: 10,
            epochs_per_frame: 4,
            ..test_schedule()
        };
        let frame = schedule.frame_at(0);
        assert_eq!(frame.ref_slot, 10 * 32 - 1);
    }

    #[test]
    fn test_frame_start_time_follows_ref_slot() {
        let schedule = test_schedule();
        let frame = schedule.frame_at(5 * 384);
        assert_eq!(schedule.frame_start_time(frame.ref_slot), 5 * 384);
        assert_eq!(
            schedule.frame_at(schedule.frame_start_time(frame.ref_slot)),
            frame
        );
    }

    #[test]
    fn test_default_frame_lengths() {
        let schedule = FrameSchedule::default();
        assert_eq!(schedule.slots_per_frame(), 7200);
        assert_eq!(schedule.time_elapsed(), 86_400);
        assert_eq!(schedule.next_ref_slot(7199), 14_399);
    }
}
