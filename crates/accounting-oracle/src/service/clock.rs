//! ChainClock: read-only chain time and frame adapter

use crate::domain::{Frame, FrameSchedule};
use crate::error::{OracleError, OracleResult, ReportStep};
use crate::ports::outbound::ChainReader;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Chain time, frame and schedule reads, plus bounded waiting for a new frame.
pub struct ChainClock<C: ChainReader> {
    reader: Arc<C>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<C: ChainReader> ChainClock<C> {
    pub fn new(reader: Arc<C>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            reader,
            poll_interval,
            max_wait,
        }
    }

    pub async fn current_time(&self) -> OracleResult<u64> {
        self.reader
            .current_time()
            .await
            .map_err(|e| OracleError::transport(ReportStep::WaitFrame, None, e))
    }

    pub async fn current_frame(&self) -> OracleResult<Frame> {
        self.reader
            .current_frame()
            .await
            .map_err(|e| OracleError::transport(ReportStep::WaitFrame, None, e))
    }

    pub async fn frame_schedule(&self) -> OracleResult<FrameSchedule> {
        self.reader
            .frame_schedule()
            .await
            .map_err(|e| OracleError::transport(ReportStep::WaitFrame, None, e))
    }

    /// Wait until a frame newer than `last_ref_slot` is open.
    ///
    /// Returns immediately when nothing was reported yet. Sleeps at most
    /// `poll_interval` between reads, or less when chain time says the next
    /// frame opens sooner, and gives up after `max_wait`.
    pub async fn wait_for_next_frame(&self, last_ref_slot: Option<u64>) -> OracleResult<Frame> {
        let started = tokio::time::Instant::now();

        loop {
            let frame = self.current_frame().await?;
            let last = match last_ref_slot {
                Some(last) if frame.ref_slot <= last => last,
                _ => return Ok(frame),
            };

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(OracleError::FrameWaitTimeout {
                    last_ref_slot: last,
                    waited_secs: waited.as_secs(),
                });
            }

            let schedule = self.frame_schedule().await?;
            let now = self.current_time().await?;
            let opens_at = schedule.frame_start_time(schedule.next_ref_slot(frame.ref_slot));
            let until_open = Duration::from_secs(opens_at.saturating_sub(now));
            let sleep_for = if until_open.is_zero() {
                self.poll_interval
            } else {
                until_open.min(self.poll_interval)
            }
            .min(self.max_wait - waited);

            debug!(
                ref_slot = frame.ref_slot,
                last_ref_slot = last,
                sleep_ms = sleep_for.as_millis() as u64,
                "[oracle] Waiting for next frame"
            );
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, GatewayResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Frame advances after a fixed number of reads.
    struct SteppingReader {
        reads: AtomicU64,
        advance_after: u64,
        schedule: FrameSchedule,
    }

    impl SteppingReader {
        fn new(advance_after: u64) -> Self {
            Self {
                reads: AtomicU64::new(0),
                advance_after,
                schedule: FrameSchedule {
                    slots_per_epoch: 32,
                    seconds_per_slot: 12,
                    epochs_per_frame: 1,
                    genesis_time: 0,
                    initial_epoch: 0,
                },
            }
        }
    }

    #[async_trait]
    impl ChainReader for SteppingReader {
        async fn current_time(&self) -> GatewayResult<u64> {
            Ok(0)
        }

        async fn current_frame(&self) -> GatewayResult<Frame> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst);
            let ref_slot = if reads >= self.advance_after { 63 } else { 31 };
            Ok(Frame::new(ref_slot, &self.schedule))
        }

        async fn frame_schedule(&self) -> GatewayResult<FrameSchedule> {
            Ok(self.schedule)
        }
    }

    struct DownReader;

    #[async_trait]
    impl ChainReader for DownReader {
        async fn current_time(&self) -> GatewayResult<u64> {
            Err(GatewayError::Unavailable {
                call: "current_time",
                reason: "down".into(),
            })
        }

        async fn current_frame(&self) -> GatewayResult<Frame> {
            Err(GatewayError::Unavailable {
                call: "current_frame",
                reason: "down".into(),
            })
        }

        async fn frame_schedule(&self) -> GatewayResult<FrameSchedule> {
            Err(GatewayError::Unavailable {
                call: "frame_schedule",
                reason: "down".into(),
            })
        }
    }

    fn clock<C: ChainReader>(reader: C, max_wait_secs: u64) -> ChainClock<C> {
        ChainClock::new(
            Arc::new(reader),
            Duration::from_secs(12),
            Duration::from_secs(max_wait_secs),
        )
    }

    #[tokio::test]
    async fn test_first_cycle_does_not_wait() {
        let clock = clock(SteppingReader::new(100), 60);
        let frame = clock.wait_for_next_frame(None).await.unwrap();
        assert_eq!(frame.ref_slot, 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_frame_advances() {
        let clock = clock(SteppingReader::new(3), 3_600);
        let frame = clock.wait_for_next_frame(Some(31)).await.unwrap();
        assert_eq!(frame.ref_slot, 63);
        assert_eq!(clock.reader.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_bounded() {
        let clock = clock(SteppingReader::new(u64::MAX), 60);
        let result = clock.wait_for_next_frame(Some(31)).await;
        assert!(matches!(
            result,
            Err(OracleError::FrameWaitTimeout {
                last_ref_slot: 31,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let clock = clock(DownReader, 60);
        let result = clock.current_frame().await;
        assert!(matches!(
            result,
            Err(OracleError::Transport {
                step: ReportStep::WaitFrame,
                ..
            })
        ));
    }
}
