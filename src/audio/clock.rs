use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

/// Reloj de reproducción.
///
/// Tracks elapsed playback time of the current track. Time spent paused is
/// never counted, and `set` lets a seek restart the clock at an arbitrary
/// position.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    offset: Duration,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Arranca el reloj. Returns `false` without touching anything if the
    /// clock is already running.
    pub fn start(&mut self, initial_offset: Duration) -> bool {
        if self.is_started() {
            debug!("⏱️ Clock already started");
            return false;
        }

        self.started_at = Some(Instant::now());
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.offset = initial_offset;
        true
    }

    /// Tiempo transcurrido, frozen while paused.
    pub fn elapsed(&self) -> Option<Duration> {
        let Some(started_at) = self.started_at else {
            error!("⏱️ Clock programmer error: elapsed() on a clock that is not started");
            return None;
        };

        let reference = self.paused_at.unwrap_or_else(Instant::now);
        let running = reference
            .saturating_duration_since(started_at)
            .saturating_sub(self.paused_total);

        Some(running + self.offset)
    }

    /// Detiene y resetea el reloj.
    pub fn end(&mut self) -> bool {
        if !self.is_started() {
            error!("⏱️ Clock programmer error: end() on a clock that is not started");
            return false;
        }

        *self = Self::default();
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_started() {
            error!("⏱️ Clock programmer error: pause() on a clock that is not started");
            return false;
        }
        if self.is_paused() {
            error!("⏱️ Clock programmer error: clock is already paused");
            return false;
        }

        self.paused_at = Some(Instant::now());
        true
    }

    pub fn resume(&mut self) -> bool {
        let Some(paused_at) = self.paused_at.take() else {
            error!("⏱️ Clock programmer error: clock is not paused");
            return false;
        };

        self.paused_total += Instant::now().saturating_duration_since(paused_at);
        true
    }

    /// Fuerza el reloj a `position`, started and running, whatever its
    /// previous state was.
    pub fn set(&mut self, position: Duration) {
        self.started_at = Some(Instant::now());
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.offset = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const SEC: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_wall_clock_while_running() {
        let mut clock = PlaybackClock::new();
        assert!(clock.start(Duration::ZERO));

        advance(5 * SEC).await;
        assert_eq!(clock.elapsed(), Some(5 * SEC));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_time_is_not_counted() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::ZERO);

        advance(3 * SEC).await;
        assert!(clock.pause());
        advance(10 * SEC).await;
        assert_eq!(clock.elapsed(), Some(3 * SEC));

        assert!(clock.resume());
        advance(2 * SEC).await;
        assert_eq!(clock.elapsed(), Some(5 * SEC));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_pause_cycles_do_not_drift() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::ZERO);

        for _ in 0..20 {
            advance(SEC).await;
            clock.pause();
            advance(7 * SEC).await;
            clock.resume();
        }

        assert_eq!(clock.elapsed(), Some(20 * SEC));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_reject_wrong_sub_state() {
        let mut clock = PlaybackClock::new();
        assert!(!clock.pause());

        clock.start(Duration::ZERO);
        assert!(!clock.resume());
        assert!(clock.pause());
        assert!(!clock.pause());
        assert!(clock.resume());
        assert!(!clock.resume());
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_keeps_the_first_start() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::ZERO);
        advance(4 * SEC).await;

        assert!(!clock.start(Duration::from_secs(100)));
        assert_eq!(clock.elapsed(), Some(4 * SEC));
    }

    #[test]
    fn unstarted_clock_returns_sentinels() {
        let mut clock = PlaybackClock::new();
        assert_eq!(clock.elapsed(), None);
        assert!(!clock.end());
    }

    #[tokio::test(start_paused = true)]
    async fn end_resets_to_unstarted() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::from_secs(30));
        clock.pause();

        assert!(clock.end());
        assert!(!clock.is_started());
        assert!(!clock.is_paused());
        assert_eq!(clock.elapsed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overrides_a_paused_clock() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::ZERO);
        advance(50 * SEC).await;
        clock.pause();

        clock.set(Duration::from_secs(90));
        assert!(!clock.is_paused());
        assert_eq!(clock.elapsed(), Some(Duration::from_secs(90)));

        advance(SEC).await;
        assert_eq!(clock.elapsed(), Some(Duration::from_secs(91)));
    }

    #[tokio::test(start_paused = true)]
    async fn start_with_initial_offset() {
        let mut clock = PlaybackClock::new();
        clock.start(Duration::from_secs(12));
        advance(SEC).await;
        assert_eq!(clock.elapsed(), Some(Duration::from_secs(13)));
    }
}
