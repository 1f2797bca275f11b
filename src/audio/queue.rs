use anyhow::Result;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::audio::item::PlayableItem;

/// Cola de reproducción.
///
/// Plain FIFO with front insertion. The item that is currently playing is
/// never stored here; position `1` is always the next item to play.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<PlayableItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega al final. Returns the 1-based position of the new item.
    pub fn push_back(&mut self, item: PlayableItem) -> Result<usize> {
        self.ensure_space()?;
        info!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Agrega al frente (force play next).
    pub fn push_front(&mut self, item: PlayableItem) -> Result<usize> {
        self.ensure_space()?;
        info!("⏫ Agregado al frente de la cola: {}", item.title());
        self.items.push_front(item);
        Ok(1)
    }

    pub fn pop_front(&mut self) -> Option<PlayableItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => info!("➡️ Siguiente en cola: {}", item.title()),
            None => debug!("📭 Cola vacía, no hay siguiente"),
        }
        next
    }

    /// Elimina por posición 1-based; `None` when out of range.
    pub fn remove_at(&mut self, position: usize) -> Option<PlayableItem> {
        if position == 0 {
            return None;
        }

        let removed = self.items.remove(position - 1);
        if let Some(item) = &removed {
            debug!("❌ Eliminado de la posición {}: {}", position, item.title());
        }
        removed
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Suma de las duraciones finitas. Unbounded items are left out; use
    /// [`MusicQueue::has_unbounded`] to special-case them.
    pub fn total_finite_duration(&self) -> Duration {
        self.items.iter().filter_map(|item| item.duration().finite()).sum()
    }

    pub fn has_unbounded(&self) -> bool {
        self.items.iter().any(|item| item.duration().is_unbounded())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_size.saturating_sub(self.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<PlayableItem> {
        self.items.iter().cloned().collect()
    }

    fn ensure_space(&self) -> Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::item::{CustomAudio, TrackDuration, TranscodeOptions};
    use pretty_assertions::assert_eq;

    fn item(title: &str, secs: Option<u64>) -> PlayableItem {
        PlayableItem::CustomAudio(CustomAudio {
            locator: format!("/music/{}.mp3", title),
            title: title.to_string(),
            duration: secs
                .map(|s| TrackDuration::Finite(Duration::from_secs(s)))
                .unwrap_or(TrackDuration::Unbounded),
            options: TranscodeOptions::default(),
        })
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.snapshot().iter().map(|i| i.title().to_string()).collect()
    }

    #[test]
    fn fifo_with_front_insertion() {
        let mut queue = MusicQueue::new(10);
        queue.push_back(item("a", Some(1))).unwrap();
        queue.push_back(item("b", Some(1))).unwrap();
        queue.push_front(item("c", Some(1))).unwrap();
        queue.push_back(item("d", Some(1))).unwrap();
        queue.push_front(item("e", Some(1))).unwrap();

        assert_eq!(titles(&queue), vec!["e", "c", "a", "b", "d"]);
        assert_eq!(queue.pop_front().map(|i| i.title().to_string()), Some("e".into()));
        assert_eq!(queue.pop_front().map(|i| i.title().to_string()), Some("c".into()));
    }

    #[test]
    fn remove_first_matches_pop_front() {
        let mut a = MusicQueue::new(10);
        let mut b = MusicQueue::new(10);
        for title in ["x", "y", "z"] {
            a.push_back(item(title, Some(1))).unwrap();
            b.push_back(item(title, Some(1))).unwrap();
        }
        b.push_front(item("w", Some(1))).unwrap();
        a.push_front(item("w", Some(1))).unwrap();

        assert_eq!(a.remove_at(1), b.pop_front());
        assert_eq!(titles(&a), titles(&b));
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut queue = MusicQueue::new(10);
        queue.push_back(item("a", Some(1))).unwrap();

        assert_eq!(queue.remove_at(0), None);
        assert_eq!(queue.remove_at(2), None);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remove_at(1).map(|i| i.title().to_string()), Some("a".into()));
        assert!(queue.is_empty());
    }

    #[test]
    fn shuffle_keeps_every_item() {
        let mut queue = MusicQueue::new(100);
        for n in 0..50 {
            queue.push_back(item(&n.to_string(), Some(n))).unwrap();
        }
        queue.shuffle();

        let mut after = titles(&queue);
        after.sort_by_key(|t| t.parse::<u64>().unwrap());
        let expected: Vec<String> = (0..50).map(|n: u64| n.to_string()).collect();
        assert_eq!(after, expected);
    }

    #[test]
    fn finite_total_skips_unbounded_items() {
        let mut queue = MusicQueue::new(10);
        queue.push_back(item("a", Some(180))).unwrap();
        queue.push_back(item("radio", None)).unwrap();
        queue.push_back(item("b", Some(240))).unwrap();

        assert_eq!(queue.total_finite_duration(), Duration::from_secs(420));
        assert!(queue.has_unbounded());
    }

    #[test]
    fn full_queue_rejects_items() {
        let mut queue = MusicQueue::new(1);
        queue.push_back(item("a", Some(1))).unwrap();
        assert!(queue.push_back(item("b", Some(1))).is_err());
        assert!(queue.push_front(item("c", Some(1))).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = MusicQueue::new(10);
        queue.push_back(item("a", Some(1))).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.total_finite_duration(), Duration::ZERO);
    }
}
