use std::collections::HashMap;

use parking_lot::RwLock;

use crate::distance::Coordinate;

/// Safe for concurrent get/put; only successful lookups are stored.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: RwLock<HashMap<String, Coordinate>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Coordinate> {
        self.entries.read().get(key).copied()
    }

    pub fn put(&self, key: impl Into<String>, coordinate: Coordinate) {
        self.entries.write().insert(key.into(), coordinate);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn stores_and_returns_coordinates() {
        let cache = GeocodeCache::new();
        assert!(cache.get("서울 중구 세종대로 110").is_none());

        cache.put("서울 중구 세종대로 110", Coordinate::new(37.5665, 126.978));
        assert_eq!(
            cache.get("서울 중구 세종대로 110"),
            Some(Coordinate::new(37.5665, 126.978))
        );
        assert!(cache.get("서울 중구").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        let cache = Arc::new(GeocodeCache::new());
        let handles = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("worker-{worker}-addr-{i}");
                        cache.put(key.clone(), Coordinate::new(f64::from(i), 0.0));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
