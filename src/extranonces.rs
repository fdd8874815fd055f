use super::*;

/// Issues the per-session extranonce1. The instance id occupies the top five
/// bits so that several pool processes behind one node hand out disjoint
/// ranges.
#[derive(Debug)]
pub struct ExtranonceCounter {
    counter: AtomicU32,
}

impl ExtranonceCounter {
    pub fn new(instance_id: u32) -> Self {
        Self {
            counter: AtomicU32::new(instance_id << 27),
        }
    }

    pub fn next(&self) -> String {
        hex::encode(self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes())
    }
}

/// A random instance id when none is configured.
pub fn random_instance_id() -> u32 {
    rand::random::<u32>() >> 27
}
