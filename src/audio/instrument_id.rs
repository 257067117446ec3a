use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

// names one installed instrument inside the engine; never reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentId(pub u64);

// atomic so transient keyboard builds and reconcile builds never collide
pub fn next_instrument_id() -> InstrumentId {
    InstrumentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}
