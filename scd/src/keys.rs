use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::types::SurrogateKey;

/// Hands out surrogate keys for the new versions of one merge run.
///
/// Seeded once from the store's current maximum; keys increase by one from there. The
/// counter is atomic so the allocator can be shared by reference.
#[derive(Debug)]
pub struct SurrogateKeyAllocator {
    base: Option<SurrogateKey>,
    last: AtomicI64,
}

impl SurrogateKeyAllocator {
    /// Creates an allocator continuing after `current_max`, or starting at `1` for an empty
    /// store.
    pub fn seeded(current_max: Option<SurrogateKey>) -> Self {
        Self {
            base: current_max,
            last: AtomicI64::new(current_max.unwrap_or(0)),
        }
    }

    /// The maximum key the allocator was seeded with.
    pub fn base(&self) -> Option<SurrogateKey> {
        self.base
    }

    pub fn allocate(&self) -> ScdResult<SurrogateKey> {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                last.checked_add(1)
            });

        match previous {
            Ok(last) => Ok(last + 1),
            Err(_) => bail!(
                ErrorKind::InvalidState,
                "Surrogate key space exhausted",
                format!("base: {:?}", self.base)
            ),
        }
    }

    /// Keys handed out so far, or `None` if nothing was allocated.
    pub fn allocated(&self) -> Option<RangeInclusive<SurrogateKey>> {
        let first = self.base.unwrap_or(0).checked_add(1)?;
        let last = self.last.load(Ordering::Acquire);

        (last >= first).then_some(first..=last)
    }
}
