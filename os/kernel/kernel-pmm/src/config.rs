use crate::order::MAX_ORDER;

/// Runtime knobs for [`BuddyAllocator::init`](crate::BuddyAllocator::init).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Upper bound for the largest block order. Values above [`MAX_ORDER`]
    /// are clamped.
    pub order_ceiling: u8,
    /// Keep physical frame 0 out of the free pool so that address zero can
    /// serve as an invalid sentinel.
    pub reserve_null_frame: bool,
}

impl AllocatorConfig {
    pub const DEFAULT: Self = Self {
        order_ceiling: MAX_ORDER,
        reserve_null_frame: false,
    };

    #[must_use]
    pub const fn with_order_ceiling(mut self, order_ceiling: u8) -> Self {
        self.order_ceiling = order_ceiling;
        self
    }

    #[must_use]
    pub const fn with_null_frame_reserved(mut self, reserve: bool) -> Self {
        self.reserve_null_frame = reserve;
        self
    }

    /// The ceiling actually applied, never above [`MAX_ORDER`].
    #[must_use]
    pub const fn effective_ceiling(&self) -> u8 {
        if self.order_ceiling > MAX_ORDER {
            MAX_ORDER
        } else {
            self.order_ceiling
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
