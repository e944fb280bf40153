use crate::{hardware::Layout, Address};

// This trait transfers execution to an image and is ISA-dependent.
// The caller guarantees the image at `address` has been validated.
pub trait Processor {
    fn setup(&mut self, layout: &Layout);
    fn hand_off(&mut self, address: Address) -> !;
    /// Stop for good. Used when no valid image exists.
    fn halt(&mut self) -> !;
}

#[cfg(feature = "cortex-m")]
mod cortex_m {
    use super::Processor;
    pub struct CortexM {}

    impl CortexM {
        pub fn new() -> Self {
            Self {}
        }
    }

    impl Default for CortexM {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Processor for CortexM {
        fn setup(&mut self, _layout: &crate::hardware::Layout) {
            // Reset state is what the images expect.
        }

        fn hand_off(&mut self, address: super::Address) -> ! {
            unsafe {
                // Point the vector table at the image before jumping into it
                (*cortex_m::peripheral::SCB::PTR).vtor.write(address);

                cortex_m::asm::bootload(address as *const u32);
            }
        }

        fn halt(&mut self) -> ! {
            cortex_m::interrupt::disable();
            loop {
                cortex_m::asm::wfi();
            }
        }
    }
}

#[cfg(feature = "cortex-m")]
// A Processor implementation for use with cortex-m processors
pub use self::cortex_m::CortexM;
