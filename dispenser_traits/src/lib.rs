pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A bank of on/off outputs (relays driving pumps), addressed by pin number.
///
/// `energize`/`release` speak in logical terms; electrical polarity
/// (active-low boards) is the implementation's concern.
pub trait RelayBank {
    fn energize(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn release(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<B: RelayBank + ?Sized> RelayBank for Box<B> {
    fn energize(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).energize(pin)
    }
    fn release(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).release(pin)
    }
}
