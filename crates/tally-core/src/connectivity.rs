//! Connectivity signal capability.

/// Whether the network path to the collector is believed usable.
///
/// The core never manages links itself; it only asks this question before
/// scheduling a delivery attempt.
pub trait ConnectivitySignal {
    /// `true` if a delivery attempt is worth making now.
    fn is_online(&self) -> bool;
}

impl<F: Fn() -> bool> ConnectivitySignal for F {
    fn is_online(&self) -> bool {
        self()
    }
}
