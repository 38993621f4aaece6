use crate::MaybeAsync;

/// A generic listener type that can be invoked multiple times
pub trait Listener<T>: Send {
    /// inform the listener that the value has changed
    fn update(&mut self, _value: T) -> MaybeAsync<()> {
        MaybeAsync::ready(())
    }
}

/// Listener that does nothing
#[derive(Copy, Clone)]
pub(crate) struct NullListener;

impl NullListener {
    /// create a Box<dyn Listener<T>> that does nothing
    pub(crate) fn create<T>() -> Box<dyn Listener<T>> {
        Box::new(NullListener)
    }
}

impl<T> Listener<T> for NullListener {}

impl<T> Listener<T> for tokio::sync::mpsc::UnboundedSender<T>
where
    T: Send,
{
    fn update(&mut self, value: T) -> MaybeAsync<()> {
        // a dropped receiver only means nobody is watching
        let _ = self.send(value);
        MaybeAsync::ready(())
    }
}

/// State of the link to the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortState {
    /// waiting before the next attempt to open the port
    Wait(std::time::Duration),
    /// port is open
    Open,
    /// the bridge has been shut down
    Shutdown,
}
