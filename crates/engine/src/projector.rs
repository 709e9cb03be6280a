use messaging::Message;

use crate::description::AggregateDescription;
use crate::error::{EngineError, Result};
use crate::flavour::Flavour;

/// Folds events into aggregate state through an aggregate's apply map.
///
/// Projection is pure: the same state and events always yield the same
/// result, and nothing is read from or written to the store.
pub struct StateProjector<'a, F: Flavour> {
    flavour: &'a F,
    aggregate: &'a AggregateDescription<F>,
}

impl<'a, F: Flavour> StateProjector<'a, F> {
    pub fn new(flavour: &'a F, aggregate: &'a AggregateDescription<F>) -> Self {
        Self { flavour, aggregate }
    }

    /// Fails unless the aggregate has an apply function for `event_name`.
    pub fn ensure_known(&self, event_name: &str) -> Result<()> {
        if self.aggregate.handles(event_name) {
            Ok(())
        } else {
            Err(EngineError::UnknownEventForApplyMap {
                aggregate_type: self.aggregate.aggregate_type().to_string(),
                event_name: event_name.to_string(),
            })
        }
    }

    /// Applies one event. Without prior state the event is treated as the
    /// first of its stream.
    pub fn apply(&self, state: Option<F::State>, event: &Message) -> Result<F::State> {
        let aggregate_type = self.aggregate.aggregate_type();
        let applier =
            self.aggregate
                .applier(event.name())
                .ok_or_else(|| EngineError::UnknownEventForApplyMap {
                    aggregate_type: aggregate_type.to_string(),
                    event_name: event.name().to_string(),
                })?;

        let next = match state {
            None => self.flavour.apply_first_event(aggregate_type, applier, event),
            Some(state) => self
                .flavour
                .apply_subsequent_event(aggregate_type, applier, state, event),
        };
        Ok(next?)
    }

    /// Folds `events` onto `initial`, returning `None` only when there was no
    /// initial state and no events.
    pub fn project<'m, I>(&self, initial: Option<F::State>, events: I) -> Result<Option<F::State>>
    where
        I: IntoIterator<Item = &'m Message>,
    {
        events
            .into_iter()
            .try_fold(initial, |state, event| self.apply(state, event).map(Some))
    }
}
