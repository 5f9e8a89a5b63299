//! Domain event abstraction.

use std::fmt::Debug;

/// An immutable fact belonging to one aggregate state type.
///
/// `fold` must be pure: same state and event in, same state out. It is the only
/// path by which aggregate state changes.
pub trait DomainEvent: Clone + Debug + Send + Sync + 'static {
    /// The state this event folds into. `Default` is the empty-stream state.
    type State: Clone + Debug + Default + Send + Sync + 'static;

    fn fold(&self, previous: &Self::State) -> Self::State;
}

/// Folds `events` in order onto the default state.
pub fn fold_all<'a, E: DomainEvent>(events: impl IntoIterator<Item = &'a E>) -> E::State {
    events
        .into_iter()
        .fold(E::State::default(), |state, event| event.fold(&state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    enum CounterEvent {
        Added(i64),
        Reset,
    }

    impl DomainEvent for CounterEvent {
        type State = i64;

        fn fold(&self, previous: &i64) -> i64 {
            match self {
                CounterEvent::Added(n) => previous + n,
                CounterEvent::Reset => 0,
            }
        }
    }

    #[test]
    fn fold_all_applies_events_in_order() {
        let events = [
            CounterEvent::Added(2),
            CounterEvent::Added(3),
            CounterEvent::Reset,
            CounterEvent::Added(7),
        ];
        assert_eq!(fold_all(&events), 7);
        assert_eq!(fold_all::<CounterEvent>(&[]), 0);
    }
}
