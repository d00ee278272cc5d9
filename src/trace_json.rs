//! JSON (de)serialization for a completed [`Trace`](crate::Trace), gated
//! behind the `trace-serde` feature. `braid` itself has no file or network
//! I/O (`spec.md` §6); this exists purely so external tooling — regression
//! diffing, a trace viewer, a replay log — can consume a finished run
//! without depending on `braid`'s internal types directly.

use crate::rt::trace::Trace;

/// Serializes a trace to its JSON wire form.
pub fn to_json(trace: &Trace) -> serde_json::Result<String> {
    serde_json::to_string(trace)
}

/// Parses a trace previously produced by [`to_json`].
pub fn from_json(json: &str) -> serde_json::Result<Trace> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::trace::{Decision, ThreadAction};

    #[test]
    fn round_trips_through_json() {
        let mut trace = Trace::default();
        trace.push(Decision::Start(crate::rt::id::Source::new(crate::rt::id::RunId::first()).next_thread(None)), ThreadAction::Stop, crate::rt::action::Lookahead::WillStop);
        let json = to_json(&trace).unwrap();
        let back = from_json(&json).unwrap();
        assert_eq!(trace, back);
    }
}
