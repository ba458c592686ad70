//! Correlation of prediction lines with the examples that produced them.
//!
//! Every example sent to the engine is recorded under a sequence number that
//! travels through the engine as the example tag. Prediction lines may come
//! back in any order; they are matched by that number alone.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::codec::parse_prediction_line;
use crate::error::{Error, Result};
use crate::example::{Example, Prediction};
use crate::loss::LossFunction;

/// Count and cumulative loss of resolved predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAggregate {
    count: u64,
    loss_sum: f64,
}

impl RunningAggregate {
    pub fn record(&mut self, loss: f64) {
        self.count += 1;
        self.loss_sum += loss;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn loss_sum(&self) -> f64 {
        self.loss_sum
    }

    /// Mean loss, NaN before the first prediction.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.loss_sum / self.count as f64
        }
    }
}

/// Point-in-time view of an adapter's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub submitted: u64,
    pub resolved: u64,
    pub pending: usize,
    pub unresolved_at_exit: usize,
    pub loss_sum: f64,
    pub average_loss: f64,
}

/// Pending examples keyed by sequence number, plus the running aggregate.
#[derive(Debug)]
pub struct CorrelationTable {
    next_sequence: u64,
    pending: HashMap<u64, Example>,
    aggregate: RunningAggregate,
    unresolved: Vec<u64>,
    loss_function: String,
    quantile_tau: Option<f64>,
}

impl CorrelationTable {
    pub fn new(loss_function: impl Into<String>, quantile_tau: Option<f64>) -> Self {
        Self {
            next_sequence: 1,
            pending: HashMap::new(),
            aggregate: RunningAggregate::default(),
            unresolved: Vec::new(),
            loss_function: loss_function.into(),
            quantile_tau,
        }
    }

    /// Sequence number the next call to [`on_send`](Self::on_send) will assign.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Record an example as in flight and return its sequence number.
    pub fn on_send(&mut self, example: Example) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.insert(sequence, example);
        sequence
    }

    /// Forget an example that never reached the engine.
    pub fn abandon(&mut self, sequence: u64) -> Option<Example> {
        self.pending.remove(&sequence)
    }

    /// Handle one line from the engine's primary output.
    ///
    /// Lines that are not predictions are diagnostic noise and yield `Ok(None)`.
    pub fn on_line(&mut self, line: &str) -> Result<Option<Prediction>> {
        match parse_prediction_line(line) {
            Some((prediction, sequence)) => self.resolve(prediction, sequence).map(Some),
            None => {
                debug!("VW(STDOUT): {}", line);
                Ok(None)
            }
        }
    }

    /// Match a decoded prediction with its pending example.
    pub fn resolve(&mut self, prediction: f64, sequence: u64) -> Result<Prediction> {
        let example = self
            .pending
            .get(&sequence)
            .ok_or(Error::UnknownSequenceNumber(sequence))?;

        let loss = LossFunction::parse(&self.loss_function, self.quantile_tau)?
            .loss(example.target(), prediction);

        let example = self
            .pending
            .remove(&sequence)
            .ok_or(Error::UnknownSequenceNumber(sequence))?;
        self.aggregate.record(loss);

        Ok(Prediction {
            prediction,
            loss,
            example,
            sequence,
        })
    }

    /// True once the engine has exited and nothing is left in flight.
    pub fn is_complete(&self, engine_exited: bool) -> bool {
        engine_exited && self.pending.is_empty()
    }

    /// Move whatever is still pending into the unresolved set. Called once no
    /// further output can arrive.
    pub fn close_unresolved(&mut self) -> Vec<u64> {
        let mut sequences: Vec<u64> = self.pending.drain().map(|(seq, _)| seq).collect();
        sequences.sort_unstable();
        self.unresolved.extend_from_slice(&sequences);
        sequences
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, sequence: u64) -> bool {
        self.pending.contains_key(&sequence)
    }

    pub fn submitted(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn unresolved(&self) -> &[u64] {
        &self.unresolved
    }

    pub fn aggregate(&self) -> RunningAggregate {
        self.aggregate
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            submitted: self.submitted(),
            resolved: self.aggregate.count(),
            pending: self.pending.len(),
            unresolved_at_exit: self.unresolved.len(),
            loss_sum: self.aggregate.loss_sum(),
            average_loss: self.aggregate.average(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CorrelationTable {
        CorrelationTable::new("squared", None)
    }

    #[test]
    fn test_sequence_numbers_start_at_one() {
        let mut t = table();
        assert_eq!(t.next_sequence(), 1);
        assert_eq!(t.on_send(Example::new(1.0)), 1);
        assert_eq!(t.on_send(Example::new(2.0)), 2);
        assert_eq!(t.submitted(), 2);
        assert_eq!(t.pending_len(), 2);
    }

    #[test]
    fn test_out_of_order_resolution() {
        let mut t = table();
        let s1 = t.on_send(Example::new(5.0));
        let s2 = t.on_send(Example::new(1.0));

        let p2 = t.on_line(&format!("1.5 seq_{}", s2)).unwrap().unwrap();
        assert_eq!(p2.sequence, s2);
        assert_eq!(p2.example.target(), 1.0);
        assert!((p2.loss - 0.25).abs() < 1e-12);

        let p1 = t.on_line(&format!("3 seq_{}", s1)).unwrap().unwrap();
        assert_eq!(p1.sequence, s1);
        assert!((p1.loss - 4.0).abs() < 1e-12);

        assert_eq!(t.pending_len(), 0);
        assert!((t.aggregate().average() - 2.125).abs() < 1e-12);
    }

    #[test]
    fn test_noise_lines_ignored() {
        let mut t = table();
        t.on_send(Example::new(1.0));
        assert!(t.on_line("Num weight bits = 18").unwrap().is_none());
        assert!(t.on_line("").unwrap().is_none());
        assert_eq!(t.pending_len(), 1);
    }

    #[test]
    fn test_never_two_results_for_one_example() {
        let mut t = table();
        let seq = t.on_send(Example::new(1.0));
        assert!(t.on_line(&format!("0 seq_{}", seq)).unwrap().is_some());

        let err = t.on_line(&format!("0 seq_{}", seq)).unwrap_err();
        assert!(matches!(err, Error::UnknownSequenceNumber(s) if s == seq));
        assert_eq!(t.aggregate().count(), 1);
    }

    #[test]
    fn test_unknown_loss_keeps_example_pending() {
        let mut t = CorrelationTable::new("poisson", None);
        let seq = t.on_send(Example::new(1.0));
        let err = t.resolve(0.5, seq).unwrap_err();
        assert!(matches!(err, Error::UnknownLossFunction(_)));
        assert!(t.is_pending(seq));
    }

    #[test]
    fn test_average_undefined_without_results() {
        let t = table();
        assert!(t.aggregate().average().is_nan());
        assert!(t.stats().average_loss.is_nan());
    }

    #[test]
    fn test_running_average_is_sum_over_count() {
        let mut t = table();
        let targets = [3.0, 4.0, 10.0];
        let seqs: Vec<u64> = targets.iter().map(|&y| t.on_send(Example::new(y))).collect();
        for seq in &seqs {
            t.resolve(0.0, *seq).unwrap();
        }
        let agg = t.aggregate();
        assert_eq!(agg.count(), 3);
        assert!((agg.loss_sum() - 125.0).abs() < 1e-9);
        assert!((agg.average() - 125.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_completion_and_unresolved_accounting() {
        let mut t = table();
        let s1 = t.on_send(Example::new(1.0));
        let s2 = t.on_send(Example::new(2.0));
        let s3 = t.on_send(Example::new(3.0));
        t.resolve(1.0, s2).unwrap();

        assert!(!t.is_complete(false));
        assert!(!t.is_complete(true));

        assert_eq!(t.close_unresolved(), vec![s1, s3]);
        assert!(t.is_complete(true));

        let stats = t.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved_at_exit, 2);
        assert_eq!(stats.resolved as usize + stats.unresolved_at_exit, stats.submitted as usize);
    }

    #[test]
    fn test_abandon() {
        let mut t = table();
        let seq = t.on_send(Example::new(1.0));
        assert!(t.abandon(seq).is_some());
        assert!(!t.is_pending(seq));
        // Sequence numbers are never reused
        assert_eq!(t.on_send(Example::new(1.0)), seq + 1);
    }
}
