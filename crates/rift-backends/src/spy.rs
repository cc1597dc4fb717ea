//! Call-recording wrapper for test doubles.
//!
//! A [`Spy`] wraps a function, records every invocation with its arguments
//! and result, and can serve queued canned results instead of calling
//! through. Clones share the same call log.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call<A, R> {
    pub args: A,
    pub result: R,
}

struct SpyState<A, R> {
    calls: Vec<Call<A, R>>,
    canned: VecDeque<R>,
}

pub struct Spy<A, R> {
    target: Arc<dyn Fn(A) -> R + Send + Sync>,
    state: Arc<Mutex<SpyState<A, R>>>,
}

impl<A, R> Clone for Spy<A, R> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: Clone, R: Clone> Spy<A, R> {
    pub fn new<F>(target: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            target: Arc::new(target),
            state: Arc::new(Mutex::new(SpyState {
                calls: Vec::new(),
                canned: VecDeque::new(),
            })),
        }
    }

    /// Serve `results` in order before calling through to the target again.
    pub fn with_results(self, results: impl IntoIterator<Item = R>) -> Self {
        self.state.lock().canned.extend(results);
        self
    }

    pub fn push_result(&self, result: R) {
        self.state.lock().canned.push_back(result);
    }

    /// Invoke the spy: a queued result if there is one, the target otherwise.
    pub fn call(&self, args: A) -> R {
        let canned = self.state.lock().canned.pop_front();
        let result = match canned {
            Some(result) => result,
            None => (self.target)(args.clone()),
        };
        self.state.lock().calls.push(Call {
            args,
            result: result.clone(),
        });
        result
    }

    pub fn calls(&self) -> Vec<Call<A, R>> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn last_call(&self) -> Option<Call<A, R>> {
        self.state.lock().calls.last().cloned()
    }

    pub fn was_called_with(&self, args: &A) -> bool
    where
        A: PartialEq,
    {
        self.state.lock().calls.iter().any(|c| &c.args == args)
    }

    /// Forget recorded calls and queued results.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.canned.clear();
    }
}

impl<A, R> fmt::Debug for Spy<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Spy")
            .field("calls", &state.calls.len())
            .field("canned", &state.canned.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let spy = Spy::new(|(a, b): (i32, i32)| a + b);
        assert_eq!(spy.call((1, 2)), 3);
        assert_eq!(spy.call((5, 5)), 10);

        assert_eq!(
            spy.calls(),
            vec![
                Call { args: (1, 2), result: 3 },
                Call { args: (5, 5), result: 10 },
            ]
        );
        assert!(spy.was_called_with(&(5, 5)));
        assert!(!spy.was_called_with(&(0, 0)));
    }

    #[test]
    fn test_canned_results_are_served_first() {
        let spy = Spy::new(|name: String| format!("real {name}")).with_results(["mocked".to_string()]);

        assert_eq!(spy.call("a".to_string()), "mocked");
        assert_eq!(spy.call("b".to_string()), "real b");

        spy.push_result("again".to_string());
        assert_eq!(spy.call("c".to_string()), "again");
        assert_eq!(spy.call_count(), 3);
        assert_eq!(spy.last_call().unwrap().result, "again");
    }

    #[test]
    fn test_clones_share_the_log() {
        let spy = Spy::new(|x: u8| x);
        let handle = spy.clone();

        std::thread::spawn(move || handle.call(7)).join().unwrap();
        assert_eq!(spy.call_count(), 1);

        spy.reset();
        assert_eq!(spy.call_count(), 0);
        assert!(spy.last_call().is_none());
    }

    #[test]
    fn test_errors_are_recorded_as_results() {
        let spy = Spy::new(|x: i32| if x < 0 { Err("negative") } else { Ok(x) });
        assert!(spy.call(-1).is_err());
        assert_eq!(spy.last_call().unwrap().result, Err("negative"));
    }
}
